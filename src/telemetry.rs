//! Telemetry and logging infrastructure
//!
//! - Console logging (human-readable, verbose mode only)
//! - JSON file logging, rolled daily
//! - OpenTelemetry export (optional)
//! - SQLite storage for model calls and executed actions (queryable history)

use crate::events::ExecutedAction;
use chrono::{DateTime, Utc};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        started_at TEXT NOT NULL,
        model TEXT,
        provider TEXT
    );

    -- One row per model call
    CREATE TABLE IF NOT EXISTS traces (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        agent_name TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        model_provider TEXT NOT NULL,
        model_id TEXT NOT NULL,
        request_messages TEXT NOT NULL,
        response_content TEXT,
        latency_ms INTEGER,
        error TEXT,
        FOREIGN KEY (session_id) REFERENCES sessions(id)
    );

    -- Commands, tool calls and delegations
    CREATE TABLE IF NOT EXISTS actions (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        agent_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        service TEXT,
        arguments TEXT,
        output TEXT,
        is_error INTEGER NOT NULL,
        duration_ms INTEGER,
        FOREIGN KEY (session_id) REFERENCES sessions(id)
    );

    CREATE INDEX IF NOT EXISTS idx_traces_session ON traces(session_id);
    CREATE INDEX IF NOT EXISTS idx_traces_started ON traces(started_at);
    CREATE INDEX IF NOT EXISTS idx_actions_session ON actions(session_id);
    CREATE INDEX IF NOT EXISTS idx_actions_name ON actions(name);
"#;

/// SQLite-backed telemetry storage
struct TelemetryDb {
    conn: Connection,
}

impl TelemetryDb {
    fn open(path: &Path) -> anyhow::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn insert_session(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        model: Option<&str>,
        provider: Option<&str>,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, started_at, model, provider) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), started_at.to_rfc3339(), model, provider],
        )?;
        Ok(())
    }

    fn insert_trace(&self, trace: &TraceRecord) -> anyhow::Result<()> {
        self.conn.execute(
            r#"INSERT OR REPLACE INTO traces
               (id, session_id, agent_name, started_at, completed_at, model_provider, model_id,
                request_messages, response_content, latency_ms, error)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                trace.id.to_string(),
                trace.session_id.to_string(),
                trace.agent_name,
                trace.started_at.to_rfc3339(),
                trace.completed_at.map(|t| t.to_rfc3339()),
                trace.model_provider,
                trace.model_id,
                trace.request_messages,
                trace.response_content,
                trace.latency_ms.map(|t| t as i64),
                trace.error
            ],
        )?;
        Ok(())
    }

    fn insert_action(&self, session_id: Uuid, action: &ExecutedAction) -> anyhow::Result<()> {
        self.conn.execute(
            r#"INSERT INTO actions
               (id, session_id, timestamp, agent_name, kind, name, service, arguments, output, is_error, duration_ms)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                Utc::now().to_rfc3339(),
                action.agent,
                action.kind.to_string(),
                action.name,
                action.service,
                serde_json::Value::Object(action.arguments.clone()).to_string(),
                action.outcome.text(),
                !action.outcome.is_ok(),
                action.duration_ms as i64
            ],
        )?;
        Ok(())
    }
}

/// A model call trace record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub model_provider: String,
    pub model_id: String,
    pub request_messages: String,
    pub response_content: Option<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Builder for traces - start before the model call, complete after
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    pub id: Uuid,
    pub session_id: Uuid,
    pub agent_name: String,
    pub model_provider: String,
    pub model_id: String,
    pub request_messages: String,
    pub started_at: DateTime<Utc>,
}

impl TraceBuilder {
    pub fn new(
        session_id: Uuid,
        agent_name: impl Into<String>,
        model_provider: impl Into<String>,
        model_id: impl Into<String>,
        request_messages: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            agent_name: agent_name.into(),
            model_provider: model_provider.into(),
            model_id: model_id.into(),
            request_messages: request_messages.into(),
            started_at: Utc::now(),
        }
    }

    fn finish(self, response_content: Option<String>, error: Option<String>) -> TraceRecord {
        let completed_at = Utc::now();
        let latency_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;

        TraceRecord {
            id: self.id,
            session_id: self.session_id,
            agent_name: self.agent_name,
            started_at: self.started_at,
            completed_at: Some(completed_at),
            model_provider: self.model_provider,
            model_id: self.model_id,
            request_messages: self.request_messages,
            response_content,
            latency_ms: Some(latency_ms),
            error,
        }
    }

    pub fn complete(self, response_content: impl Into<String>) -> TraceRecord {
        self.finish(Some(response_content.into()), None)
    }

    pub fn fail(self, error: impl Into<String>) -> TraceRecord {
        self.finish(None, Some(error.into()))
    }
}

/// Main telemetry handler
pub struct Telemetry {
    session_id: Uuid,
    db: Arc<Mutex<TelemetryDb>>,
    db_path: Option<PathBuf>,
    _file_guard: Option<WorkerGuard>,
    _otel_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Install the tracing subscriber and open `telemetry.db` under `log_dir`
    pub fn init(
        log_dir: PathBuf,
        verbose: bool,
        otel_endpoint: Option<&str>,
        model: Option<&str>,
        provider: Option<&str>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;

        let session_id = Uuid::new_v4();

        let db_path = log_dir.join("telemetry.db");
        let db = TelemetryDb::open(&db_path)?;
        db.insert_session(session_id, Utc::now(), model, provider)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "bmo.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

        let make_env_filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if verbose {
                    EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
                } else {
                    EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
                }
            })
        };

        let otel_provider = if let Some(endpoint) = otel_endpoint {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .build()?;

            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(Resource::builder().with_service_name("bmo").build())
                .build();

            let tracer = provider.tracer("bmo");
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(verbose.then(|| fmt::layer().with_target(false).compact()))
                .with(fmt::layer().json().with_writer(non_blocking))
                .with(otel_layer)
                .try_init()
                .ok();
            Some(provider)
        } else if verbose {
            // Console + file
            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false).compact())
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
            None
        } else {
            // File only, keeps the REPL clean
            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
            None
        };

        tracing::info!(
            session_id = %session_id,
            log_dir = %log_dir.display(),
            db_path = %db_path.display(),
            otel_enabled = otel_endpoint.is_some(),
            "Telemetry initialized"
        );

        Ok(Self {
            session_id,
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            _file_guard: Some(file_guard),
            _otel_provider: otel_provider,
        })
    }

    /// In-memory store with no subscriber installed (for tests)
    pub fn minimal_in_memory() -> anyhow::Result<Self> {
        let session_id = Uuid::new_v4();
        let db = TelemetryDb::in_memory()?;
        db.insert_session(session_id, Utc::now(), None, None)?;

        Ok(Self {
            session_id,
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            _file_guard: None,
            _otel_provider: None,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Path of `telemetry.db`, when on disk
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn save_trace(&self, trace: TraceRecord) {
        tracing::debug!(
            trace_id = %trace.id,
            agent = %trace.agent_name,
            model = %trace.model_id,
            latency_ms = ?trace.latency_ms,
            error = ?trace.error,
            "LLM trace"
        );

        match self.db.lock() {
            Ok(db) => {
                if let Err(e) = db.insert_trace(&trace) {
                    tracing::error!(error = %e, trace_id = %trace.id, "Failed to insert trace");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to lock telemetry db");
            }
        }
    }

    pub fn record_action(&self, action: &ExecutedAction) {
        match self.db.lock() {
            Ok(db) => {
                if let Err(e) = db.insert_action(self.session_id, action) {
                    tracing::error!(error = %e, action = %action.name, "Failed to insert action");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to lock telemetry db");
            }
        }
    }

    /// Most recent traces for this session, newest first
    pub fn recent_traces(&self, limit: usize) -> anyhow::Result<Vec<TraceRecord>> {
        let db = self.db.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = db.conn.prepare(
            r#"
            SELECT id, session_id, agent_name, started_at, completed_at, model_provider,
                   model_id, request_messages, response_content, latency_ms, error
            FROM traces
            WHERE session_id = ?1
            ORDER BY started_at DESC
            LIMIT ?2
        "#,
        )?;

        let rows = stmt.query_map(params![self.session_id.to_string(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<i64>>(9)?,
                row.get::<_, Option<String>>(10)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, session_id, agent_name, started_at, completed_at, model_provider, model_id, request_messages, response_content, latency_ms, error) = row?;
            results.push(TraceRecord {
                id: Uuid::parse_str(&id)?,
                session_id: Uuid::parse_str(&session_id)?,
                agent_name,
                started_at: DateTime::parse_from_rfc3339(&started_at)?.with_timezone(&Utc),
                completed_at: completed_at
                    .map(|t| DateTime::parse_from_rfc3339(&t).map(|d| d.with_timezone(&Utc)))
                    .transpose()?,
                model_provider,
                model_id,
                request_messages,
                response_content,
                latency_ms: latency_ms.map(|l| l as u64),
                error,
            });
        }
        Ok(results)
    }

    /// Number of recorded actions with the given name in this session, as
    /// (succeeded, failed)
    pub fn action_counts(&self, name: &str) -> anyhow::Result<(u64, u64)> {
        let db = self.db.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let counts = db.conn.query_row(
            r#"
            SELECT COALESCE(SUM(CASE WHEN is_error = 0 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN is_error = 1 THEN 1 ELSE 0 END), 0)
            FROM actions
            WHERE session_id = ?1 AND name = ?2
        "#,
            params![self.session_id.to_string(), name],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, CapabilityKind};
    use crate::events::{ActionKind, ActionOutcome};
    use serde_json::Map;

    fn action(name: &str, outcome: ActionOutcome) -> ExecutedAction {
        ExecutedAction {
            agent: "timer".into(),
            kind: ActionKind::Command,
            name: name.into(),
            service: Some("timers".into()),
            arguments: Map::new(),
            outcome,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_trace_round_trip() {
        let telemetry = Telemetry::minimal_in_memory().unwrap();
        let trace = TraceBuilder::new(telemetry.session_id(), "music", "lm-studio", "qwen", "[]")
            .fail("model unavailable");
        telemetry.save_trace(trace.clone());

        let traces = telemetry.recent_traces(5).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].id, trace.id);
        assert_eq!(traces[0].error.as_deref(), Some("model unavailable"));
        assert!(traces[0].response_content.is_none());
    }

    #[test]
    fn test_action_counts() {
        let telemetry = Telemetry::minimal_in_memory().unwrap();
        telemetry.record_action(&action("timer_set", ActionOutcome::Completed("{}".into())));
        telemetry.record_action(&action(
            "timer_set",
            ActionOutcome::Failed(AgentError::denied("timer", CapabilityKind::Command, "timer_set")),
        ));
        telemetry.record_action(&action("timer_cancel", ActionOutcome::Completed("{}".into())));

        assert_eq!(telemetry.action_counts("timer_set").unwrap(), (1, 1));
        assert_eq!(telemetry.action_counts("lights_on").unwrap(), (0, 0));
    }
}
