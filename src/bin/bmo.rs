//! BMO CLI
//!
//! Run with: cargo run --bin bmo -- repl

use anyhow::Result;
use bmo_agent::{
    agent::{build_agents, AgentConfig, AgentRegistry, Dispatcher, Router},
    config::Config,
    error::{AgentError, ProviderError},
    events::{AgentEvent, AgentResult, StopReason},
    provider::{ChatModel, ProviderClient},
    scratchpad::Scratchpad,
    service::{DryRunService, ServiceRegistry},
    tools, Telemetry,
};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Services the home exposes. Each gets a dry-run backend in the CLI.
const SERVICES: [&str; 6] = ["calendar", "music", "smart_home", "timers", "tv", "weather"];

#[derive(Parser)]
#[command(name = "bmo")]
#[command(about = "BMO - home assistant agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// LLM model to use (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Provider name: openrouter, openai, lm-studio, or an auth.json entry
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Base URL override
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Config file (default: ~/.config/bmo/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (log to console, show routing and timings)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Send every message to this agent instead of routing
    #[arg(short, long, global = true)]
    agent: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Repl,

    /// Send a single message
    Prompt {
        /// The message for BMO
        message: String,
    },

    /// List agents and what they may use, or show one agent in full
    Agents {
        /// Agent to show, including its system prompt
        name: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(provider) = &cli.provider {
        config.llm.provider = provider.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.llm.base_url = Some(base_url.clone());
    }
    if let Some(model) = &cli.model {
        config.llm.model = Some(model.clone());
    }

    let verbose = cli.verbose || config.telemetry.verbose;
    Ok(config.with_verbose(verbose))
}

fn build_model(config: &Config) -> Result<Arc<dyn ChatModel>> {
    let provider = config.llm.provider_config()?;
    let is_local = provider.base_url.contains("localhost") || provider.base_url.contains("127.0.0.1");

    let client = match ProviderClient::new(provider.clone()) {
        Ok(client) => client,
        // Local servers don't check the key
        Err(ProviderError::MissingApiKey(_)) if is_local => {
            ProviderClient::with_api_key(provider, "local")?
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Arc::new(client))
}

/// One dry-run backend per service, accepting the actions agents document
fn build_services(agents: &[AgentConfig]) -> ServiceRegistry {
    let mut actions: BTreeMap<String, Vec<String>> = SERVICES
        .iter()
        .map(|s| (s.to_string(), Vec::new()))
        .collect();

    for agent in agents {
        for (action, service) in &agent.commands {
            let list = actions.entry(service.clone()).or_default();
            if !list.contains(action) {
                list.push(action.clone());
            }
        }
    }

    let mut registry = ServiceRegistry::new();
    for (name, actions) in actions {
        registry.register(DryRunService::new(name, actions));
    }
    registry
}

async fn build_dispatcher(
    config: &Config,
    agents: Vec<AgentConfig>,
    telemetry: Arc<Telemetry>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
) -> Result<Dispatcher> {
    let model = build_model(config)?;
    let tool_registry = tools::create_registry(config.tools.design_dir.clone());
    let services = build_services(&agents);

    let timeout = config.llm.timeout();
    let agents = build_agents(agents, model, &tool_registry, &services)?
        .into_iter()
        .map(|agent| agent.with_timeout(timeout).with_telemetry(telemetry.clone()));
    let router = Router::with_agents(config.dispatch.default_agent.clone(), agents)?;

    let mut dispatcher = Dispatcher::new(router, tool_registry, services)
        .with_max_nesting_depth(config.dispatch.max_nesting_depth)
        .with_telemetry(telemetry);
    if let Some(tx) = events {
        dispatcher = dispatcher.with_events(tx);
    }
    Ok(dispatcher)
}

/// Print routing and timing details as they happen
fn spawn_event_printer(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::Routed { agent, hinted } => {
                    let how = if hinted { "hint" } else { "routing" };
                    eprintln!("\x1b[90m→ {} ({})\x1b[0m", agent, how);
                }
                AgentEvent::ModelReply { agent, turn, latency_ms, .. } => {
                    eprintln!("\x1b[90m  {} turn {} ({}ms)\x1b[0m", agent, turn, latency_ms);
                }
                AgentEvent::Delegation { from, to, depth } => {
                    eprintln!("\x1b[35m⟳ {} → {} (depth {})\x1b[0m", from, to, depth);
                }
                AgentEvent::ParseError { agent, error } => {
                    eprintln!("\x1b[33m  {}: {}\x1b[0m", agent, error);
                }
                _ => {}
            }
        }
    });
}

fn print_result(result: &AgentResult) {
    for action in &result.actions {
        match action.outcome.error() {
            None => println!(
                "\x1b[32m✓ {} ({}ms)\x1b[0m",
                action.name, action.duration_ms
            ),
            Some(e) => println!("\x1b[31m✗ {}: {}\x1b[0m", action.name, e),
        }
    }

    println!("\x1b[1m{}:\x1b[0m {}", result.agent_name, result.text);
    if result.stop_reason == StopReason::Cancelled {
        println!("\x1b[90m(cancelled)\x1b[0m");
    }
}

fn print_error(err: &AgentError) {
    if err.is_transport() {
        println!("BMO is unavailable right now. ({})", err);
    } else {
        eprintln!("\x1b[31mError: {}\x1b[0m", err);
    }
}

/// Handle one message. Ctrl-C while it runs cancels this turn only.
async fn run_prompt(dispatcher: &Dispatcher, scratchpad: &Scratchpad, message: &str, hint: Option<&str>) {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n[interrupt received, cancelling...]");
                cancel.cancel();
            }
        })
    };

    let outcome = dispatcher
        .handle_with_cancel(scratchpad, message, hint, &cancel)
        .await;
    interrupt.abort();

    match outcome {
        Ok(result) => print_result(&result),
        Err(e) => print_error(&e),
    }
}

async fn run_repl(
    dispatcher: &Dispatcher,
    scratchpad: &Scratchpad,
    hint: Option<&str>,
    data_dir: PathBuf,
) -> Result<()> {
    println!("BMO");
    println!("Session: {}", scratchpad.session_id());
    println!("Agents: {}", dispatcher.router().names().join(", "));
    println!();
    println!("Commands: /quit, /clear, /context key=value, /help");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = data_dir.join("history.txt");
    let _ = rl.load_history(&history_path);

    loop {
        match rl.readline("bmo> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match line {
                    "/quit" | "/exit" => {
                        println!("Bye!");
                        break;
                    }
                    "/clear" => {
                        scratchpad.clear();
                        println!("History cleared.");
                        continue;
                    }
                    "/help" => {
                        println!("Commands:");
                        println!("  /quit, /exit        - Exit");
                        println!("  /clear              - Forget this conversation");
                        println!("  /context key=value  - Tell BMO something about the situation");
                        println!("  /help               - Show this");
                        continue;
                    }
                    _ => {}
                }

                if let Some(rest) = line.strip_prefix("/context") {
                    match rest.trim().split_once('=') {
                        Some((key, value)) if !key.trim().is_empty() => {
                            scratchpad.set_context(key.trim(), serde_json::Value::String(value.trim().to_string()));
                            println!("Noted.");
                        }
                        _ => println!("Usage: /context key=value"),
                    }
                    continue;
                }

                run_prompt(dispatcher, scratchpad, line, hint).await;
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Bye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let _ = rl.save_history(&history_path);
    Ok(())
}

async fn show_agent(registry: &AgentRegistry, name: &str) -> Result<()> {
    let Some(agent) = registry.get(name).await else {
        anyhow::bail!("Unknown agent '{}'. Run `bmo agents` to list them.", name);
    };

    println!("{} ({})", agent.display_name(), agent.name);
    if let Some(desc) = &agent.description {
        println!("{}", desc);
    }
    println!("{:-<60}", "");
    println!("temperature: {}", agent.temperature);
    println!("max_turns: {}", agent.max_turns);
    println!("history_window: {}", agent.history_window);
    println!("may delegate: {}", agent.can_nest);
    for (action, service) in &agent.commands {
        println!("command: {} -> {}", action, service);
    }
    println!();
    println!("{}", agent.system_prompt);
    Ok(())
}

async fn list_agents(registry: &AgentRegistry) {
    println!("Available Agents ({}):", registry.count().await);
    println!("{:-<60}", "");

    for agent in registry.get_all().await {
        let builtin = if agent.built_in { " (built-in)" } else { "" };
        let desc = agent.description.as_deref().unwrap_or("No description");
        println!("  {:12}{} - {}", agent.name, builtin, desc);

        let join = |items: Vec<&str>| if items.is_empty() { "-".to_string() } else { items.join(", ") };
        println!("  {:12}   tools: {}", "", join(agent.tools.iter().map(String::as_str).collect()));
        println!("  {:12}   services: {}", "", join(agent.services.iter().map(String::as_str).collect()));
        if agent.can_nest {
            println!("  {:12}   may delegate", "");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let working_dir = std::env::current_dir()?;
    let registry = AgentRegistry::new_with_config(&working_dir)?;

    if let Some(Commands::Agents { ref name }) = cli.command {
        match name {
            Some(name) => show_agent(&registry, name).await?,
            None => list_agents(&registry).await,
        }
        return Ok(());
    }

    if let Some(hint) = cli.agent.as_deref() {
        if !registry.exists(hint).await {
            anyhow::bail!("Unknown agent '{}'. Run `bmo agents` to list them.", hint);
        }
    }

    let telemetry = Arc::new(Telemetry::init(
        config.telemetry.log_dir.clone(),
        config.telemetry.verbose,
        config.telemetry.otel_endpoint.as_deref(),
        config.llm.model.as_deref(),
        Some(config.llm.provider.as_str()),
    )?);

    let events = if config.telemetry.verbose {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_event_printer(rx);
        Some(tx)
    } else {
        None
    };

    let dispatcher = build_dispatcher(&config, registry.get_all().await, telemetry.clone(), events).await?;
    let scratchpad = Scratchpad::with_session_id(telemetry.session_id());
    let hint = cli.agent.as_deref();

    if config.telemetry.verbose {
        println!("Provider: {}", config.llm.provider);
        println!("Session: {}", telemetry.session_id());
        if let Some(path) = telemetry.db_path() {
            println!("Database: {}", path.display());
        }
        println!();
    }

    match cli.command {
        Some(Commands::Prompt { ref message }) => {
            run_prompt(&dispatcher, &scratchpad, message, hint).await;
        }
        Some(Commands::Repl) | None => {
            let data_dir = config
                .telemetry
                .log_dir
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            run_repl(&dispatcher, &scratchpad, hint, data_dir).await?;
        }
        Some(Commands::Agents { .. }) => {}
    }

    Ok(())
}
