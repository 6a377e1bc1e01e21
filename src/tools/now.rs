//! Now tool - returns the current date and time

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
struct Args {
    /// "UTC" or omitted for local time
    #[serde(default)]
    timezone: Option<String>,
}

pub struct NowTool;

impl NowTool {
    fn format(timezone: Option<&str>) -> String {
        match timezone {
            Some(tz) if tz.eq_ignore_ascii_case("utc") => {
                let utc = chrono::Utc::now();
                format!(
                    "{}\nWeekday: {}\nTimezone: UTC",
                    utc.format("%Y-%m-%d %H:%M:%S"),
                    utc.format("%A")
                )
            }
            // Only local and UTC are supported; other zones fall back to local.
            Some(tz) => {
                let now = chrono::Local::now();
                format!(
                    "{}\nWeekday: {}\nTimezone: Local (requested: {})",
                    now.format("%Y-%m-%d %H:%M:%S %:z"),
                    now.format("%A"),
                    tz
                )
            }
            None => {
                let now = chrono::Local::now();
                format!(
                    "{}\nWeekday: {}\nTimezone: Local",
                    now.format("%Y-%m-%d %H:%M:%S %:z"),
                    now.format("%A")
                )
            }
        }
    }
}

#[async_trait]
impl Tool for NowTool {
    fn name(&self) -> &str {
        "now"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "now".to_string(),
            description: "Get the current date, time and weekday. Use before resolving relative dates like \"tomorrow\" or \"next Friday\".".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": "Optional timezone, \"UTC\" or omitted for local time"
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };
        ToolResult::success(Self::format(args.timezone.as_deref()))
    }

    fn humanize(&self, _args: &Value, result: &ToolResult) -> String {
        let first = result.output.lines().next().unwrap_or_default();
        format!("checked the time ({})", first)
    }
}
