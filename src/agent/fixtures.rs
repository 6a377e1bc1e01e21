//! Fixtures - Humanize executed actions into minimal markdown
//!
//! Converts tool/command outcomes into concise summaries that are fed back
//! to the model between turns of a tool loop.

use crate::events::{ActionKind, ActionOutcome, ExecutedAction};
use crate::tool::{ToolRegistry, ToolResult};
use serde_json::Value;

/// Opening line of the message carrying results back to the model
pub const TOOL_RESULTS_HEADER: &str = "Results of your last actions:";

/// Build the user-role message that continues a tool loop.
/// Summaries keep execution order.
pub fn tool_results_message(actions: &[ExecutedAction], tools: &ToolRegistry) -> String {
    let mut parts = vec![TOOL_RESULTS_HEADER.to_string()];
    parts.extend(actions.iter().map(|a| humanize_action(a, tools)));
    parts.join("\n\n")
}

/// Humanize a single action
pub fn humanize_action(action: &ExecutedAction, tools: &ToolRegistry) -> String {
    let args = Value::Object(action.arguments.clone());

    match (&action.kind, &action.outcome) {
        (ActionKind::Tool, ActionOutcome::Completed(output)) => tools
            .humanize(&action.name, &args, &ToolResult::success(output.clone()))
            .map(|summary| {
                // The generic summary has no output; the model needs it
                if summary.contains(output.trim()) {
                    summary
                } else {
                    format!("{}\n{}", summary, trim_output(output, 1500))
                }
            })
            .unwrap_or_else(|| format!("{}\n{}", action.name, trim_output(output, 1500))),

        (ActionKind::Command, ActionOutcome::Completed(output)) => format!(
            "ran `{}` on {}: {}",
            action.name,
            action.service.as_deref().unwrap_or("?"),
            trim_output(output, 300)
        ),

        (ActionKind::Delegation, ActionOutcome::Completed(_)) => {
            format!("handed off to {}", action.name)
        }

        (_, ActionOutcome::Failed(err)) => {
            format!("`{}` failed: {}", action.name, trim_output(&err.to_string(), 300))
        }
    }
}

/// Trim output, keeping first and last lines if too long
fn trim_output(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= 6 {
        return crate::tool::truncate(s, max);
    }

    // Keep first 3 and last 2 lines
    let first: Vec<&str> = lines.iter().take(3).copied().collect();
    let last: Vec<&str> = lines.iter().rev().take(2).rev().copied().collect();

    format!(
        "{}\n  ... ({} lines) ...\n{}",
        first.join("\n"),
        lines.len() - 5,
        last.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, CapabilityKind};
    use crate::testing::EchoTool;
    use crate::tools::NowTool;
    use serde_json::{json, Map};

    fn action(kind: ActionKind, name: &str, args: Value, outcome: ActionOutcome) -> ExecutedAction {
        ExecutedAction {
            agent: "design".into(),
            kind,
            name: name.into(),
            service: None,
            arguments: args.as_object().cloned().unwrap_or_default(),
            outcome,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_generic_tool_summary_includes_output() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::new("echo"));

        let a = action(
            ActionKind::Tool,
            "echo",
            json!({"x": 1}),
            ActionOutcome::Completed("echo {\"x\":1}".into()),
        );
        assert_eq!(humanize_action(&a, &tools), "echo(x=1)\necho {\"x\":1}");
    }

    #[test]
    fn test_tool_with_custom_summary() {
        let mut tools = ToolRegistry::new();
        tools.register(NowTool);

        let a = action(
            ActionKind::Tool,
            "now",
            json!({}),
            ActionOutcome::Completed("2026-10-19 14:03\nWeekday: Monday".into()),
        );
        let summary = humanize_action(&a, &tools);
        assert!(summary.starts_with("checked the time (2026-10-19 14:03)"));
        assert!(summary.contains("Weekday: Monday"));
    }

    #[test]
    fn test_denied_action() {
        let a = action(
            ActionKind::Tool,
            "delete_system",
            json!({}),
            ActionOutcome::Failed(AgentError::denied("design", CapabilityKind::Tool, "delete_system")),
        );
        assert_eq!(
            humanize_action(&a, &ToolRegistry::new()),
            "`delete_system` failed: agent 'design' is not permitted to use tool 'delete_system'"
        );
    }

    #[test]
    fn test_results_message_keeps_order() {
        let mut command = action(
            ActionKind::Command,
            "timer_set",
            json!({"minutes": 10}),
            ActionOutcome::Completed(r#"{"ok":true}"#.into()),
        );
        command.service = Some("timers".into());
        let delegation = ExecutedAction {
            arguments: Map::new(),
            ..action(ActionKind::Delegation, "timer", json!({}), ActionOutcome::Completed(String::new()))
        };

        let message = tool_results_message(&[command, delegation], &ToolRegistry::new());
        assert_eq!(
            message,
            "Results of your last actions:\n\nran `timer_set` on timers: {\"ok\":true}\n\nhanded off to timer"
        );
    }

    #[test]
    fn test_trim_output_long() {
        let long: String = (0..20).map(|i| format!("line {}\n", i)).collect();
        let trimmed = trim_output(&long, 20);
        assert!(trimmed.starts_with("line 0\nline 1\nline 2\n  ... (15 lines) ..."));
        assert!(trimmed.ends_with("line 18\nline 19"));
    }
}
