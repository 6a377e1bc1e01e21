//! Dispatcher - turns a user message into an `AgentResult`
//!
//! For each agent hop the dispatcher calls the model, parses the reply, and
//! runs the requested side effects one at a time in reply order. Tool results
//! are fed back for up to `max_turns` model calls. A `delegate` command hands
//! the conversation to another agent; hops are a loop with an explicit depth
//! counter, never recursion.
//!
//! Capability checks happen here, before anything reaches a tool or service:
//! a block naming something outside the agent's declared sets is recorded as
//! `CapabilityDenied` and never forwarded.

use super::base::BaseAgent;
use super::builtins::DELEGATE_ACTION;
use super::fixtures::tool_results_message;
use super::router::Router;
use crate::error::{AgentError, CapabilityKind};
use crate::events::{
    ActionKind, ActionOutcome, AgentEvent, AgentResult, ExecutedAction, StopReason,
};
use crate::protocol::{parse_reply, presentation_tags, Command, ParseError, ParsedBlock, ToolCall};
use crate::scratchpad::{Context, HistoryEntry, Scratchpad};
use crate::service::ServiceRegistry;
use crate::telemetry::Telemetry;
use crate::tool::{ToolContext, ToolError, ToolRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 3;

/// A pending hand-off to another agent
#[derive(Debug)]
struct Delegation {
    target: String,
    message: String,
    arguments: Map<String, Value>,
}

/// Outcome of one agent hop
struct Hop {
    text: String,
    raw_text: String,
    turns: usize,
    stop_reason: StopReason,
    delegation: Option<Delegation>,
}

/// Actions and parse errors accumulated across hops
#[derive(Default)]
struct Trail {
    actions: Vec<ExecutedAction>,
    parse_errors: Vec<ParseError>,
}

pub struct Dispatcher {
    router: Router,
    tools: ToolRegistry,
    services: ServiceRegistry,
    max_nesting_depth: usize,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
    telemetry: Option<Arc<Telemetry>>,
}

impl Dispatcher {
    pub fn new(router: Router, tools: ToolRegistry, services: ServiceRegistry) -> Self {
        Self {
            router,
            tools,
            services,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            events: None,
            telemetry: None,
        }
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Stream `AgentEvent`s to `tx` while handling messages
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub async fn handle(
        &self,
        scratchpad: &Scratchpad,
        message: &str,
        hint: Option<&str>,
    ) -> Result<AgentResult, AgentError> {
        self.handle_with_cancel(scratchpad, message, hint, &CancellationToken::new())
            .await
    }

    /// Route, run, and record one user message.
    ///
    /// The scratchpad gets the user turn and the final text only when this
    /// returns `Ok` with a stop reason other than `Cancelled`.
    pub async fn handle_with_cancel(
        &self,
        scratchpad: &Scratchpad,
        message: &str,
        hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let history = scratchpad.history();
        let context = scratchpad.context();

        let mut agent = self.router.select(message, hint)?;
        self.emit(AgentEvent::Routed {
            agent: agent.name().to_string(),
            hinted: hint.is_some(),
        });

        let mut trail = Trail::default();
        let mut chain = vec![agent.name().to_string()];
        let mut turns = 0;
        let mut depth = 0;
        let mut hop_message = message.to_string();

        let (hop, stop_reason) = loop {
            self.emit(AgentEvent::TurnStart {
                agent: agent.name().to_string(),
                depth,
            });

            let mut hop = match self
                .run_hop(agent, &hop_message, &history, &context, cancel, &mut trail)
                .await
            {
                Ok(hop) => hop,
                Err(e) => {
                    self.emit(AgentEvent::Error {
                        agent: agent.name().to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };
            turns += hop.turns;
            self.emit(AgentEvent::TurnComplete {
                agent: agent.name().to_string(),
                reason: hop.stop_reason,
            });

            if hop.stop_reason != StopReason::TextResponse {
                let reason = hop.stop_reason;
                break (hop, reason);
            }
            let Some(delegation) = hop.delegation.take() else {
                break (hop, StopReason::TextResponse);
            };
            if cancel.is_cancelled() {
                break (hop, StopReason::Cancelled);
            }

            let start = Instant::now();
            let limit = self.max_nesting_depth.min(agent.config().max_turns);
            let next_depth = depth + 1;

            if next_depth > limit {
                let err = AgentError::NestingLimitExceeded {
                    depth: next_depth,
                    limit,
                };
                tracing::warn!(
                    agent = %agent.name(),
                    target = %delegation.target,
                    depth = next_depth,
                    limit,
                    "Delegation refused: nesting limit"
                );
                self.record(&mut trail, delegation_action(agent, delegation, ActionOutcome::Failed(err), start));
                break (hop, StopReason::NestingLimitExceeded);
            }

            match self.router.get(&delegation.target) {
                Some(next) => {
                    tracing::info!(
                        from = %agent.name(),
                        to = %next.name(),
                        depth = next_depth,
                        "Delegating"
                    );
                    self.emit(AgentEvent::Delegation {
                        from: agent.name().to_string(),
                        to: next.name().to_string(),
                        depth: next_depth,
                    });

                    hop_message = delegation.message.clone();
                    let outcome = ActionOutcome::Completed(format!("delegated to {}", next.name()));
                    self.record(&mut trail, delegation_action(agent, delegation, outcome, start));

                    agent = next;
                    depth = next_depth;
                    chain.push(agent.name().to_string());
                }
                None => {
                    tracing::warn!(
                        agent = %agent.name(),
                        target = %delegation.target,
                        "Delegation to unknown agent"
                    );
                    let err = AgentError::UnknownAgent(delegation.target.clone());
                    self.record(&mut trail, delegation_action(agent, delegation, ActionOutcome::Failed(err), start));
                    break (hop, StopReason::TextResponse);
                }
            }
        };

        if stop_reason == StopReason::Cancelled {
            self.emit(AgentEvent::Cancelled {
                agent: agent.name().to_string(),
            });
        }

        let result = AgentResult {
            tags: presentation_tags(&hop.text),
            text: hop.text,
            raw_text: hop.raw_text,
            agent_name: agent.name().to_string(),
            actions: trail.actions,
            parse_errors: trail.parse_errors,
            turns,
            delegation_chain: chain,
            stop_reason,
        };

        if stop_reason != StopReason::Cancelled {
            scratchpad.append_turn(message, result.text.clone());
        }

        tracing::info!(
            session_id = %scratchpad.session_id(),
            agent = %result.agent_name,
            turns = result.turns,
            actions = result.actions.len(),
            failed_actions = result.failed_actions().count(),
            parse_errors = result.parse_errors.len(),
            stop_reason = %result.stop_reason,
            "Dispatch complete"
        );

        Ok(result)
    }

    /// Run one agent until it stops calling tools or runs out of turns
    async fn run_hop(
        &self,
        agent: &BaseAgent,
        message: &str,
        history: &[HistoryEntry],
        context: &Context,
        cancel: &CancellationToken,
        trail: &mut Trail,
    ) -> Result<Hop, AgentError> {
        let max_turns = agent.config().max_turns;
        let mut messages = agent.prepare(message, history, Some(context));
        let mut delegation: Option<Delegation> = None;
        // Last non-empty prose, so a reply that is only blocks keeps what came before
        let mut best_text = String::new();
        let mut turn = 0;

        loop {
            turn += 1;
            let start = Instant::now();
            let reply = agent.complete(&messages, cancel).await?;
            self.emit(AgentEvent::ModelReply {
                agent: agent.name().to_string(),
                turn,
                text: reply.clone(),
                latency_ms: start.elapsed().as_millis() as u64,
            });

            let parsed = parse_reply(&reply);
            if !parsed.text.is_empty() {
                best_text = parsed.text.clone();
            }
            for error in parsed.errors() {
                tracing::warn!(agent = %agent.name(), error = %error, raw = %error.raw, "Skipping malformed block");
                self.emit(AgentEvent::ParseError {
                    agent: agent.name().to_string(),
                    error: error.to_string(),
                });
                trail.parse_errors.push(error.clone());
            }

            let turn_start = trail.actions.len();
            let mut tool_calls = 0;
            let mut cancelled = false;

            for block in parsed.blocks {
                if matches!(block, ParsedBlock::Malformed(_)) {
                    continue;
                }
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }

                match block {
                    ParsedBlock::ToolCall(call) => {
                        tool_calls += 1;
                        let action = self.execute_tool(agent, call, cancel).await;
                        self.record(trail, action);
                    }
                    ParsedBlock::Command(command) if command.action == DELEGATE_ACTION => {
                        match request_delegation(agent, command, message) {
                            Ok(request) if delegation.is_none() => delegation = Some(request),
                            Ok(request) => {
                                tracing::warn!(
                                    agent = %agent.name(),
                                    target = %request.target,
                                    "Ignoring extra delegation in one reply"
                                );
                            }
                            Err(action) => self.record(trail, action),
                        }
                    }
                    ParsedBlock::Command(command) => {
                        let action = self.execute_command(agent, command).await;
                        self.record(trail, action);
                    }
                    ParsedBlock::Malformed(_) => {}
                }
            }

            let hop = |stop_reason, delegation| Hop {
                text: best_text.clone(),
                raw_text: reply.clone(),
                turns: turn,
                stop_reason,
                delegation,
            };

            if cancelled {
                tracing::info!(agent = %agent.name(), turn, "Cancelled before all actions ran");
                return Ok(hop(StopReason::Cancelled, None));
            }
            if tool_calls == 0 {
                return Ok(hop(StopReason::TextResponse, delegation));
            }
            if turn >= max_turns {
                tracing::warn!(agent = %agent.name(), max_turns, "Tool loop hit max_turns");
                if let Some(dropped) = &delegation {
                    tracing::warn!(agent = %agent.name(), target = %dropped.target, "Dropping delegation after max_turns");
                }
                return Ok(hop(StopReason::MaxTurns, None));
            }

            let feedback = tool_results_message(&trail.actions[turn_start..], &self.tools);
            messages.push(HistoryEntry::assistant(reply));
            messages.push(HistoryEntry::user(feedback));
        }
    }

    async fn execute_tool(
        &self,
        agent: &BaseAgent,
        call: ToolCall,
        cancel: &CancellationToken,
    ) -> ExecutedAction {
        let config = agent.config();
        let start = Instant::now();
        self.emit(AgentEvent::ActionStart {
            agent: config.name.clone(),
            kind: ActionKind::Tool,
            name: call.tool.clone(),
            arguments: Value::Object(call.args.clone()),
        });

        let outcome = if !config.allows_tool(&call.tool) {
            tracing::warn!(
                agent = %config.name,
                tool = %call.tool,
                empty_toolset = config.tools.is_empty(),
                "Tool call denied"
            );
            ActionOutcome::Failed(AgentError::denied(&config.name, CapabilityKind::Tool, &call.tool))
        } else {
            let ctx = ToolContext::new(config.name.clone(), cancel.clone());
            match self
                .tools
                .invoke(&call.tool, Value::Object(call.args.clone()), &ctx)
                .await
            {
                Ok(output) => ActionOutcome::Completed(output),
                Err(ToolError::Cancelled) => ActionOutcome::Failed(AgentError::Cancelled),
                Err(e) => {
                    tracing::warn!(agent = %config.name, tool = %call.tool, error = %e, "Tool failed");
                    ActionOutcome::Failed(AgentError::Tool {
                        tool: call.tool.clone(),
                        message: e.to_string(),
                    })
                }
            }
        };

        ExecutedAction {
            agent: config.name.clone(),
            kind: ActionKind::Tool,
            name: call.tool,
            service: None,
            arguments: call.args,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn execute_command(&self, agent: &BaseAgent, command: Command) -> ExecutedAction {
        let config = agent.config();
        let start = Instant::now();
        self.emit(AgentEvent::ActionStart {
            agent: config.name.clone(),
            kind: ActionKind::Command,
            name: command.action.clone(),
            arguments: Value::Object(command.params.clone()),
        });

        let service_name = config.service_for(&command.action).map(str::to_string);
        let outcome = match &service_name {
            None => {
                tracing::warn!(agent = %config.name, action = %command.action, "Command not in agent's table");
                ActionOutcome::Failed(AgentError::denied(
                    &config.name,
                    CapabilityKind::Command,
                    &command.action,
                ))
            }
            Some(service) => match self.services.get(service) {
                None => ActionOutcome::Failed(AgentError::Service {
                    service: service.clone(),
                    message: "not registered".to_string(),
                }),
                Some(backend) => match backend.call(&command.action, &command.params).await {
                    Ok(response) => ActionOutcome::Completed(response.to_string()),
                    Err(e) => {
                        tracing::warn!(
                            agent = %config.name,
                            service = %service,
                            action = %command.action,
                            error = %e,
                            "Service call failed"
                        );
                        ActionOutcome::Failed(AgentError::Service {
                            service: service.clone(),
                            message: e.to_string(),
                        })
                    }
                },
            },
        };

        ExecutedAction {
            agent: config.name.clone(),
            kind: ActionKind::Command,
            name: command.action,
            service: service_name,
            arguments: command.params,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Emit `ActionEnd`, persist, and append to the trail
    fn record(&self, trail: &mut Trail, action: ExecutedAction) {
        self.emit(AgentEvent::ActionEnd {
            agent: action.agent.clone(),
            kind: action.kind,
            name: action.name.clone(),
            output: action.outcome.text(),
            is_error: !action.outcome.is_ok(),
            duration_ms: action.duration_ms,
        });
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_action(&action);
        }
        trail.actions.push(action);
    }
}

/// Validate a `delegate` command. A denial comes back as the action to record.
fn request_delegation(
    agent: &BaseAgent,
    command: Command,
    original_message: &str,
) -> Result<Delegation, ExecutedAction> {
    let config = agent.config();
    let target = command
        .params
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !config.can_nest {
        tracing::warn!(agent = %config.name, target = %target, "Delegation denied: agent cannot nest");
        return Err(ExecutedAction {
            agent: config.name.clone(),
            kind: ActionKind::Delegation,
            outcome: ActionOutcome::Failed(AgentError::denied(
                &config.name,
                CapabilityKind::Delegation,
                &target,
            )),
            name: target,
            service: None,
            arguments: command.params,
            duration_ms: 0,
        });
    }

    let message = command
        .params
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(original_message)
        .to_string();

    Ok(Delegation {
        target,
        message,
        arguments: command.params,
    })
}

fn delegation_action(
    agent: &BaseAgent,
    delegation: Delegation,
    outcome: ActionOutcome,
    start: Instant,
) -> ExecutedAction {
    ExecutedAction {
        agent: agent.name().to_string(),
        kind: ActionKind::Delegation,
        name: delegation.target,
        service: None,
        arguments: delegation.arguments,
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
