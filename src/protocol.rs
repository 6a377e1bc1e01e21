//! Command protocol parser
//!
//! Agents trigger side effects by embedding fenced blocks in their replies:
//!
//! ~~~text
//! Setting that now! ```command
//! {"action": "timer_set", "params": {"minutes": 10, "label": "Pizza"}}
//! ```
//! ~~~
//!
//! and, for read-only tools:
//!
//! ~~~text
//! ```tool_call
//! {"tool": "read_file", "args": {"path": "designs/robot.md"}}
//! ```
//! ~~~
//!
//! The fence labels and the `action`/`params`, `tool`/`args` field names are
//! shared with the prompt text and must not change.
//!
//! This module is syntax only: it never executes anything and knows nothing
//! about what an action means. Inline presentation tags (`[FACE:happy]`, ...)
//! are left in the prose for the renderer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

const FENCE: &str = "```";

fn opener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```(command|tool_call)[ \t]*\r?\n").expect("opener pattern is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(FACE|LED|SOUND|EMOTION):([^\]\s]+)\]").expect("tag pattern is valid")
    })
}

/// Fence label of a protocol block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Command,
    ToolCall,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::Command => "command",
            BlockKind::ToolCall => "tool_call",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "command" => Some(BlockKind::Command),
            "tool_call" => Some(BlockKind::ToolCall),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A service action requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Command {
    pub fn new(action: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// Render as a fenced block, exactly as the prompts document it
    pub fn to_fenced(&self) -> String {
        fenced(BlockKind::Command, &serde_json::json!(self))
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    pub fn to_fenced(&self) -> String {
        fenced(BlockKind::ToolCall, &serde_json::json!(self))
    }
}

fn fenced(kind: BlockKind, body: &Value) -> String {
    format!("{FENCE}{}\n{}\n{FENCE}", kind.label(), body)
}

/// A fenced block whose content could not be decoded
///
/// Scoped to one block: the rest of the reply is still extracted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed {kind} block #{index}: {reason}")]
pub struct ParseError {
    /// Position of the block among all protocol blocks in the reply
    pub index: usize,
    pub kind: BlockKind,
    pub reason: String,
    pub raw: String,
}

/// One protocol block, in reply order
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBlock {
    Command(Command),
    ToolCall(ToolCall),
    Malformed(ParseError),
}

/// A reply split into display prose and protocol blocks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedReply {
    /// Prose with protocol blocks removed, trimmed
    pub text: String,
    pub blocks: Vec<ParsedBlock>,
}

impl ParsedReply {
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.blocks.iter().filter_map(|b| match b {
            ParsedBlock::Command(c) => Some(c),
            _ => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &ParseError> {
        self.blocks.iter().filter_map(|b| match b {
            ParsedBlock::Malformed(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_plain(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Split a model reply into prose and protocol blocks.
///
/// A block opens at the literal fence label followed by a line break and
/// closes at the next fence. An opener with no closer swallows the rest of
/// the reply and is reported as malformed.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let mut prose = String::with_capacity(reply.len());
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = opener_re().captures_at(reply, cursor) {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let Some(kind) = BlockKind::from_label(label.as_str()) else {
            break;
        };
        let index = blocks.len();

        prose.push_str(&reply[cursor..whole.start()]);
        let body_start = whole.end();

        match reply[body_start..].find(FENCE) {
            Some(offset) => {
                let body = &reply[body_start..body_start + offset];
                blocks.push(decode_block(index, kind, body));
                cursor = body_start + offset + FENCE.len();
            }
            None => {
                blocks.push(ParsedBlock::Malformed(ParseError {
                    index,
                    kind,
                    reason: "unterminated fence".to_string(),
                    raw: reply[body_start..].to_string(),
                }));
                cursor = reply.len();
            }
        }
    }

    prose.push_str(&reply[cursor..]);

    ParsedReply {
        text: prose.trim().to_string(),
        blocks,
    }
}

fn decode_block(index: usize, kind: BlockKind, body: &str) -> ParsedBlock {
    let trimmed = body.trim();
    let malformed = |reason: String| {
        ParsedBlock::Malformed(ParseError {
            index,
            kind,
            reason,
            raw: body.to_string(),
        })
    };

    if trimmed.is_empty() {
        return malformed("empty block".to_string());
    }

    match kind {
        BlockKind::Command => match serde_json::from_str::<Command>(trimmed) {
            Ok(command) => ParsedBlock::Command(command),
            Err(e) => malformed(e.to_string()),
        },
        BlockKind::ToolCall => match serde_json::from_str::<ToolCall>(trimmed) {
            Ok(call) => ParsedBlock::ToolCall(call),
            Err(e) => malformed(e.to_string()),
        },
    }
}

/// Inline presentation tag kinds understood by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Face,
    Led,
    Sound,
    Emotion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationTag {
    pub kind: TagKind,
    pub value: String,
}

/// List the presentation tags in `text`, in order. The text is not modified.
pub fn presentation_tags(text: &str) -> Vec<PresentationTag> {
    tag_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let kind = match caps.get(1)?.as_str() {
                "FACE" => TagKind::Face,
                "LED" => TagKind::Led,
                "SOUND" => TagKind::Sound,
                "EMOTION" => TagKind::Emotion,
                _ => return None,
            };
            Some(PresentationTag {
                kind,
                value: caps.get(2)?.as_str().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_plain_reply_has_no_blocks() {
        let parsed = parse_reply("  Hi there! [FACE:happy] How are you?  ");
        assert!(parsed.is_plain());
        assert_eq!(parsed.text, "Hi there! [FACE:happy] How are you?");
    }

    #[test]
    fn test_timer_example() {
        let reply = "Sure! ```command\n{\"action\": \"timer_set\", \"params\": {\"minutes\": 10, \"label\": \"Pizza\"}}\n```";
        let parsed = parse_reply(reply);

        assert_eq!(parsed.text, "Sure!");
        assert_eq!(parsed.blocks.len(), 1);
        let commands: Vec<_> = parsed.commands().collect();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action, "timer_set");
        assert_eq!(
            commands[0].params,
            obj(json!({"minutes": 10, "label": "Pizza"}))
        );
    }

    #[test]
    fn test_structural_round_trip() {
        let command = Command::new(
            "calendar_create",
            obj(json!({"title": "Dentist", "start": "2026-10-20T09:00:00", "reminders": [10, 60]})),
        );
        let call = ToolCall::new("read_file", obj(json!({"path": "notes/plan.md"})));
        let reply = format!(
            "On it.\n{}\nand\n{}\nDone.",
            command.to_fenced(),
            call.to_fenced()
        );

        let parsed = parse_reply(&reply);
        assert_eq!(
            parsed.blocks,
            vec![
                ParsedBlock::Command(command),
                ParsedBlock::ToolCall(call)
            ]
        );
        assert_eq!(parsed.text, "On it.\n\nand\n\nDone.");
    }

    #[test]
    fn test_malformed_block_does_not_stop_extraction() {
        let reply = "First ```command\n{\"action\": \"music_play\", \"params\": \n```\nthen\n```command\n{\"action\": \"music_volume\", \"params\": {\"level\": 40}}\n```";
        let parsed = parse_reply(reply);

        assert_eq!(parsed.blocks.len(), 2);
        let errors: Vec<_> = parsed.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 0);
        assert_eq!(errors[0].kind, BlockKind::Command);

        let commands: Vec<_> = parsed.commands().collect();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action, "music_volume");
        assert_eq!(parsed.text, "First \nthen");
    }

    #[test]
    fn test_missing_action_is_malformed() {
        let parsed = parse_reply("```command\n{\"params\": {}}\n```");
        let errors: Vec<_> = parsed.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("action"));
    }

    #[test]
    fn test_params_and_args_default_to_empty() {
        let parsed = parse_reply(
            "```command\n{\"action\": \"music_pause\"}\n```\n```tool_call\n{\"tool\": \"now\"}\n```",
        );
        assert_eq!(
            parsed.blocks,
            vec![
                ParsedBlock::Command(Command::new("music_pause", Map::new())),
                ParsedBlock::ToolCall(ToolCall::new("now", Map::new())),
            ]
        );
    }

    #[test]
    fn test_non_object_params_is_malformed() {
        let parsed = parse_reply("```command\n{\"action\": \"timer_set\", \"params\": [1, 2]}\n```");
        assert_eq!(parsed.errors().count(), 1);
        assert_eq!(parsed.commands().count(), 0);
    }

    #[test]
    fn test_unterminated_block() {
        let parsed = parse_reply("Okay! ```tool_call\n{\"tool\": \"now\"}");
        assert_eq!(parsed.text, "Okay!");
        let errors: Vec<_> = parsed.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, BlockKind::ToolCall);
        assert_eq!(errors[0].reason, "unterminated fence");
    }

    #[test]
    fn test_other_fences_stay_in_prose() {
        let reply = "Here's the config:\n```json\n{\"action\": \"nope\"}\n```\nand a label ```commands\nx\n```";
        let parsed = parse_reply(reply);
        assert!(parsed.is_plain());
        assert_eq!(parsed.text, reply);
    }

    #[test]
    fn test_block_order_is_preserved() {
        let reply = "```tool_call\n{\"tool\": \"now\"}\n```\n```command\n{\"action\": \"timer_set\"}\n```\n```tool_call\n{\"tool\": \"read_file\", \"args\": {\"path\": \"a\"}}\n```";
        let parsed = parse_reply(reply);
        let labels: Vec<_> = parsed
            .blocks
            .iter()
            .map(|b| match b {
                ParsedBlock::Command(c) => c.action.clone(),
                ParsedBlock::ToolCall(t) => t.tool.clone(),
                ParsedBlock::Malformed(_) => "malformed".to_string(),
            })
            .collect();
        assert_eq!(labels, vec!["now", "timer_set", "read_file"]);
    }

    #[test]
    fn test_crlf_opener() {
        let parsed = parse_reply("```command\r\n{\"action\": \"lights_on\"}\r\n```");
        assert_eq!(parsed.commands().count(), 1);
    }

    #[test]
    fn test_presentation_tags_pass_through() {
        let reply = "[FACE:excited] [LED:blue] Timer set! [SOUND:ding] ```command\n{\"action\": \"timer_set\"}\n``` [EMOTION:proud]";
        let parsed = parse_reply(reply);
        assert_eq!(
            parsed.text,
            "[FACE:excited] [LED:blue] Timer set! [SOUND:ding]  [EMOTION:proud]"
        );

        let tags = presentation_tags(&parsed.text);
        assert_eq!(
            tags,
            vec![
                PresentationTag { kind: TagKind::Face, value: "excited".into() },
                PresentationTag { kind: TagKind::Led, value: "blue".into() },
                PresentationTag { kind: TagKind::Sound, value: "ding".into() },
                PresentationTag { kind: TagKind::Emotion, value: "proud".into() },
            ]
        );
    }
}
