//! List directory tool - lists files under the design root

use super::read_file::resolve_in_root;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const MAX_DEPTH: u32 = 10;

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(default)]
    path: String,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    recursive: bool,
}

pub struct ListDirectoryTool {
    root: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn list(
        &self,
        path: &Path,
        base: &Path,
        pattern: Option<&glob::Pattern>,
        max_depth: u32,
        depth: u32,
        output: &mut Vec<String>,
    ) -> Result<(), String> {
        let entries = std::fs::read_dir(path).map_err(|e| format!("Cannot read directory: {}", e))?;

        let mut items: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        items.sort_by_key(|e| e.file_name());

        for entry in items {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            // Hidden files
            if name.starts_with('.') {
                continue;
            }

            let entry_path = entry.path();
            let relative = entry_path.strip_prefix(base).unwrap_or(&entry_path);
            let is_dir = entry_path.is_dir();

            // Directories always shown for navigation
            if let Some(pat) = pattern {
                if !is_dir && !pat.matches(&name) {
                    continue;
                }
            }

            let indent = "  ".repeat(depth as usize);
            let suffix = if is_dir { "/" } else { "" };
            output.push(format!("{}{}{}", indent, relative.display(), suffix));

            if is_dir && depth < max_depth {
                self.list(&entry_path, base, pattern, max_depth, depth + 1, output)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_directory".to_string(),
            description: "List files and folders in the design folder. Accepts a glob pattern like '*.md' to filter files.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Folder relative to the design folder (defaults to the folder itself)"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Optional glob pattern to filter file names (e.g. '*.md', '[rs]*.md')"
                    },
                    "recursive": {
                        "type": "boolean",
                        "description": "List files recursively (default: false)"
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        let path = match resolve_in_root(&self.root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if !path.is_dir() {
            return ToolResult::error(format!("Not a directory: {}", args.path));
        }

        let max_depth = if args.recursive { MAX_DEPTH } else { 0 };
        let pattern = match args.pattern.as_deref().map(glob::Pattern::new) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return ToolResult::error(format!("Invalid pattern: {}", e)),
            None => None,
        };

        let label = if args.path.is_empty() { "." } else { args.path.as_str() };
        let mut output = vec![format!("# {}/", label), String::new()];

        if let Err(e) = self.list(&path, &path, pattern.as_ref(), max_depth, 0, &mut output) {
            return ToolResult::error(e);
        }

        if output.len() == 2 {
            let note = if pattern.is_some() { "(no matches)" } else { "(empty directory)" };
            output.push(note.to_string());
        }

        ToolResult::success(output.join("\n"))
    }

    fn humanize(&self, args: &Value, result: &ToolResult) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        if result.is_error {
            format!("failed to list `{}`: {}", path, result.output)
        } else {
            format!("listed `{}`\n{}", path, result.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext::new("design", CancellationToken::new())
    }

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("parts")).unwrap();
        std::fs::write(temp.path().join("robot.md"), "x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "x").unwrap();
        std::fs::write(temp.path().join(".hidden"), "x").unwrap();
        std::fs::write(temp.path().join("parts").join("arm.md"), "x").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_flat_listing() {
        let temp = fixture();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());
        let result = tool.execute(json!({}), &ctx()).await;

        assert!(!result.is_error);
        assert_eq!(result.output, "# ./\n\nnotes.txt\nparts/\nrobot.md");
    }

    #[tokio::test]
    async fn test_recursive_with_pattern() {
        let temp = fixture();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());
        let result = tool
            .execute(json!({"path": ".", "pattern": "*.md", "recursive": true}), &ctx())
            .await;

        assert!(!result.is_error);
        assert!(result.output.contains("robot.md"));
        assert!(result.output.contains("  parts/arm.md"));
        assert!(!result.output.contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_outside_root_refused() {
        let temp = fixture();
        let tool = ListDirectoryTool::new(temp.path().join("parts"));
        let result = tool.execute(json!({"path": ".."}), &ctx()).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_character_class_pattern() {
        let temp = fixture();
        std::fs::write(temp.path().join("sketch.md"), "x").unwrap();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());

        let result = tool.execute(json!({"pattern": "[rs]*.md"}), &ctx()).await;
        assert!(!result.is_error);
        assert!(result.output.contains("robot.md"));
        assert!(result.output.contains("sketch.md"));
        assert!(!result.output.contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_pattern_without_matches() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("robot.md"), "x").unwrap();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());

        let result = tool.execute(json!({"pattern": "*.png"}), &ctx()).await;
        assert_eq!(result.output, "# ./\n\n(no matches)");

        let result = tool.execute(json!({"pattern": "[unclosed"}), &ctx()).await;
        assert!(result.is_error);
    }
}
