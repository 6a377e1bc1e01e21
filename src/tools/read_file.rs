//! Read file tool - reads text files under the design root with line numbers

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;
const BINARY_CHECK_SIZE: usize = 8192;

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(alias = "filePath")]
    path: String,
    /// 1-indexed first line
    #[serde(default, alias = "start_line")]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn is_binary_file(path: &Path) -> Result<bool, String> {
        use std::io::Read;
        let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
        let mut buffer = vec![0u8; BINARY_CHECK_SIZE];
        let bytes_read = file.read(&mut buffer).map_err(|e| e.to_string())?;
        Ok(buffer[..bytes_read].contains(&0))
    }
}

/// Resolve `path` against `root`, refusing anything that escapes it
pub(crate) fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf, String> {
    let requested = if path.is_empty() || path == "." {
        root.to_path_buf()
    } else {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            root.join(p)
        }
    };

    let canonical = requested.canonicalize().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            format!("Not found: {}", path)
        } else {
            format!("IO error: {}", e)
        }
    })?;

    let root_canonical = root
        .canonicalize()
        .map_err(|e| format!("Cannot resolve root directory: {}", e))?;

    if !canonical.starts_with(&root_canonical) {
        return Err(format!("Path is outside the allowed directory: {}", path));
    }

    Ok(canonical)
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a text file from the design folder. Returns numbered lines; use offset and limit for long files.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the design folder"
                    },
                    "offset": {
                        "type": "integer",
                        "description": "Line number to start reading from (1-indexed, optional)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of lines to read (optional, default 2000)"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let path = match resolve_in_root(&self.root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if !path.is_file() {
            return ToolResult::error(format!("Not a file: {}", args.path));
        }

        if let Ok(true) = Self::is_binary_file(&path) {
            return ToolResult::error(format!("Binary file cannot be read as text: {}", args.path));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        if content.is_empty() {
            return ToolResult::success("Warning: File exists but has empty contents");
        }

        let offset = args.offset.unwrap_or(1).saturating_sub(1);
        let limit = args.limit.unwrap_or(DEFAULT_LINE_LIMIT);

        let lines: Vec<String> = content
            .lines()
            .skip(offset)
            .take(limit)
            .enumerate()
            .map(|(idx, line)| {
                let line = match line.char_indices().nth(MAX_LINE_LENGTH) {
                    Some((cut, _)) => &line[..cut],
                    None => line,
                };
                format!("{:6}\t{}", offset + idx + 1, line)
            })
            .collect();

        ToolResult::success(lines.join("\n"))
    }

    fn humanize(&self, args: &Value, result: &ToolResult) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        if result.is_error {
            format!("failed to read `{}`: {}", path, result.output)
        } else {
            format!("read `{}` ({} lines)\n{}", path, result.output.lines().count(), result.output)
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

    #[tokio::test]
    async fn test_reads_with_line_numbers() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("robot.md"), "arms\nlegs\nscreen\n").unwrap();

        let tool = ReadFileTool::new(temp.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "robot.md", "offset": 2, "limit": 1}), &ctx())
            .await;

        assert!(!result.is_error);
        assert_eq!(result.output, "     2\tlegs");
    }

    #[tokio::test]
    async fn test_refuses_paths_outside_root() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("designs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "nope").unwrap();

        let tool = ReadFileTool::new(root);
        let result = tool.execute(json!({"path": "../secret.txt"}), &ctx()).await;

        assert!(result.is_error);
        assert!(result.output.contains("outside"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let tool = ReadFileTool::new(temp.path().to_path_buf());
        let result = tool.execute(json!({"path": "ghost.md"}), &ctx()).await;
        assert!(result.is_error);
        assert!(result.output.starts_with("Not found"));
    }

    #[tokio::test]
    async fn test_binary_file_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("blob.bin"), [0u8, 1, 2, 0]).unwrap();
        let tool = ReadFileTool::new(temp.path().to_path_buf());
        let result = tool.execute(json!({"filePath": "blob.bin"}), &ctx()).await;
        assert!(result.is_error);
        assert!(result.output.contains("Binary"));
    }
}
