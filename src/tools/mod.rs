//! Built-in tools
//!
//! Each tool implements `crate::tool::Tool`.

mod list_directory;
mod now;
mod read_file;

pub use list_directory::ListDirectoryTool;
pub use now::NowTool;
pub use read_file::ReadFileTool;

use crate::tool::ToolRegistry;
use std::path::PathBuf;

/// Create a registry with all built-in tools. File tools are confined to `root`.
pub fn create_registry(root: PathBuf) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(NowTool);
    registry.register(ReadFileTool::new(root.clone()));
    registry.register(ListDirectoryTool::new(root));

    registry
}
