//! Built-in tools for SerialAgent.
//!
//! Implements the exec/process tool pair following OpenClaw semantics:
//! - `exec`: run commands foreground or auto-background after yieldMs
//! - `process`: manage background sessions (list/poll/log/write/kill/clear/remove)

pub mod builtins;
pub mod context;
pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;
pub mod registry;
pub mod tool;

pub use builtins::register_builtins;
pub use context::ExecutionContext;
pub use manager::ProcessManager;
pub use registry::{ToolRegistry, USE_SKILL_TOOL_NAME};
pub use tool::{Tool, ToolCategory, ToolOutcome};
