//! Built-in `Tool` implementations wrapping the teacher's existing
//! exec/file/process logic, plus the `use_skill` reroute target.

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::error::Result;

use crate::context::ExecutionContext;
use crate::exec::{self, ExecRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};
use crate::manager::ProcessManager;
use crate::process::{self, ProcessRequest};
use crate::registry::{ToolRegistry, USE_SKILL_TOOL_NAME};
use crate::tool::{Tool, ToolCategory, ToolOutcome};

/// Registers every built-in tool against `manager`'s shared process table.
pub fn register_builtins(registry: &ToolRegistry, manager: Arc<ProcessManager>) {
    registry.register(Arc::new(ExecTool { manager: manager.clone() }));
    registry.register(Arc::new(ProcessTool { manager }));
    registry.register(Arc::new(FileReadTool));
    registry.register(Arc::new(FileWriteTool));
    registry.register(Arc::new(FileAppendTool));
    registry.register(Arc::new(FileMoveTool));
    registry.register(Arc::new(FileDeleteTool));
    registry.register(Arc::new(FileListTool));
    registry.register(Arc::new(UseSkillTool));
}

fn value_error(label: &str, err: impl std::fmt::Display) -> ToolOutcome {
    ToolOutcome::error(format!("{label}: {err}"))
}

// ── exec ─────────────────────────────────────────────────────────────

struct ExecTool {
    manager: Arc<ProcessManager>,
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }
    fn description(&self) -> &str {
        "Run a shell command, in the foreground or as a background session."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Process
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "background": {"type": "boolean"},
                "yield_ms": {"type": "integer"},
                "timeout_sec": {"type": "integer"},
                "workdir": {"type": "string"},
                "env": {"type": "object", "additionalProperties": {"type": "string"}},
            },
            "required": ["command"],
        })
    }

    async fn execute(&self, input: serde_json::Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        let mut req: ExecRequest = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(value_error("invalid exec input", e)),
        };
        if req.workdir.is_none() {
            req.workdir = Some(context.work_dir.display().to_string());
        }
        let response = exec::exec(&self.manager, req).await;
        Ok(ToolOutcome::ok(
            response
                .output
                .clone()
                .or_else(|| response.tail.clone())
                .unwrap_or_default(),
        )
        .with_metadata(serde_json::to_value(&response).unwrap_or_default()))
    }
}

// ── process management ──────────────────────────────────────────────

struct ProcessTool {
    manager: Arc<ProcessManager>,
}

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        "process"
    }
    fn description(&self) -> &str {
        "Inspect or control background exec sessions (list, poll, log, write, kill, clear, remove)."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Process
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                "session_id": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"},
                "tail_lines": {"type": "integer"},
                "data": {"type": "string"},
                "eof": {"type": "boolean"},
            },
            "required": ["action"],
        })
    }

    async fn execute(&self, input: serde_json::Value, _context: &ExecutionContext) -> Result<ToolOutcome> {
        let req: ProcessRequest = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(value_error("invalid process input", e)),
        };
        let response = process::handle_process(&self.manager, req).await;
        let outcome = if response.success {
            ToolOutcome::ok(response.data.clone().unwrap_or_default().to_string())
        } else {
            ToolOutcome::error(response.error.clone().unwrap_or_else(|| "process action failed".into()))
        };
        Ok(outcome.with_metadata(serde_json::to_value(&response).unwrap_or_default()))
    }
}

// ── file ops ─────────────────────────────────────────────────────────

macro_rules! file_tool {
    ($struct_name:ident, $name:expr, $description:expr, $category:expr, $req:ty, $schema:expr, $func:path) => {
        struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $name
            }
            fn description(&self) -> &str {
                $description
            }
            fn category(&self) -> ToolCategory {
                $category
            }
            fn parameters(&self) -> serde_json::Value {
                $schema
            }

            async fn execute(&self, input: serde_json::Value, context: &ExecutionContext) -> Result<ToolOutcome> {
                let req: $req = match serde_json::from_value(input) {
                    Ok(r) => r,
                    Err(e) => return Ok(value_error(concat!("invalid ", $name, " input"), e)),
                };
                match $func(&context.work_dir, req).await {
                    Ok(value) => Ok(ToolOutcome::ok(value.to_string()).with_metadata(value)),
                    Err(e) => Ok(ToolOutcome::error(e)),
                }
            }
        }
    };
}

file_tool!(
    FileReadTool,
    "fs_read",
    "Read a workspace file, optionally by line range.",
    ToolCategory::FileSystem,
    FileReadRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"path": {"type": "string"}, "offset": {"type": "integer"}, "limit": {"type": "integer"}},
        "required": ["path"],
    }),
    file_ops::file_read
);

file_tool!(
    FileWriteTool,
    "fs_write",
    "Write (create or overwrite) a workspace file.",
    ToolCategory::FileSystem,
    FileWriteRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
        "required": ["path", "content"],
    }),
    file_ops::file_write
);

file_tool!(
    FileAppendTool,
    "fs_append",
    "Append content to a workspace file.",
    ToolCategory::FileSystem,
    FileAppendRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
        "required": ["path", "content"],
    }),
    file_ops::file_append
);

file_tool!(
    FileMoveTool,
    "fs_move",
    "Move or rename a workspace file.",
    ToolCategory::FileSystem,
    FileMoveRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"source": {"type": "string"}, "destination": {"type": "string"}},
        "required": ["source", "destination"],
    }),
    file_ops::file_move
);

file_tool!(
    FileDeleteTool,
    "fs_delete",
    "Delete a workspace file.",
    ToolCategory::FileSystem,
    FileDeleteRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"path": {"type": "string"}},
        "required": ["path"],
    }),
    file_ops::file_delete
);

file_tool!(
    FileListTool,
    "fs_list",
    "List directory entries within the workspace.",
    ToolCategory::FileSystem,
    FileListRequest,
    serde_json::json!({
        "type": "object",
        "properties": {"path": {"type": "string"}},
    }),
    file_ops::file_list
);

// ── use_skill ────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct UseSkillInput {
    skill_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    input: serde_json::Value,
}

struct UseSkillTool;

#[async_trait]
impl Tool for UseSkillTool {
    fn name(&self) -> &str {
        USE_SKILL_TOOL_NAME
    }
    fn description(&self) -> &str {
        "Activate a skill by id, loading its instructions into context."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Skill
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"skill_id": {"type": "string"}},
            "required": ["skill_id"],
        })
    }

    async fn execute(&self, input: serde_json::Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        let req: UseSkillInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(value_error("invalid use_skill input", e)),
        };
        let Some(registry) = context.skill_registry.as_ref() else {
            return Ok(ToolOutcome::error("no skill registry configured"));
        };
        match registry.get(&req.skill_id) {
            Some(skill) => {
                registry.record_use(&skill.id);
                Ok(ToolOutcome::ok(skill.instructions.clone()).with_metadata(serde_json::json!({
                    "skill_id": skill.id,
                    "name": skill.name,
                })))
            }
            None => Ok(ToolOutcome::error(format!("no such skill: {}", req.skill_id))),
        }
    }
}
