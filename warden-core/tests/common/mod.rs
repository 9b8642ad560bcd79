//! Common test utilities shared across test files.
//!
//! Items here may not be used by all test files, hence the module-level allow.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use warden_core::{
    integrity::PolicyFs, ContentGenerator, ContentRequest, ContentResponse, EventHooks,
    ProviderError, ToolCall, ToolDefinition, ToolError, ToolExecutor, WardenEvent,
};

// ===== Content generators =====

/// Plays the policy model for the "read package.json" scenario.
///
/// Generation requests get a policy allowing `read_file` for package.json and
/// asking about `run_shell_command`. Enforcement requests are allowed only for
/// a `read_file` call on package.json.
pub struct PolicyModel {
    pub requests: Mutex<Vec<ContentRequest>>,
}

impl PolicyModel {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.contents.iter().map(|c| c.text()).collect::<String>())
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for PolicyModel {
    async fn generate_content(
        &self,
        request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError> {
        let prompt: String = request.contents.iter().map(|c| c.text()).collect();
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let reply = if prompt.contains("security policy generator") {
            json!({"policies": [
                {"tool_name": "read_file", "policy": {
                    "permission": "allow",
                    "constraints": "path must be package.json",
                    "rationale": "Reading package.json is the task"
                }},
                {"tool_name": "run_shell_command", "policy": {
                    "permission": "ask_user",
                    "constraints": "",
                    "rationale": "Not needed to read a file"
                }}
            ]})
        } else if prompt.contains("\"name\": \"read_file\"")
            && prompt.contains("\"path\": \"package.json\"")
        {
            json!({"decision": "allow", "reason": "Matches the read_file constraint"})
        } else if prompt.contains("\"name\": \"read_file\"") {
            json!({"decision": "deny", "reason": "Only package.json may be read"})
        } else {
            json!({"decision": "ask_user", "reason": "Outside the stated task"})
        };

        Ok(ContentResponse::text_response(
            model,
            format!("```json\n{}\n```", reply),
        ))
    }
}

/// A content generator that always fails.
pub struct BrokenGenerator;

#[async_trait]
impl ContentGenerator for BrokenGenerator {
    async fn generate_content(
        &self,
        _request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError> {
        Err(ProviderError::ServiceUnavailable("policy backend down".into()))
    }
}

/// Scripted replies per model; records the model of each request.
pub struct PerModelGenerator {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    pub calls: Mutex<Vec<String>>,
}

impl PerModelGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, model: &str, reply: Result<&str, ProviderError>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply.map(str::to_string));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for PerModelGenerator {
    async fn generate_content(
        &self,
        request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError> {
        self.calls.lock().unwrap().push(request.model.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Ok(text)) => Ok(ContentResponse::text_response(request.model, text)),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::Other(format!(
                "no reply scripted for {}",
                request.model
            ))),
        }
    }
}

// ===== Tools =====

pub fn trusted_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "read_file",
            "Read a file from the workspace",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        ),
        ToolDefinition::new(
            "run_shell_command",
            "Run a shell command",
            json!({"type": "object", "properties": {"command": {"type": "string"}}}),
        ),
    ]
}

/// Executor that records executed calls and echoes their arguments.
pub struct RecordingExecutor {
    pub executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        self.executed.lock().unwrap().push(call.name.clone());
        Ok(json!({"ok": true, "args": call.args}))
    }
}

// ===== Events =====

pub fn collect_events() -> (EventHooks, Arc<Mutex<Vec<WardenEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let hooks = EventHooks::new();
    let sink = events.clone();
    hooks.add(move |event: &WardenEvent| sink.lock().unwrap().push(event.clone()));
    (hooks, events)
}

// ===== Filesystem =====

/// In-memory policy directories; listings come back in reverse name order.
#[derive(Default)]
pub struct ReversedFs {
    dirs: HashMap<PathBuf, Vec<(String, Vec<u8>)>>,
}

impl ReversedFs {
    pub fn with_dir(mut self, dir: &str, files: &[(&str, &str)]) -> Self {
        self.dirs.insert(
            PathBuf::from(dir),
            files
                .iter()
                .map(|(n, c)| (n.to_string(), c.as_bytes().to_vec()))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl PolicyFs for ReversedFs {
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let files = self
            .dirs
            .get(dir)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such dir"))?;
        let mut names: Vec<OsString> = files.iter().map(|(n, _)| OsString::from(n)).collect();
        names.sort();
        names.reverse();
        Ok(names)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let dir = path.parent().unwrap_or(Path::new(""));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.dirs
            .get(dir)
            .and_then(|files| files.iter().find(|(n, _)| *n == name))
            .map(|(_, c)| c.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}
