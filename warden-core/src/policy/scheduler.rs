//! Gated, concurrent execution of a turn's tool calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::engine::{Authorization, PolicyEngine};
use crate::events::WardenEvent;
use crate::types::ToolCall;

/// Error returned by a tool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        ToolError(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        ToolError(s.to_string())
    }
}

/// Runs authorized tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError>;
}

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallStatus {
    Completed(Value),
    Failed(String),
    Blocked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutcome {
    pub call: ToolCall,
    pub status: ToolCallStatus,
    /// Authorization plus execution time
    pub duration: Duration,
}

impl ToolCallOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, ToolCallStatus::Blocked(_))
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.status {
            ToolCallStatus::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Authorizes and executes the tool calls of one model response.
///
/// For every call the verdict is reached before anything is published on the
/// bus, and publication happens before execution.
#[derive(Debug, Clone)]
pub struct ToolScheduler {
    engine: Arc<PolicyEngine>,
    max_concurrent_tools: usize,
}

impl ToolScheduler {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self {
            engine,
            max_concurrent_tools: 8,
        }
    }

    pub fn with_max_concurrent_tools(mut self, max: usize) -> Self {
        self.max_concurrent_tools = max.max(1);
        self
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Run `calls` concurrently (up to the configured limit).
    ///
    /// Returns one outcome per call, in input order.
    pub async fn run_turn(
        &self,
        calls: Vec<ToolCall>,
        executor: &dyn ToolExecutor,
        cancel: &CancellationToken,
    ) -> Vec<ToolCallOutcome> {
        let futures: Vec<_> = calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| async move {
                let outcome = self.run_call(call, executor, cancel).await;
                (index, outcome)
            })
            .collect();

        let mut results: Vec<_> = stream::iter(futures)
            .buffer_unordered(self.max_concurrent_tools)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn run_call(
        &self,
        call: ToolCall,
        executor: &dyn ToolExecutor,
        cancel: &CancellationToken,
    ) -> ToolCallOutcome {
        let start = Instant::now();
        let hooks = self.engine.hooks();

        if let Authorization::Blocked { reason } = self.engine.authorize(&call, cancel).await {
            hooks.emit(WardenEvent::ToolBlocked {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                reason: reason.clone(),
            });
            return ToolCallOutcome {
                call,
                status: ToolCallStatus::Blocked(reason),
                duration: start.elapsed(),
            };
        }

        hooks.emit(WardenEvent::ToolExecuting {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
        });
        let exec_start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::from("Tool execution cancelled")),
            r = executor.execute(&call) => r,
        };

        hooks.emit(WardenEvent::ToolCompleted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: result.clone().map_err(|e| e.to_string()),
            duration: exec_start.elapsed(),
        });

        let status = match result {
            Ok(value) => ToolCallStatus::Completed(value),
            Err(e) => {
                log::debug!("Tool '{}' failed: {}", call.name, e);
                ToolCallStatus::Failed(e.to_string())
            }
        };
        ToolCallOutcome {
            call,
            status,
            duration: start.elapsed(),
        }
    }
}
