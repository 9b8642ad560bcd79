use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::confirmation::{ConfirmationKind, ConfirmationOutcome};
use crate::integrity::IntegrityStatus;
use crate::policy::Decision;
use crate::routing::{ErrorState, FallbackAction};

/// Events emitted while authorizing tool calls and routing model requests
///
/// These events allow observers (telemetry, UI status lines, audit logs) to
/// track every decision the authorization core makes.
#[derive(Debug, Clone)]
pub enum WardenEvent {
    // ===== Policy Lifecycle =====
    /// A security policy was generated for a new user prompt
    PolicyGenerated {
        /// Number of tools with an explicit policy
        tool_count: usize,
        /// How long generation took
        duration: Duration,
    },

    /// Policy generation failed; the turn runs with an empty policy
    PolicyGenerationFailed {
        /// Diagnostic from the oracle
        error: String,
    },

    /// The enforcer reached a verdict for a tool call
    VerdictReached {
        /// Tool call ID
        call_id: String,
        /// Tool name
        tool_name: String,
        /// Verdict
        decision: Decision,
        /// Rationale from the enforcer
        reason: String,
        /// Set when the verdict is a fail-soft default
        error: Option<String>,
    },

    // ===== Confirmation Lifecycle =====
    /// A confirmation request was published on the bus
    ConfirmationRequested {
        /// Correlation ID of the request
        correlation_id: String,
        /// Kind of request
        kind: ConfirmationKind,
    },

    /// A confirmation request was resolved
    ConfirmationResolved {
        /// Correlation ID of the request
        correlation_id: String,
        /// The outcome delivered by the subscriber (or Cancel)
        outcome: ConfirmationOutcome,
    },

    // ===== Tool Lifecycle =====
    /// Tool execution starting (after authorization)
    ToolExecuting {
        /// Tool call ID
        call_id: String,
        /// Tool name
        tool_name: String,
    },

    /// Tool execution finished
    ToolCompleted {
        /// Tool call ID
        call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool output (or error message)
        output: Result<Value, String>,
        /// Execution duration
        duration: Duration,
    },

    /// Tool call was blocked and will not execute
    ToolBlocked {
        /// Tool call ID
        call_id: String,
        /// Tool name
        tool_name: String,
        /// Why the call was blocked
        reason: String,
    },

    // ===== Model Routing =====
    /// A model request is being retried against the same model
    ModelRetry {
        /// Model being retried
        model: String,
        /// Attempt that failed (1-based)
        attempt: usize,
        /// Classified failure state
        state: ErrorState,
        /// Backoff before the next attempt
        delay: Duration,
    },

    /// Routing switched to another model in the chain
    ModelFallback {
        /// Model that failed
        from: String,
        /// Model used for the next attempt
        to: String,
        /// Classified failure state
        state: ErrorState,
        /// The action that triggered the switch
        action: FallbackAction,
    },

    /// The user was asked whether to switch models
    ModelPrompted {
        /// Model that failed
        from: String,
        /// Candidate replacement, if any
        to: Option<String>,
        /// Whether the switch was accepted
        accepted: bool,
    },

    /// Routing gave up; the error surfaces to the caller
    ModelTerminal {
        /// Model whose failure ended routing
        model: String,
        /// Classified failure state
        state: ErrorState,
        /// Error message
        error: String,
    },

    // ===== Integrity =====
    /// A policy directory was checked against its stored hash
    IntegrityChecked {
        /// `{scope}:{identifier}` key
        key: String,
        /// Check status
        status: IntegrityStatus,
        /// Number of files hashed
        file_count: usize,
    },

    /// A policy directory hash was accepted and stored
    IntegrityAccepted {
        /// `{scope}:{identifier}` key
        key: String,
        /// Hash that was stored
        hash: String,
    },
}

impl WardenEvent {
    /// Stable snake_case name for the event variant
    pub fn name(&self) -> &'static str {
        match self {
            WardenEvent::PolicyGenerated { .. } => "policy_generated",
            WardenEvent::PolicyGenerationFailed { .. } => "policy_generation_failed",
            WardenEvent::VerdictReached { .. } => "verdict_reached",
            WardenEvent::ConfirmationRequested { .. } => "confirmation_requested",
            WardenEvent::ConfirmationResolved { .. } => "confirmation_resolved",
            WardenEvent::ToolExecuting { .. } => "tool_executing",
            WardenEvent::ToolCompleted { .. } => "tool_completed",
            WardenEvent::ToolBlocked { .. } => "tool_blocked",
            WardenEvent::ModelRetry { .. } => "model_retry",
            WardenEvent::ModelFallback { .. } => "model_fallback",
            WardenEvent::ModelPrompted { .. } => "model_prompted",
            WardenEvent::ModelTerminal { .. } => "model_terminal",
            WardenEvent::IntegrityChecked { .. } => "integrity_checked",
            WardenEvent::IntegrityAccepted { .. } => "integrity_accepted",
        }
    }
}

/// Hook for observing events
///
/// Implement this trait to receive notifications about authorization and
/// routing decisions.
///
/// # Example
/// ```
/// use warden_core::events::{EventHook, WardenEvent};
///
/// struct Logger;
///
/// impl EventHook for Logger {
///     fn on_event(&self, event: &WardenEvent) {
///         if let WardenEvent::ToolBlocked { tool_name, reason, .. } = event {
///             println!("blocked {}: {}", tool_name, reason);
///         }
///     }
/// }
/// ```
pub trait EventHook: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &WardenEvent);
}

/// Blanket implementation for closures
impl<F> EventHook for F
where
    F: Fn(&WardenEvent) + Send + Sync,
{
    fn on_event(&self, event: &WardenEvent) {
        self(event)
    }
}

/// Unique identifier for a registered hook.
///
/// Used to remove hooks via [`EventHooks::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) u64);

/// Shared registry of event hooks
///
/// Cloning yields a handle to the same registry, so the engine, router and
/// integrity manager of one session can all emit to the same observers.
#[derive(Clone, Default)]
pub struct EventHooks {
    hooks: Arc<parking_lot::RwLock<Vec<(HookId, Arc<dyn EventHook>)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHooks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook
    pub fn add(&self, hook: impl EventHook + 'static) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, Arc::new(hook)));
        id
    }

    /// Remove a hook, returning whether it was registered
    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() < before
    }

    /// Deliver an event to every registered hook
    pub fn emit(&self, event: WardenEvent) {
        // Snapshot so hooks may register/remove hooks without deadlocking
        let hooks: Vec<_> = self.hooks.read().iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook.on_event(&event);
        }
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHooks")
            .field("hooks", &self.len())
            .finish()
    }
}
