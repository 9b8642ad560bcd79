//! Test utilities for warden-core.
//!
//! Stubs for the content generator, policy oracle and confirmation
//! subscribers, so the engine and router can be exercised without a model
//! backend.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! warden-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::confirmation::{
    ConfirmationHandler, ConfirmationOutcome, ConfirmationRequest, Notification,
    PendingConfirmation,
};
use crate::events::{EventHooks, WardenEvent};
use crate::policy::{
    Decision, OracleError, OracleVerdict, PolicyOracle, SecurityPolicy, ToolPolicy, TrustedContext,
};
use crate::provider::{ContentGenerator, ContentRequest, ContentResponse, ProviderError};
use crate::types::ToolCall;

type ErrorFactory = Box<dyn Fn() -> ProviderError + Send + Sync>;

/// A scripted content generator.
///
/// Returns queued replies in order. Once the queue is empty it returns the
/// default error, if one is set, and otherwise fails with
/// [`ProviderError::Other`].
#[derive(Default)]
pub struct MockContentGenerator {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_error: Option<ErrorFactory>,
    requests: Mutex<Vec<ContentRequest>>,
}

impl MockContentGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    /// Error returned once the queue is exhausted.
    pub fn with_default_error(
        mut self,
        error: impl Fn() -> ProviderError + Send + Sync + 'static,
    ) -> Self {
        self.default_error = Some(Box::new(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ContentRequest> {
        self.requests.lock().clone()
    }

    /// Model of every request, in order.
    pub fn requested_models(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.model.clone()).collect()
    }
}

#[async_trait]
impl ContentGenerator for MockContentGenerator {
    async fn generate_content(
        &self,
        request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().push(request);

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Ok(text)) => Ok(ContentResponse::text_response(model, text)),
            Some(Err(e)) => Err(e),
            None => match &self.default_error {
                Some(factory) => Err(factory()),
                None => Err(ProviderError::Other("no scripted reply".to_string())),
            },
        }
    }
}

/// A policy oracle with fixed answers.
///
/// `enforce` returns the verdict registered for the tool, else a verdict
/// mirroring the tool's permission in the configured policy, else `Allow`.
#[derive(Default)]
pub struct StubOracle {
    policy: SecurityPolicy,
    verdicts: HashMap<String, OracleVerdict>,
    failure: Option<String>,
    pending: bool,
    generation_prompts: Mutex<Vec<String>>,
    enforced: Mutex<Vec<Option<ToolPolicy>>>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle whose every call fails with a provider error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_verdict(
        mut self,
        tool: impl Into<String>,
        decision: Decision,
        reason: impl Into<String>,
    ) -> Self {
        self.verdicts.insert(
            tool.into(),
            OracleVerdict {
                decision,
                reason: reason.into(),
            },
        );
        self
    }

    /// Never answer; only cancellation ends a call.
    pub fn pending(mut self) -> Self {
        self.pending = true;
        self
    }

    /// Prompts passed to `generate`, in order.
    pub fn generation_prompts(&self) -> Vec<String> {
        self.generation_prompts.lock().clone()
    }

    /// Tool policies passed to `enforce`, in order.
    pub fn enforced_policies(&self) -> Vec<Option<ToolPolicy>> {
        self.enforced.lock().clone()
    }

    async fn gate(&self) -> Result<(), OracleError> {
        if self.pending {
            std::future::pending::<()>().await;
        }
        match &self.failure {
            Some(message) => Err(OracleError::Provider(ProviderError::Network(
                message.clone(),
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PolicyOracle for StubOracle {
    async fn generate(
        &self,
        prompt: &str,
        _trusted: &TrustedContext,
    ) -> Result<SecurityPolicy, OracleError> {
        self.generation_prompts.lock().push(prompt.to_string());
        self.gate().await?;
        Ok(self.policy.clone())
    }

    async fn enforce(
        &self,
        policy: Option<&ToolPolicy>,
        call: &ToolCall,
    ) -> Result<OracleVerdict, OracleError> {
        self.enforced.lock().push(policy.cloned());
        self.gate().await?;

        if let Some(verdict) = self.verdicts.get(&call.name) {
            return Ok(verdict.clone());
        }
        Ok(match self.policy.get(&call.name) {
            Some(p) => OracleVerdict {
                decision: p.permission,
                reason: p.rationale.clone(),
            },
            None => OracleVerdict {
                decision: Decision::Allow,
                reason: "no objection".to_string(),
            },
        })
    }
}

/// Collects every emitted event.
#[derive(Clone)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<WardenEvent>>>,
    hooks: EventHooks,
}

impl EventCollector {
    pub fn new() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let hooks = EventHooks::new();
        let sink = events.clone();
        hooks.add(move |event: &WardenEvent| sink.lock().push(event.clone()));
        Self { events, hooks }
    }

    /// Registry feeding this collector; pass it to components under test.
    pub fn hooks(&self) -> EventHooks {
        self.hooks.clone()
    }

    pub fn events(&self) -> Vec<WardenEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(WardenEvent::name).collect()
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers requests with a fixed outcome and records everything it sees.
pub struct RecordingHandler {
    outcome: ConfirmationOutcome,
    requests: Mutex<Vec<ConfirmationRequest>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingHandler {
    pub fn new(outcome: ConfirmationOutcome) -> Self {
        Self {
            outcome,
            requests: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl ConfirmationHandler for RecordingHandler {
    async fn handle_request(&self, pending: PendingConfirmation) {
        self.requests.lock().push(pending.request.clone());
        pending.respond(self.outcome.clone());
    }

    async fn handle_notification(&self, notification: &Notification) {
        self.notifications.lock().push(notification.clone());
    }
}
