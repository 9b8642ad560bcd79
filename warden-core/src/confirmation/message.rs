//! Messages carried by the confirmation bus.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::policy::{Decision, Scope};
use crate::types::ToolCall;

/// Discriminator used to route messages to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationKind {
    ToolConfirmation,
    AskUser,
    ConsentRequest,
    UpdatePolicy,
    PolicyRejection,
}

impl std::fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfirmationKind::ToolConfirmation => "TOOL_CONFIRMATION",
            ConfirmationKind::AskUser => "ASK_USER",
            ConfirmationKind::ConsentRequest => "CONSENT_REQUEST",
            ConfirmationKind::UpdatePolicy => "UPDATE_POLICY",
            ConfirmationKind::PolicyRejection => "POLICY_REJECTION",
        };
        write!(f, "{}", name)
    }
}

/// One question put to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    /// Short label for UIs that render a header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Suggested answers; empty for free-form
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            header: None,
            options: Vec::new(),
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// A request that suspends its publisher until resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmationRequest {
    /// Confirm (or override) the verdict for a tool call
    ToolConfirmation {
        call: ToolCall,
        /// Verdict that triggered the request
        decision: Decision,
        /// Enforcer rationale shown to the user
        reason: String,
    },

    /// Ask the user one or more questions
    AskUser { questions: Vec<Question> },

    /// Ask for consent to an external action (OAuth and similar)
    Consent { prompt: String },
}

impl ConfirmationRequest {
    pub fn kind(&self) -> ConfirmationKind {
        match self {
            ConfirmationRequest::ToolConfirmation { .. } => ConfirmationKind::ToolConfirmation,
            ConfirmationRequest::AskUser { .. } => ConfirmationKind::AskUser,
            ConfirmationRequest::Consent { .. } => ConfirmationKind::ConsentRequest,
        }
    }

    /// Single question with yes/no options.
    pub fn ask(question: impl Into<String>) -> Self {
        ConfirmationRequest::AskUser {
            questions: vec![Question::new(question).with_options(["yes", "no"])],
        }
    }
}

/// What a policy update applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTarget {
    Tool(String),
    Mcp(String),
}

/// Fire-and-forget messages; every subscriber of the kind receives them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An approval should be remembered; `persist` asks to keep it beyond
    /// this session.
    UpdatePolicy { target: PolicyTarget, persist: bool },

    /// A tool call was blocked
    PolicyRejection { call: ToolCall, reason: String },
}

impl Notification {
    pub fn kind(&self) -> ConfirmationKind {
        match self {
            Notification::UpdatePolicy { .. } => ConfirmationKind::UpdatePolicy,
            Notification::PolicyRejection { .. } => ConfirmationKind::PolicyRejection,
        }
    }
}

/// The single resolution of a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    ProceedOnce,
    ProceedAlways {
        #[serde(default)]
        scope: Scope,
    },
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Cancel,
}

impl ConfirmationOutcome {
    pub fn is_proceed(&self) -> bool {
        matches!(
            self,
            ConfirmationOutcome::ProceedOnce | ConfirmationOutcome::ProceedAlways { .. }
        )
    }

    pub fn deny() -> Self {
        ConfirmationOutcome::Deny { reason: None }
    }
}

/// Delivers the resolution of one request.
///
/// Consumed by [`Responder::respond`]; dropping it unanswered resolves the
/// request as [`ConfirmationOutcome::Cancel`].
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<ConfirmationOutcome>,
}

impl Responder {
    pub(crate) fn new(tx: oneshot::Sender<ConfirmationOutcome>) -> Self {
        Self { tx }
    }

    /// Resolve the request. Returns false if the publisher stopped waiting.
    pub fn respond(self, outcome: ConfirmationOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// Whether the publisher has stopped waiting.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A request handed to the active subscriber.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub correlation_id: String,
    pub request: ConfirmationRequest,
    pub responder: Responder,
    /// Cancelled once the request is no longer pending (answered, timed out
    /// or aborted by the publisher).
    pub cancel: CancellationToken,
}

impl PendingConfirmation {
    pub fn kind(&self) -> ConfirmationKind {
        self.request.kind()
    }

    pub fn respond(self, outcome: ConfirmationOutcome) -> bool {
        self.responder.respond(outcome)
    }
}
