//! Subscribers that resolve confirmation requests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::message::{ConfirmationOutcome, Notification, PendingConfirmation};

/// A subscriber on the [`ConfirmationBus`](super::ConfirmationBus).
///
/// `handle_request` receives ownership of the pending request and must
/// eventually respond (or drop it, which resolves as Cancel). Handlers that
/// need a human should hand the request off and return promptly.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn handle_request(&self, pending: PendingConfirmation);

    /// Observe a notification. Ignored by default.
    async fn handle_notification(&self, _notification: &Notification) {}
}

/// Headless handler answering every request with a fixed outcome.
#[derive(Debug, Clone)]
pub struct NonInteractiveHandler {
    outcome: ConfirmationOutcome,
}

impl NonInteractiveHandler {
    pub fn new(outcome: ConfirmationOutcome) -> Self {
        Self { outcome }
    }

    /// Proceed once on every request.
    pub fn approve_all() -> Self {
        Self::new(ConfirmationOutcome::ProceedOnce)
    }

    /// Deny every request.
    pub fn deny_all() -> Self {
        Self::new(ConfirmationOutcome::Deny {
            reason: Some("non-interactive mode".to_string()),
        })
    }
}

#[async_trait]
impl ConfirmationHandler for NonInteractiveHandler {
    async fn handle_request(&self, pending: PendingConfirmation) {
        log::debug!(
            "Auto-resolving {} request {}",
            pending.kind(),
            pending.correlation_id
        );
        pending.respond(self.outcome.clone());
    }
}

/// Forwards pending requests to a channel, for UIs that answer from their
/// own task.
///
/// ```
/// use warden_core::confirmation::{ChannelHandler, ConfirmationOutcome};
///
/// let (handler, mut rx) = ChannelHandler::new();
/// # drop(handler);
/// # tokio_test::block_on(async move {
/// while let Some(pending) = rx.recv().await {
///     pending.respond(ConfirmationOutcome::ProceedOnce);
/// }
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationHandler for ChannelHandler {
    async fn handle_request(&self, pending: PendingConfirmation) {
        // A closed receiver drops the request, which resolves it as Cancel.
        if self.tx.send(pending).is_err() {
            log::warn!("Confirmation receiver closed; request cancelled");
        }
    }
}
