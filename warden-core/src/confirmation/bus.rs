use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::handler::ConfirmationHandler;
use super::message::{
    ConfirmationKind, ConfirmationOutcome, ConfirmationRequest, Notification, PendingConfirmation,
    Responder,
};
use crate::events::{EventHooks, WardenEvent};

/// Errors from the confirmation bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    /// Nobody is subscribed to service this kind of request
    #[error("No subscriber for {0} requests")]
    NoSubscriber(ConfirmationKind),
}

/// Identifies a subscription for [`ConfirmationBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = HashMap<ConfirmationKind, Vec<(SubscriptionId, Arc<dyn ConfirmationHandler>)>>;

#[derive(Default)]
struct BusInner {
    subscribers: parking_lot::RwLock<Subscribers>,
    next_id: AtomicU64,
}

/// Publish/subscribe channel between code that needs a decision and code
/// that can supply one.
///
/// Construct one per session and hand clones to every component; clones
/// share subscribers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use warden_core::confirmation::{
///     ConfirmationBus, ConfirmationKind, ConfirmationOutcome, ConfirmationRequest,
///     NonInteractiveHandler,
/// };
///
/// # tokio_test::block_on(async {
/// let bus = ConfirmationBus::new();
/// bus.subscribe(ConfirmationKind::AskUser, Arc::new(NonInteractiveHandler::approve_all()));
///
/// let outcome = bus
///     .request(ConfirmationRequest::ask("Switch models?"), &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(outcome, ConfirmationOutcome::ProceedOnce);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct ConfirmationBus {
    inner: Arc<BusInner>,
    hooks: EventHooks,
}

impl ConfirmationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register a handler for one kind of message.
    ///
    /// The most recently subscribed handler of a kind services its requests;
    /// unsubscribing it restores the previous one.
    pub fn subscribe(
        &self,
        kind: ConfirmationKind,
        handler: Arc<dyn ConfirmationHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .write()
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a subscription, returning whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let mut removed = false;
        for handlers in subscribers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub_id, _)| *sub_id != id);
            removed |= handlers.len() < before;
        }
        subscribers.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    pub fn has_subscriber(&self, kind: ConfirmationKind) -> bool {
        self.inner.subscribers.read().contains_key(&kind)
    }

    fn active_handler(&self, kind: ConfirmationKind) -> Option<Arc<dyn ConfirmationHandler>> {
        self.inner
            .subscribers
            .read()
            .get(&kind)
            .and_then(|handlers| handlers.last())
            .map(|(_, handler)| handler.clone())
    }

    /// Deliver a notification to every subscriber of its kind.
    ///
    /// Returns how many subscribers received it.
    pub async fn publish(&self, notification: Notification) -> usize {
        let handlers: Vec<_> = self
            .inner
            .subscribers
            .read()
            .get(&notification.kind())
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler.handle_notification(&notification).await;
        }
        handlers.len()
    }

    /// Publish a request and suspend until it is resolved.
    ///
    /// Cancelling `cancel` resolves the request as
    /// [`ConfirmationOutcome::Cancel`], as does a handler dropping the
    /// request unanswered.
    pub async fn request(
        &self,
        request: ConfirmationRequest,
        cancel: &CancellationToken,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        self.request_with_timeout(request, cancel, None).await
    }

    /// [`ConfirmationBus::request`] that also resolves as Cancel once
    /// `timeout` elapses.
    pub async fn request_with_timeout(
        &self,
        request: ConfirmationRequest,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        let kind = request.kind();
        let Some(handler) = self.active_handler(kind) else {
            log::warn!("No subscriber for {} request", kind);
            return Err(ConfirmationError::NoSubscriber(kind));
        };

        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let scope = cancel.child_token();
        let pending = PendingConfirmation {
            correlation_id: correlation_id.clone(),
            request,
            responder: Responder::new(tx),
            cancel: scope.clone(),
        };

        self.hooks.emit(WardenEvent::ConfirmationRequested {
            correlation_id: correlation_id.clone(),
            kind,
        });

        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = scope.cancelled() => ConfirmationOutcome::Cancel,
            _ = deadline => {
                log::info!("{} request {} timed out", kind, correlation_id);
                ConfirmationOutcome::Cancel
            }
            reply = async {
                handler.handle_request(pending).await;
                rx.await
            } => reply.unwrap_or(ConfirmationOutcome::Cancel),
        };
        scope.cancel();

        log::debug!("{} request {} resolved: {:?}", kind, correlation_id, outcome);
        self.hooks.emit(WardenEvent::ConfirmationResolved {
            correlation_id,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }
}

impl std::fmt::Debug for ConfirmationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.inner.subscribers.read().keys().copied().collect();
        f.debug_struct("ConfirmationBus")
            .field("kinds", &kinds)
            .finish()
    }
}
