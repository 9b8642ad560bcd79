use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::policy::{ErrorState, FallbackAction, ModelPolicyChain};
use super::resolve::{resolve_model_after, ModelResolution};
use crate::confirmation::{ConfirmationBus, ConfirmationRequest, Question};
use crate::events::{EventHooks, WardenEvent};
use crate::provider::{
    backoff_delay, ContentGenerator, ContentRequest, ContentResponse, ProviderError, RetryConfig,
};

/// Errors that end routing.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Model request cancelled")]
    Cancelled,

    #[error("Model '{model}' failed ({state}): {source}")]
    Failed {
        model: String,
        state: ErrorState,
        #[source]
        source: ProviderError,
    },
}

impl RoutingError {
    /// The provider error that ended routing, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            RoutingError::Cancelled => None,
            RoutingError::Failed { source, .. } => Some(source),
        }
    }
}

/// A successful response and the model that produced it.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub response: ContentResponse,
    pub model: String,
    /// Requests issued across all models, including the successful one
    pub attempts: usize,
}

/// Wraps a [`ContentGenerator`] with chain-driven retries and fallbacks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use warden_core::provider::{ContentGenerator, ContentRequest, ContentResponse, ProviderError};
/// use warden_core::routing::{get_model_policy_chain, FallbackRouter, ModelChainConfig};
///
/// struct Echo;
///
/// #[async_trait]
/// impl ContentGenerator for Echo {
///     async fn generate_content(
///         &self,
///         request: ContentRequest,
///     ) -> Result<ContentResponse, ProviderError> {
///         Ok(ContentResponse::text_response(request.model, "hello"))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let chain = get_model_policy_chain(&ModelChainConfig::new(["pro", "flash"])).unwrap();
/// let router = FallbackRouter::new(Arc::new(Echo), chain);
///
/// let routed = router
///     .generate(ContentRequest::new("pro", "hi"), &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(routed.model, "pro");
/// # });
/// ```
pub struct FallbackRouter {
    generator: Arc<dyn ContentGenerator>,
    chain: ModelPolicyChain,
    retry: RetryConfig,
    bus: Option<ConfirmationBus>,
    hooks: EventHooks,
}

impl FallbackRouter {
    pub fn new(generator: Arc<dyn ContentGenerator>, chain: ModelPolicyChain) -> Self {
        Self {
            generator,
            chain,
            retry: RetryConfig::default(),
            bus: None,
            hooks: EventHooks::new(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bus used for `Prompt` actions. Without one, prompts surface the error.
    pub fn with_bus(mut self, bus: ConfirmationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn chain(&self) -> &ModelPolicyChain {
        &self.chain
    }

    /// Issue `request`, starting at its model (or the head of the chain when
    /// the model is not in it), following the chain on failure.
    pub async fn generate(
        &self,
        request: ContentRequest,
        cancel: &CancellationToken,
    ) -> Result<RoutedResponse, RoutingError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut index = self.chain.position(&request.model).unwrap_or(0);
        let mut attempt = 0;
        let mut total = 0;
        let mut previous: Option<ModelResolution> = None;

        loop {
            let model = self.model_at(index);
            let mut attempt_request = request.clone();
            attempt_request.model = model.clone();
            attempt += 1;
            total += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                r = self.generator.generate_content(attempt_request) => r,
            };

            let error = match result {
                Ok(response) => {
                    return Ok(RoutedResponse {
                        response,
                        model,
                        attempts: total,
                    })
                }
                Err(ProviderError::Cancelled) => return Err(RoutingError::Cancelled),
                Err(e) => e,
            };

            let resolution = resolve_model_after(&self.chain, index, &error, previous.as_ref());
            let state = resolution.state;

            let (action, next) = match resolution.action {
                FallbackAction::Retry if attempt < max_attempts => {
                    let delay = backoff_delay(attempt, &self.retry);
                    log::warn!(
                        "Model '{}' failed ({}), retrying in {:?} (attempt {}/{}): {}",
                        model,
                        state,
                        delay,
                        attempt,
                        max_attempts,
                        error
                    );
                    self.hooks.emit(WardenEvent::ModelRetry {
                        model: model.clone(),
                        attempt,
                        state,
                        delay,
                    });
                    self.pause(delay, cancel).await?;
                    previous = Some(resolution);
                    continue;
                }
                // Out of attempts on this model
                FallbackAction::Retry => (FallbackAction::Fallback, self.chain.fallback_target(index)),
                action => (action, resolution.next_index),
            };

            let Some(next) = next else {
                return Err(self.terminal(model, state, error));
            };
            let to = self.model_at(next);

            match action {
                FallbackAction::Prompt => {
                    if !self.ask_to_switch(&model, &to, state, &error, cancel).await? {
                        return Err(self.terminal(model, state, error));
                    }
                }
                _ => {
                    let delay = backoff_delay(1, &self.retry);
                    log::warn!(
                        "Model '{}' failed ({}), falling back to '{}': {}",
                        model,
                        state,
                        to,
                        error
                    );
                    self.pause(delay, cancel).await?;
                }
            }

            self.hooks.emit(WardenEvent::ModelFallback {
                from: model,
                to,
                state,
                action,
            });
            index = next;
            attempt = 0;
            previous = None;
        }
    }

    fn model_at(&self, index: usize) -> String {
        self.chain
            .get(index)
            .map(|p| p.model.clone())
            .unwrap_or_default()
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), RoutingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RoutingError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn ask_to_switch(
        &self,
        from: &str,
        to: &str,
        state: ErrorState,
        error: &ProviderError,
        cancel: &CancellationToken,
    ) -> Result<bool, RoutingError> {
        let Some(bus) = &self.bus else {
            log::info!("No confirmation bus; not offering a switch from '{}'", from);
            return Ok(false);
        };

        let question = Question::new(format!(
            "Model '{}' failed ({}): {}. Switch to '{}'?",
            from, state, error, to
        ))
        .with_header("Model unavailable")
        .with_options([format!("Switch to {}", to), "Stop".to_string()]);

        let accepted = match bus
            .request(
                ConfirmationRequest::AskUser {
                    questions: vec![question],
                },
                cancel,
            )
            .await
        {
            Ok(outcome) => outcome.is_proceed(),
            Err(e) => {
                log::warn!("Could not prompt for model switch: {}", e);
                false
            }
        };

        self.hooks.emit(WardenEvent::ModelPrompted {
            from: from.to_string(),
            to: Some(to.to_string()),
            accepted,
        });

        if cancel.is_cancelled() {
            return Err(RoutingError::Cancelled);
        }
        Ok(accepted)
    }

    fn terminal(&self, model: String, state: ErrorState, error: ProviderError) -> RoutingError {
        log::warn!("Model '{}' failed ({}), giving up: {}", model, state, error);
        self.hooks.emit(WardenEvent::ModelTerminal {
            model: model.clone(),
            state,
            error: error.to_string(),
        });
        RoutingError::Failed {
            model,
            state,
            source: error,
        }
    }
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("chain", &self.chain)
            .field("retry", &self.retry)
            .field("prompts", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}
