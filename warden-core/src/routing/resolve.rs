//! Error classification and next-model resolution.

use super::policy::{ErrorState, FallbackAction, ModelPolicyChain};
use crate::provider::ProviderError;

/// Map a provider failure onto an [`ErrorState`].
///
/// [`ProviderError::Cancelled`] maps to `Unknown`; the router aborts on
/// cancellation before consulting the chain.
pub fn classify_error(error: &ProviderError) -> ErrorState {
    match error {
        ProviderError::RateLimited(_)
        | ProviderError::ServiceUnavailable(_)
        | ProviderError::Network(_) => ErrorState::Transient,
        ProviderError::NotFound(_) => ErrorState::NotFound,
        ProviderError::QuotaExhausted(_)
        | ProviderError::Authentication(_)
        | ProviderError::Configuration(_)
        | ProviderError::Model(_) => ErrorState::Terminal,
        ProviderError::Server { status, .. } => match status {
            429 | 500 | 502 | 503 | 504 => ErrorState::Transient,
            404 => ErrorState::NotFound,
            _ => ErrorState::Terminal,
        },
        ProviderError::Cancelled | ProviderError::Other(_) => ErrorState::Unknown,
    }
}

/// Outcome of resolving a failure against a chain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelResolution {
    /// Classified failure
    pub state: ErrorState,
    pub action: FallbackAction,
    /// Entry for the next attempt; for `Prompt` the candidate to offer.
    /// `None` when nothing remains to try.
    pub next_index: Option<usize>,
    /// State the next attempt starts from
    pub next_state: ErrorState,
}

/// Decide what follows a failure of the entry at `index`.
pub fn resolve_model(
    chain: &ModelPolicyChain,
    index: usize,
    error: &ProviderError,
) -> ModelResolution {
    resolve_model_after(chain, index, error, None)
}

/// [`resolve_model`] that honors the previous resolution for the same entry.
///
/// A `Retry` whose previous failure had the same state and transitioned to
/// `terminal` is escalated to `Fallback`: that state has used up its retry.
pub fn resolve_model_after(
    chain: &ModelPolicyChain,
    index: usize,
    error: &ProviderError,
    previous: Option<&ModelResolution>,
) -> ModelResolution {
    let state = classify_error(error);
    let Some(policy) = chain.get(index) else {
        return ModelResolution {
            state,
            action: FallbackAction::Prompt,
            next_index: None,
            next_state: ErrorState::Terminal,
        };
    };

    let mut action = policy.action_for(state);
    let next_state = policy.transition_for(state);

    let exhausted = previous
        .is_some_and(|p| p.state == state && p.next_state == ErrorState::Terminal);
    if action == FallbackAction::Retry && exhausted {
        action = FallbackAction::Fallback;
    }

    let next_index = match action {
        FallbackAction::Retry => Some(index),
        FallbackAction::Fallback | FallbackAction::Prompt | FallbackAction::Silent => {
            chain.fallback_target(index)
        }
    };

    ModelResolution {
        state,
        action,
        next_index,
        next_state,
    }
}
