//! Model fallback routing.
//!
//! Every outbound model request can be wrapped by a [`FallbackRouter`]. On
//! failure the error is classified into an [`ErrorState`], and the current
//! chain entry's [`ModelPolicy`] decides whether to retry the same model,
//! fall back to the next one, prompt the user, or switch silently.
//!
//! A [`ModelPolicyChain`] always has exactly one last-resort entry, so
//! routing terminates.

mod chain;
mod policy;
mod resolve;
mod router;

pub use chain::{get_model_policy_chain, ModelChainConfig};
pub use policy::{
    create_default_policy, validate_model_policy_chain, ChainError, ErrorState, FallbackAction,
    ModelPolicy, ModelPolicyChain,
};
pub use resolve::{classify_error, resolve_model, resolve_model_after, ModelResolution};
pub use router::{FallbackRouter, RoutedResponse, RoutingError};
