//! # Warden
//!
//! Tool-call authorization and model fallback routing for AI coding agents.
//!
//! Warden sits between an agent loop and its tools and models:
//!
//! - **Policy generation and enforcement**: for every user prompt a policy
//!   model writes a per-tool [`SecurityPolicy`]; every tool call is judged
//!   against it (`allow`, `deny` or `ask_user`).
//! - **Confirmation bus**: calls that need a human are published on a
//!   [`ConfirmationBus`] and suspend until the UI (or a headless handler)
//!   answers.
//! - **Model fallback routing**: a [`FallbackRouter`] retries, falls back,
//!   prompts or switches silently along a validated [`ModelPolicyChain`].
//! - **Policy integrity**: a [`PolicyIntegrityManager`] hashes human-authored
//!   policy directories so out-of-band edits are surfaced for review.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use warden_core::{
//!     ConfirmationBus, ConfirmationKind, LlmPolicyOracle, NonInteractiveHandler, PolicyEngine,
//!     ToolScheduler, TrustedContext, WardenConfig,
//! };
//!
//! # async fn example(generator: Arc<dyn warden_core::ContentGenerator>) -> warden_core::Result<()> {
//! let config = WardenConfig::load("warden.json")?;
//!
//! let bus = ConfirmationBus::new();
//! bus.subscribe(
//!     ConfirmationKind::ToolConfirmation,
//!     Arc::new(NonInteractiveHandler::deny_all()),
//! );
//!
//! let oracle = Arc::new(LlmPolicyOracle::new(generator, &config.policy.model));
//! let engine = Arc::new(PolicyEngine::from_config(oracle, bus, &config.policy));
//! let scheduler =
//!     ToolScheduler::new(engine.clone()).with_max_concurrent_tools(config.policy.max_concurrent_tools);
//!
//! let cancel = CancellationToken::new();
//! engine
//!     .begin_turn("read package.json", &TrustedContext::from_tools(&tools), &cancel)
//!     .await;
//! let outcomes = scheduler.run_turn(model_tool_calls, &executor, &cancel).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - Mock content generator, stub oracle and recording
//!   handlers for downstream tests

pub mod config;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod integrity;
pub mod policy;
pub mod provider;
pub mod routing;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, IntegrityConfig, PolicyConfig, RoutingConfig, WardenConfig};
pub use confirmation::{
    ChannelHandler, ConfirmationBus, ConfirmationError, ConfirmationHandler, ConfirmationKind,
    ConfirmationOutcome, ConfirmationRequest, NonInteractiveHandler, Notification,
    PendingConfirmation, PolicyTarget, Question, Responder, SubscriptionId,
};
pub use error::{Error, Result};
pub use events::{EventHook, EventHooks, HookId, WardenEvent};

// Integrity
pub use integrity::{
    hash_policy_files, FileHashStore, HashStore, HashStoreError, IntegrityCheck, IntegrityError,
    IntegrityStatus, LocalFs, MemoryHashStore, PolicyFile, PolicyFs, PolicyIntegrityManager,
};

// Policy
pub use policy::{
    hash_params, Allowance, AllowanceSet, Authorization, Decision, FailureDefault, LlmPolicyOracle,
    OracleError, OracleVerdict, PolicyEnforcer, PolicyEngine, PolicyGeneration, PolicyGenerator,
    PolicyOracle, SafetyCheckResult, Scope, SecurityPolicy, ToolCallOutcome, ToolCallStatus,
    ToolError, ToolExecutor, ToolPolicy, ToolScheduler, TrustedContext,
};

pub use provider::{ContentGenerator, ContentRequest, ContentResponse, ProviderError, RetryConfig};

// Routing
pub use routing::{
    classify_error, create_default_policy, get_model_policy_chain, resolve_model,
    resolve_model_after, validate_model_policy_chain, ChainError, ErrorState, FallbackAction,
    FallbackRouter, ModelChainConfig, ModelPolicy, ModelPolicyChain, ModelResolution,
    RoutedResponse, RoutingError,
};

pub use types::{Content, Part, Role, ToolCall, ToolDefinition};
