//! Per-turn security policies for tool calls.
//!
//! For each user prompt a [`PolicyGenerator`] asks a [`PolicyOracle`] for a
//! [`SecurityPolicy`]; each tool call is then judged by a [`PolicyEnforcer`].
//! The [`PolicyEngine`] combines both with session allowances and the
//! confirmation bus, and the [`ToolScheduler`] runs a turn's calls through it.
//!
//! Oracle failures never propagate: the generator returns an empty policy and
//! the enforcer a [`FailureDefault`] verdict, each with the diagnostic attached.

mod allowance;
mod engine;
mod enforcer;
mod generator;
mod oracle;
mod scheduler;
mod types;

pub use allowance::{hash_params, Allowance, AllowanceSet, Scope};
pub use engine::{Authorization, PolicyEngine};
pub use enforcer::PolicyEnforcer;
pub use generator::{PolicyGeneration, PolicyGenerator};
pub use oracle::{
    render_enforcement_prompt, render_generation_prompt, LlmPolicyOracle, OracleError,
    OracleVerdict, PolicyOracle, TrustedContext,
};
pub use scheduler::{ToolCallOutcome, ToolCallStatus, ToolError, ToolExecutor, ToolScheduler};
pub use types::{Decision, FailureDefault, SafetyCheckResult, SecurityPolicy, ToolPolicy};
