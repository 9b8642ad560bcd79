//! Per-turn authorization gate.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::allowance::{hash_params, Allowance, AllowanceSet, Scope};
use super::enforcer::PolicyEnforcer;
use super::generator::{PolicyGeneration, PolicyGenerator};
use super::oracle::{PolicyOracle, TrustedContext};
use super::types::{Decision, FailureDefault, SafetyCheckResult, SecurityPolicy};
use crate::config::PolicyConfig;
use crate::confirmation::{
    ConfirmationBus, ConfirmationOutcome, ConfirmationRequest, Notification, PolicyTarget,
};
use crate::events::{EventHooks, WardenEvent};
use crate::types::ToolCall;

/// Whether a tool call may execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed { reason: String },
    Blocked { reason: String },
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allowed { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Authorization::Allowed { reason } | Authorization::Blocked { reason } => reason,
        }
    }
}

/// Gates tool calls for one session.
///
/// Call [`PolicyEngine::begin_turn`] for every user prompt, then
/// [`PolicyEngine::authorize`] for each tool call the model requests. No
/// call is allowed without an `Allow` verdict, a matching session allowance
/// or a user override delivered through the bus.
pub struct PolicyEngine {
    generator: PolicyGenerator,
    enforcer: PolicyEnforcer,
    bus: ConfirmationBus,
    hooks: EventHooks,
    allowances: Arc<AllowanceSet>,
    current: parking_lot::RwLock<Arc<PolicyGeneration>>,
    on_failure: FailureDefault,
    deny_override: bool,
    exact_allowances: bool,
    confirmation_timeout: Option<Duration>,
}

impl PolicyEngine {
    pub fn new(oracle: Arc<dyn PolicyOracle>, bus: ConfirmationBus) -> Self {
        Self {
            generator: PolicyGenerator::new(oracle.clone()),
            enforcer: PolicyEnforcer::new(oracle),
            bus,
            hooks: EventHooks::new(),
            allowances: Arc::new(AllowanceSet::new()),
            current: parking_lot::RwLock::new(Arc::new(PolicyGeneration::default())),
            on_failure: FailureDefault::default(),
            deny_override: false,
            exact_allowances: false,
            confirmation_timeout: None,
        }
    }

    /// Engine configured from the `policy` section of a [`WardenConfig`](crate::WardenConfig).
    pub fn from_config(
        oracle: Arc<dyn PolicyOracle>,
        bus: ConfirmationBus,
        config: &PolicyConfig,
    ) -> Self {
        Self::new(oracle, bus)
            .with_failure_default(config.default_on_failure)
            .with_deny_override(config.deny_override)
            .with_exact_allowances(config.remember_exact_args)
            .with_confirmation_timeout(config.confirmation_timeout())
    }

    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.generator = self.generator.with_hooks(hooks.clone());
        self.hooks = hooks;
        self
    }

    /// Decision applied when the policy or a verdict is unavailable.
    pub fn with_failure_default(mut self, on_failure: FailureDefault) -> Self {
        self.on_failure = on_failure;
        self.enforcer = self.enforcer.with_failure_default(on_failure);
        self
    }

    /// Let the user override `Deny` verdicts instead of blocking outright.
    pub fn with_deny_override(mut self, enabled: bool) -> Self {
        self.deny_override = enabled;
        self
    }

    /// Record "proceed always" answers for the approved arguments only.
    ///
    /// Off by default: an approval then covers every later call of the tool.
    pub fn with_exact_allowances(mut self, enabled: bool) -> Self {
        self.exact_allowances = enabled;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Share an allowance set (e.g. across engines of one session).
    pub fn with_allowances(mut self, allowances: Arc<AllowanceSet>) -> Self {
        self.allowances = allowances;
        self
    }

    pub fn hooks(&self) -> &EventHooks {
        &self.hooks
    }

    pub fn bus(&self) -> &ConfirmationBus {
        &self.bus
    }

    pub fn allowances(&self) -> &AllowanceSet {
        &self.allowances
    }

    /// Regenerate the security policy for a new user prompt.
    ///
    /// Policies are never reused across turns.
    pub async fn begin_turn(
        &self,
        prompt: &str,
        trusted: &TrustedContext,
        cancel: &CancellationToken,
    ) -> PolicyGeneration {
        let generation = self.generator.generate_policy(prompt, trusted, cancel).await;
        *self.current.write() = Arc::new(generation.clone());
        generation
    }

    /// Policy generated by the most recent [`PolicyEngine::begin_turn`].
    pub fn current_policy(&self) -> SecurityPolicy {
        self.current.read().policy.clone()
    }

    /// Decide whether `call` may execute, asking on the bus when required.
    pub async fn authorize(&self, call: &ToolCall, cancel: &CancellationToken) -> Authorization {
        if let Some(allowance) = self.allowances.find(&call.name, &call.args) {
            log::debug!("'{}' allowed by {} allowance", call.name, allowance.scope);
            return Authorization::Allowed {
                reason: format!("Previously approved ({})", allowance.scope),
            };
        }

        let generation = self.current.read().clone();
        if let Some(error) = &generation.error {
            if self.on_failure == FailureDefault::Deny {
                return self
                    .block(call, format!("Security policy unavailable: {}", error))
                    .await;
            }
        }

        let verdict = self
            .enforcer
            .enforce_policy(&generation.policy, call, cancel)
            .await;
        self.hooks.emit(WardenEvent::VerdictReached {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            decision: verdict.decision,
            reason: verdict.reason.clone(),
            error: verdict.error.clone(),
        });

        if cancel.is_cancelled() {
            return self.block(call, "Cancelled".to_string()).await;
        }

        match verdict.decision {
            Decision::Allow => Authorization::Allowed {
                reason: verdict.reason,
            },
            Decision::Deny if !self.deny_override => self.block(call, verdict.reason).await,
            Decision::Deny | Decision::AskUser => self.confirm(call, verdict, cancel).await,
        }
    }

    async fn confirm(
        &self,
        call: &ToolCall,
        verdict: SafetyCheckResult,
        cancel: &CancellationToken,
    ) -> Authorization {
        let request = ConfirmationRequest::ToolConfirmation {
            call: call.clone(),
            decision: verdict.decision,
            reason: verdict.reason,
        };

        let outcome = match self
            .bus
            .request_with_timeout(request, cancel, self.confirmation_timeout)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return self.block(call, e.to_string()).await,
        };

        match outcome {
            ConfirmationOutcome::ProceedOnce => Authorization::Allowed {
                reason: "Approved by user".to_string(),
            },
            ConfirmationOutcome::ProceedAlways { scope } => {
                let allowance = if self.exact_allowances {
                    Allowance::exact(&call.name, hash_params(&call.args))
                } else {
                    Allowance::tool(&call.name)
                };
                self.allowances.add(allowance.with_scope(scope));
                self.bus
                    .publish(Notification::UpdatePolicy {
                        target: PolicyTarget::Tool(call.name.clone()),
                        persist: scope == Scope::Persistent,
                    })
                    .await;
                log::info!("'{}' approved for the rest of the session", call.name);
                Authorization::Allowed {
                    reason: "Always approved by user".to_string(),
                }
            }
            ConfirmationOutcome::Deny { reason } => {
                self.block(call, reason.unwrap_or_else(|| "Denied by user".to_string()))
                    .await
            }
            ConfirmationOutcome::Cancel => {
                self.block(call, "Confirmation cancelled".to_string()).await
            }
        }
    }

    async fn block(&self, call: &ToolCall, reason: String) -> Authorization {
        log::info!("Blocked '{}': {}", call.name, reason);
        self.bus
            .publish(Notification::PolicyRejection {
                call: call.clone(),
                reason: reason.clone(),
            })
            .await;
        Authorization::Blocked { reason }
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("on_failure", &self.on_failure)
            .field("deny_override", &self.deny_override)
            .field("exact_allowances", &self.exact_allowances)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish_non_exhaustive()
    }
}
