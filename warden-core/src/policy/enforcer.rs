//! Per-call policy enforcement.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::oracle::PolicyOracle;
use super::types::{FailureDefault, SafetyCheckResult, SecurityPolicy};
use crate::types::ToolCall;

/// Judges individual tool calls against the current turn's policy.
#[derive(Clone)]
pub struct PolicyEnforcer {
    oracle: Arc<dyn PolicyOracle>,
    on_failure: FailureDefault,
}

impl PolicyEnforcer {
    pub fn new(oracle: Arc<dyn PolicyOracle>) -> Self {
        Self {
            oracle,
            on_failure: FailureDefault::default(),
        }
    }

    /// Decision returned when the oracle cannot be reached or answers garbage.
    pub fn with_failure_default(mut self, on_failure: FailureDefault) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn failure_default(&self) -> FailureDefault {
        self.on_failure
    }

    /// Produce a verdict for `call`.
    ///
    /// Tools without an entry in `policy` are judged with an empty policy.
    /// Oracle failures yield the configured failure default with `error`
    /// set; cancellation always yields `Deny`.
    pub async fn enforce_policy(
        &self,
        policy: &SecurityPolicy,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> SafetyCheckResult {
        let tool_policy = policy.get(&call.name);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return SafetyCheckResult::cancelled();
            }
            r = self.oracle.enforce(tool_policy, call) => r,
        };

        match result {
            Ok(verdict) => SafetyCheckResult::new(verdict.decision, verdict.reason),
            Err(e) => {
                log::warn!(
                    "Safety check for '{}' failed, defaulting to {}: {}",
                    call.name,
                    self.on_failure.decision(),
                    e
                );
                SafetyCheckResult::failed(self.on_failure.decision(), e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEnforcer")
            .field("on_failure", &self.on_failure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{Decision, ToolPolicy};
    use crate::test_utils::StubOracle;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall::with_id("c1", name, json!({"path": "package.json"}))
    }

    #[tokio::test]
    async fn test_verdict_passes_through() {
        let oracle = StubOracle::new().with_verdict("read_file", Decision::Allow, "in scope");
        let enforcer = PolicyEnforcer::new(Arc::new(oracle));
        let policy = SecurityPolicy::new()
            .with_tool("read_file", ToolPolicy::new(Decision::Allow, "", ""));

        let result = enforcer
            .enforce_policy(&policy, &call("read_file"), &CancellationToken::new())
            .await;
        assert_eq!(result.decision, Decision::Allow);
        assert_eq!(result.reason, "in scope");
        assert!(!result.is_fail_soft());
    }

    #[tokio::test]
    async fn test_absent_tool_is_judged_with_empty_policy() {
        let oracle = Arc::new(StubOracle::new().with_verdict("shell", Decision::AskUser, "no policy"));
        let enforcer = PolicyEnforcer::new(oracle.clone());

        let result = enforcer
            .enforce_policy(&SecurityPolicy::new(), &call("shell"), &CancellationToken::new())
            .await;
        assert_eq!(result.decision, Decision::AskUser);
        assert_eq!(oracle.enforced_policies(), vec![None]);
    }

    #[tokio::test]
    async fn test_oracle_failure_uses_failure_default() {
        let allow = PolicyEnforcer::new(Arc::new(StubOracle::failing("offline")));
        let r = allow
            .enforce_policy(&SecurityPolicy::new(), &call("x"), &CancellationToken::new())
            .await;
        assert_eq!(r.decision, Decision::Allow);
        assert!(r.error.unwrap().contains("offline"));

        let deny = PolicyEnforcer::new(Arc::new(StubOracle::failing("offline")))
            .with_failure_default(FailureDefault::Deny);
        let r = deny
            .enforce_policy(&SecurityPolicy::new(), &call("x"), &CancellationToken::new())
            .await;
        assert_eq!(r.decision, Decision::Deny);
    }

    #[tokio::test]
    async fn test_cancellation_denies() {
        let enforcer = PolicyEnforcer::new(Arc::new(StubOracle::new().pending()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let r = enforcer
            .enforce_policy(&SecurityPolicy::new(), &call("x"), &cancel)
            .await;
        assert_eq!(r.decision, Decision::Deny);
        assert_eq!(r.reason, "cancelled");
        assert_eq!(r.error.as_deref(), Some("cancelled"));
    }
}
