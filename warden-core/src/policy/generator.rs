//! Per-turn security policy generation.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::oracle::{PolicyOracle, TrustedContext};
use super::types::SecurityPolicy;
use crate::events::{EventHooks, WardenEvent};

/// Result of [`PolicyGenerator::generate_policy`].
///
/// On failure `policy` is empty and `error` describes what went wrong; the
/// caller decides whether an empty policy fails open or closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyGeneration {
    pub policy: SecurityPolicy,
    pub error: Option<String>,
}

impl PolicyGeneration {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Generates a [`SecurityPolicy`] for each user prompt.
///
/// Never returns an error: every oracle failure becomes an empty policy
/// plus a diagnostic.
#[derive(Clone)]
pub struct PolicyGenerator {
    oracle: Arc<dyn PolicyOracle>,
    hooks: EventHooks,
}

impl PolicyGenerator {
    pub fn new(oracle: Arc<dyn PolicyOracle>) -> Self {
        Self {
            oracle,
            hooks: EventHooks::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Ask the oracle for a policy covering `trusted`'s tools.
    ///
    /// Cancelling `cancel` aborts the in-flight oracle call.
    pub async fn generate_policy(
        &self,
        prompt: &str,
        trusted: &TrustedContext,
        cancel: &CancellationToken,
    ) -> PolicyGeneration {
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("policy generation cancelled".to_string()),
            r = self.oracle.generate(prompt, trusted) => r.map_err(|e| e.to_string()),
        };

        match result {
            Ok(policy) => {
                log::debug!("Generated security policy for {} tools", policy.len());
                self.hooks.emit(WardenEvent::PolicyGenerated {
                    tool_count: policy.len(),
                    duration: start.elapsed(),
                });
                PolicyGeneration {
                    policy,
                    error: None,
                }
            }
            Err(error) => {
                log::warn!("Security policy generation failed: {}", error);
                self.hooks.emit(WardenEvent::PolicyGenerationFailed {
                    error: error.clone(),
                });
                PolicyGeneration {
                    policy: SecurityPolicy::new(),
                    error: Some(error),
                }
            }
        }
    }
}

impl std::fmt::Debug for PolicyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{Decision, ToolPolicy};
    use crate::test_utils::StubOracle;

    #[tokio::test]
    async fn test_generate_returns_oracle_policy() {
        let policy = SecurityPolicy::new()
            .with_tool("read_file", ToolPolicy::new(Decision::Allow, "", ""));
        let generator = PolicyGenerator::new(Arc::new(StubOracle::new().with_policy(policy.clone())));

        let result = generator
            .generate_policy("read it", &TrustedContext::default(), &CancellationToken::new())
            .await;
        assert!(result.is_ok());
        assert_eq!(result.policy, policy);
    }

    #[tokio::test]
    async fn test_broken_oracle_yields_empty_policy_and_error() {
        let generator = PolicyGenerator::new(Arc::new(StubOracle::failing("backend down")));

        let result = generator
            .generate_policy("read it", &TrustedContext::default(), &CancellationToken::new())
            .await;
        assert!(result.policy.is_empty());
        assert!(result.error.unwrap().contains("backend down"));
    }

    #[tokio::test]
    async fn test_cancelled_generation_is_errored() {
        let generator = PolicyGenerator::new(Arc::new(StubOracle::new().pending()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = generator
            .generate_policy("read it", &TrustedContext::default(), &cancel)
            .await;
        assert!(result.policy.is_empty());
        assert_eq!(result.error.as_deref(), Some("policy generation cancelled"));
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let hooks = EventHooks::new();
        let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let n = names.clone();
        hooks.add(move |e: &WardenEvent| n.lock().push(e.name()));

        let ok = PolicyGenerator::new(Arc::new(StubOracle::new())).with_hooks(hooks.clone());
        ok.generate_policy("p", &TrustedContext::default(), &CancellationToken::new())
            .await;
        let broken = PolicyGenerator::new(Arc::new(StubOracle::failing("x"))).with_hooks(hooks);
        broken
            .generate_policy("p", &TrustedContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(
            *names.lock(),
            vec!["policy_generated", "policy_generation_failed"]
        );
    }
}
