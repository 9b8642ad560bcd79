use serde::{Deserialize, Serialize};

use super::policy::{
    create_default_policy, ChainError, ErrorState, FallbackAction, ModelPolicy, ModelPolicyChain,
};

/// Models to route through, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelChainConfig {
    /// The last model is the last resort
    pub models: Vec<String>,
    /// Switch models without prompting when a non-transient failure occurs
    pub silent_fallback: bool,
}

impl ModelChainConfig {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            silent_fallback: false,
        }
    }

    pub fn with_silent_fallback(mut self, silent: bool) -> Self {
        self.silent_fallback = silent;
        self
    }
}

/// Build a fresh chain for `config`.
///
/// Every entry starts from [`create_default_policy`]. Non-final entries
/// retry a transient failure once, then fall back; a missing model falls
/// back immediately; other failures prompt (or switch silently with
/// `silent_fallback`). The final entry is the last resort: it keeps
/// retrying transient failures until the router's attempt limit and
/// prompts for everything else.
pub fn get_model_policy_chain(config: &ModelChainConfig) -> Result<ModelPolicyChain, ChainError> {
    let count = config.models.len();
    let policies: Vec<ModelPolicy> = config
        .models
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let policy = create_default_policy(model.as_str());
            if i + 1 == count {
                return policy
                    .with_action(ErrorState::Transient, FallbackAction::Retry)
                    .with_transition(ErrorState::Transient, ErrorState::Transient)
                    .last_resort();
            }

            let switch = if config.silent_fallback {
                FallbackAction::Silent
            } else {
                FallbackAction::Prompt
            };
            policy
                .with_action(ErrorState::Transient, FallbackAction::Retry)
                .with_action(ErrorState::NotFound, FallbackAction::Fallback)
                .with_action(ErrorState::Terminal, switch)
                .with_action(ErrorState::Unknown, switch)
        })
        .collect();

    ModelPolicyChain::new(policies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_model_is_last_resort() {
        let chain = get_model_policy_chain(&ModelChainConfig::new(["pro", "flash"])).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.last_resort_index(), 1);
        assert_eq!(chain.get(1).unwrap().model, "flash");
        assert_eq!(
            chain.get(0).unwrap().action_for(ErrorState::Terminal),
            FallbackAction::Prompt
        );
    }

    #[test]
    fn test_silent_fallback() {
        let config = ModelChainConfig::new(["pro", "flash"]).with_silent_fallback(true);
        let chain = get_model_policy_chain(&config).unwrap();
        assert_eq!(
            chain.get(0).unwrap().action_for(ErrorState::Terminal),
            FallbackAction::Silent
        );
        // The last resort has nowhere to go
        assert_eq!(
            chain.get(1).unwrap().action_for(ErrorState::Terminal),
            FallbackAction::Prompt
        );
    }

    #[test]
    fn test_empty_config_is_rejected() {
        assert_eq!(
            get_model_policy_chain(&ModelChainConfig::default()),
            Err(ChainError::Empty)
        );
    }

    #[test]
    fn test_chains_do_not_share_state() {
        let config = ModelChainConfig::new(["pro", "flash"]);
        let first = get_model_policy_chain(&config).unwrap();

        let mut edited = first.clone().into_policies();
        edited[0].actions.insert(ErrorState::Unknown, FallbackAction::Silent);
        edited[0].model = "edited".into();
        let edited = ModelPolicyChain::new(edited).unwrap();

        let second = get_model_policy_chain(&config).unwrap();
        assert_eq!(first, second);
        assert_ne!(edited, second);
        assert_eq!(second.get(0).unwrap().model, "pro");
    }
}
