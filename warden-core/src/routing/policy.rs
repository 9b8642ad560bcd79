//! Model policies and validated chains.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Classified failure of a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorState {
    /// Retriable network, throttling or overload signal
    Transient,
    /// Explicit non-retriable failure
    Terminal,
    /// Model or resource absent
    NotFound,
    /// Could not be classified
    Unknown,
}

impl ErrorState {
    pub const ALL: [ErrorState; 4] = [
        ErrorState::Transient,
        ErrorState::Terminal,
        ErrorState::NotFound,
        ErrorState::Unknown,
    ];
}

impl std::fmt::Display for ErrorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorState::Transient => write!(f, "transient"),
            ErrorState::Terminal => write!(f, "terminal"),
            ErrorState::NotFound => write!(f, "not_found"),
            ErrorState::Unknown => write!(f, "unknown"),
        }
    }
}

/// What to do after a failure in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Re-issue the request to the same model
    Retry,
    /// Switch to the next model in the chain
    Fallback,
    /// Ask the user whether to switch
    Prompt,
    /// Switch without surfacing anything
    Silent,
}

impl std::fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackAction::Retry => write!(f, "retry"),
            FallbackAction::Fallback => write!(f, "fallback"),
            FallbackAction::Prompt => write!(f, "prompt"),
            FallbackAction::Silent => write!(f, "silent"),
        }
    }
}

/// Failure handling for one model in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPolicy {
    pub model: String,
    #[serde(default)]
    pub actions: HashMap<ErrorState, FallbackAction>,
    #[serde(default)]
    pub state_transitions: HashMap<ErrorState, ErrorState>,
    #[serde(default)]
    pub is_last_resort: bool,
}

impl ModelPolicy {
    /// Action for `state`; unspecified states prompt.
    pub fn action_for(&self, state: ErrorState) -> FallbackAction {
        self.actions
            .get(&state)
            .copied()
            .unwrap_or(FallbackAction::Prompt)
    }

    /// State the next attempt starts from; unspecified states become terminal.
    pub fn transition_for(&self, state: ErrorState) -> ErrorState {
        self.state_transitions
            .get(&state)
            .copied()
            .unwrap_or(ErrorState::Terminal)
    }

    pub fn with_action(mut self, state: ErrorState, action: FallbackAction) -> Self {
        self.actions.insert(state, action);
        self
    }

    pub fn with_transition(mut self, state: ErrorState, next: ErrorState) -> Self {
        self.state_transitions.insert(state, next);
        self
    }

    pub fn last_resort(mut self) -> Self {
        self.is_last_resort = true;
        self
    }
}

/// Policy where every state prompts and transitions to terminal.
pub fn create_default_policy(model: impl Into<String>) -> ModelPolicy {
    let mut policy = ModelPolicy {
        model: model.into(),
        actions: HashMap::new(),
        state_transitions: HashMap::new(),
        is_last_resort: false,
    };
    for state in ErrorState::ALL {
        policy.actions.insert(state, FallbackAction::Prompt);
        policy.state_transitions.insert(state, ErrorState::Terminal);
    }
    policy
}

/// Errors from chain validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Model policy chain is empty")]
    Empty,

    #[error("Model policy chain has no last-resort entry (models: {})", .models.join(", "))]
    NoLastResort { models: Vec<String> },

    #[error("Model policy chain has {} last-resort entries ({}); exactly one is required", .models.len(), .models.join(", "))]
    MultipleLastResort { models: Vec<String> },
}

/// Check that exactly one entry is the last resort.
pub fn validate_model_policy_chain(policies: &[ModelPolicy]) -> Result<(), ChainError> {
    if policies.is_empty() {
        return Err(ChainError::Empty);
    }
    let last_resort: Vec<String> = policies
        .iter()
        .filter(|p| p.is_last_resort)
        .map(|p| p.model.clone())
        .collect();

    match last_resort.len() {
        1 => Ok(()),
        0 => Err(ChainError::NoLastResort {
            models: policies.iter().map(|p| p.model.clone()).collect(),
        }),
        _ => Err(ChainError::MultipleLastResort {
            models: last_resort,
        }),
    }
}

/// Ordered, validated sequence of [`ModelPolicy`].
///
/// Immutable once built: every call to
/// [`get_model_policy_chain`](super::get_model_policy_chain) returns a fresh
/// value, and edits go through [`ModelPolicyChain::into_policies`] plus a new
/// [`ModelPolicyChain::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPolicyChain {
    policies: Vec<ModelPolicy>,
    last_resort: usize,
}

impl ModelPolicyChain {
    pub fn new(policies: Vec<ModelPolicy>) -> Result<Self, ChainError> {
        validate_model_policy_chain(&policies)?;
        let last_resort = policies
            .iter()
            .position(|p| p.is_last_resort)
            .ok_or(ChainError::NoLastResort { models: Vec::new() })?;
        Ok(Self {
            policies,
            last_resort,
        })
    }

    pub fn get(&self, index: usize) -> Option<&ModelPolicy> {
        self.policies.get(index)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Never true for a validated chain.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policies(&self) -> &[ModelPolicy] {
        &self.policies
    }

    pub fn into_policies(self) -> Vec<ModelPolicy> {
        self.policies
    }

    pub fn last_resort_index(&self) -> usize {
        self.last_resort
    }

    pub fn position(&self, model: &str) -> Option<usize> {
        self.policies.iter().position(|p| p.model == model)
    }

    /// Entry used when `index` falls back.
    ///
    /// The next non-last-resort entry, else the last resort itself. The last
    /// resort never falls back.
    pub fn fallback_target(&self, index: usize) -> Option<usize> {
        if index == self.last_resort || index >= self.policies.len() {
            return None;
        }
        (index + 1..self.policies.len())
            .find(|&i| i != self.last_resort)
            .or(Some(self.last_resort))
    }
}
