//! Policy and verdict types.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outcome of evaluating a tool call (or a tool's blanket permission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The call may proceed.
    Allow,
    /// The call must not proceed.
    Deny,
    /// A human (or headless handler) must confirm the call.
    AskUser,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
            Decision::AskUser => write!(f, "ask_user"),
        }
    }
}

/// Generated policy for a single tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolPolicy {
    /// Blanket permission for the tool in this turn.
    pub permission: Decision,
    /// Concrete constraints on arguments (paths, patterns).
    #[serde(default)]
    pub constraints: String,
    /// Why this permission was chosen.
    #[serde(default)]
    pub rationale: String,
}

impl ToolPolicy {
    pub fn new(
        permission: Decision,
        constraints: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            permission,
            constraints: constraints.into(),
            rationale: rationale.into(),
        }
    }
}

/// Per-turn mapping from tool name to [`ToolPolicy`].
///
/// Tools absent from the map have no explicit policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityPolicy {
    tools: BTreeMap<String, ToolPolicy>,
}

impl SecurityPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `(tool_name, policy)` entries into a policy; later duplicates win.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ToolPolicy)>,
        S: Into<String>,
    {
        Self {
            tools: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Set the policy for a tool.
    pub fn insert(&mut self, tool_name: impl Into<String>, policy: ToolPolicy) {
        self.tools.insert(tool_name.into(), policy);
    }

    /// Builder-style [`SecurityPolicy::insert`].
    pub fn with_tool(mut self, tool_name: impl Into<String>, policy: ToolPolicy) -> Self {
        self.insert(tool_name, policy);
        self
    }

    /// Policy for a tool, if one was generated.
    pub fn get(&self, tool_name: &str) -> Option<&ToolPolicy> {
        self.tools.get(tool_name)
    }

    /// Iterate over `(tool_name, policy)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolPolicy)> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The enforcer's verdict for one (policy, tool call) pair.
///
/// Never persisted; consumed immediately by whatever gates execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub decision: Decision,
    pub reason: String,
    /// Set when the decision is a fail-soft default rather than a real verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SafetyCheckResult {
    pub fn new(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            error: None,
        }
    }

    /// A fail-soft result carrying a diagnostic.
    pub fn failed(decision: Decision, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            decision,
            reason: format!("Safety check unavailable: {}", error),
            error: Some(error),
        }
    }

    /// Enforcement abandoned because the caller cancelled; always `Deny`.
    pub fn cancelled() -> Self {
        Self {
            decision: Decision::Deny,
            reason: "cancelled".to_string(),
            error: Some("cancelled".to_string()),
        }
    }

    pub fn is_fail_soft(&self) -> bool {
        self.error.is_some()
    }
}

/// Decision applied when policy generation or enforcement fails.
///
/// `Allow` keeps tools usable while the policy model is unavailable;
/// `Deny` blocks every call whose verdict could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureDefault {
    #[default]
    Allow,
    Deny,
}

impl FailureDefault {
    pub fn decision(self) -> Decision {
        match self {
            FailureDefault::Allow => Decision::Allow,
            FailureDefault::Deny => Decision::Deny,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_wire_format() {
        assert_eq!(
            serde_json::to_string(&Decision::AskUser).unwrap(),
            "\"ask_user\""
        );
        let d: Decision = serde_json::from_str("\"deny\"").unwrap();
        assert_eq!(d, Decision::Deny);
        assert_eq!(Decision::AskUser.to_string(), "ask_user");
    }

    #[test]
    fn test_from_entries_last_duplicate_wins() {
        let policy = SecurityPolicy::from_entries([
            ("shell", ToolPolicy::new(Decision::Allow, "", "")),
            ("shell", ToolPolicy::new(Decision::Deny, "", "second")),
        ]);
        assert_eq!(policy.len(), 1);
        assert_eq!(policy.get("shell").unwrap().permission, Decision::Deny);
    }

    #[test]
    fn test_security_policy_serializes_as_map() {
        let policy = SecurityPolicy::new().with_tool(
            "read_file",
            ToolPolicy::new(Decision::Allow, "path == package.json", "needed"),
        );
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["read_file"]["permission"], "allow");
    }

    #[test]
    fn test_tool_policy_missing_fields_default() {
        let p: ToolPolicy = serde_json::from_str(r#"{"permission":"ask_user"}"#).unwrap();
        assert_eq!(p.permission, Decision::AskUser);
        assert!(p.constraints.is_empty());
    }

    #[test]
    fn test_failed_result_carries_error() {
        let r = SafetyCheckResult::failed(Decision::Allow, "no generator");
        assert!(r.is_fail_soft());
        assert!(r.reason.contains("no generator"));
        assert_eq!(FailureDefault::default().decision(), Decision::Allow);
        assert_eq!(FailureDefault::Deny.decision(), Decision::Deny);
    }
}
