//! "Proceed always" allowances.
//!
//! When a user answers a confirmation with "always", the answer is recorded
//! as an allowance so later calls in the same session skip the prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How long an approval should be remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Remembered until the process exits.
    #[default]
    Session,

    /// Remembered beyond this session (persisted by whoever handles
    /// `UpdatePolicy` notifications).
    Persistent,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Session => write!(f, "Session"),
            Scope::Persistent => write!(f, "Persistent"),
        }
    }
}

/// A remembered approval for a tool, either for any arguments or for one
/// exact argument set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allowance {
    pub tool: String,

    /// SHA-256 of the canonical JSON arguments, or None for the whole tool.
    pub params_hash: Option<String>,

    #[serde(default)]
    pub scope: Scope,

    pub created_at: DateTime<Utc>,
}

impl Allowance {
    /// Allow every invocation of a tool.
    pub fn tool(name: impl Into<String>) -> Self {
        Self {
            tool: name.into(),
            params_hash: None,
            scope: Scope::default(),
            created_at: Utc::now(),
        }
    }

    /// Allow one exact argument set (see [`hash_params`]).
    pub fn exact(name: impl Into<String>, params_hash: impl Into<String>) -> Self {
        Self {
            tool: name.into(),
            params_hash: Some(params_hash.into()),
            scope: Scope::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn matches(&self, params_hash: &str) -> bool {
        match &self.params_hash {
            None => true,
            Some(h) => h == params_hash,
        }
    }
}

/// Allowances recorded during a session, keyed by tool name.
#[derive(Debug, Default)]
pub struct AllowanceSet {
    allowances: parking_lot::RwLock<HashMap<String, Vec<Allowance>>>,
}

impl AllowanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, allowance: Allowance) {
        self.allowances
            .write()
            .entry(allowance.tool.clone())
            .or_default()
            .push(allowance);
    }

    /// The first allowance covering this tool and argument set.
    pub fn find(&self, tool: &str, args: &serde_json::Value) -> Option<Allowance> {
        let allowances = self.allowances.read();
        let candidates = allowances.get(tool)?;
        let hash = hash_params(args);
        candidates.iter().find(|a| a.matches(&hash)).cloned()
    }

    /// Remove every allowance for a tool; returns how many were removed.
    pub fn revoke(&self, tool: &str) -> usize {
        self.allowances
            .write()
            .remove(tool)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn all(&self) -> Vec<Allowance> {
        self.allowances.read().values().flatten().cloned().collect()
    }

    pub fn clear(&self) {
        self.allowances.write().clear();
    }
}

/// Hash tool arguments for exact-match allowances.
///
/// Keys are sorted recursively before hashing so `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` hash identically.
pub fn hash_params(params: &serde_json::Value) -> String {
    use sha2::{Digest, Sha256};

    let canonical = canonicalize_json(params);
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}

fn canonicalize_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    use std::collections::BTreeMap;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<_, _> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_json(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}
