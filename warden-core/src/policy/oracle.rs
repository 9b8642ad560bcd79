//! Policy oracle: the decision function behind generation and enforcement.
//!
//! [`PolicyOracle`] is the narrow seam the generator and enforcer call.
//! [`LlmPolicyOracle`] answers it with one structured-output model call per
//! operation; tests substitute a stub.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Decision, SecurityPolicy, ToolPolicy};
use crate::provider::{ContentGenerator, ContentRequest, ProviderError};
use crate::types::{ToolCall, ToolDefinition};

/// Errors from a policy oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No content generator is configured for policy calls
    #[error("No content generator configured for policy checks")]
    NotConfigured,

    /// The model returned no text
    #[error("Policy model returned an empty response")]
    EmptyResponse,

    /// The model output was not valid JSON for the expected schema
    #[error("Failed to parse policy model response: {0}")]
    Parse(String),

    /// The content generator failed
    #[error("Policy model request failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Verdict returned by an oracle for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OracleVerdict {
    /// Whether the call should be allowed, denied or confirmed by the user
    pub decision: Decision,
    /// Short explanation referencing the policy
    pub reason: String,
}

/// Decision function for security policies.
#[async_trait]
pub trait PolicyOracle: Send + Sync {
    /// Produce a per-tool policy for a user prompt.
    async fn generate(
        &self,
        prompt: &str,
        trusted: &TrustedContext,
    ) -> Result<SecurityPolicy, OracleError>;

    /// Judge a tool call against that tool's policy (`None` when the tool has
    /// no explicit policy).
    async fn enforce(
        &self,
        policy: Option<&ToolPolicy>,
        call: &ToolCall,
    ) -> Result<OracleVerdict, OracleError>;
}

/// Trusted description of the tools available this turn.
///
/// Only content produced by the host (never by the model or tool output)
/// belongs here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedContext {
    text: String,
}

impl TrustedContext {
    /// Use pre-rendered trusted content verbatim.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Render tool names, descriptions and input schemas.
    pub fn from_tools(tools: &[ToolDefinition]) -> Self {
        let text = tools
            .iter()
            .map(|t| {
                format!(
                    "Tool: {}\nDescription: {}\nParameters: {}",
                    t.name, t.description, t.input_schema
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

const POLICY_GENERATION_TEMPLATE: &str = r#"You are a security policy generator for an AI coding agent.
Given the user's request and the list of available tools, decide for EACH tool whether it may be used while completing this request.

Rules:
- "allow": the tool is required to complete the stated task.
- "deny": the tool is clearly out of scope for the task.
- "ask_user": the action is destructive, irreversible, or its necessity is ambiguous.
- Constraints must be concrete: name the specific paths, argument values or patterns that are permitted. Never write vague constraints such as "use carefully".
- Give a one-sentence rationale for every tool.

Return JSON matching the response schema: {"policies": [{"tool_name": ..., "policy": {"permission": ..., "constraints": ..., "rationale": ...}}]}

<user_request>
{{user_prompt}}
</user_request>

<available_tools>
{{trusted_content}}
</available_tools>
"#;

const POLICY_ENFORCEMENT_TEMPLATE: &str = r#"You are a security policy enforcer for an AI coding agent.
Decide whether the tool call below complies with the security policy for that tool.

Rules:
- "allow": the call satisfies the policy's permission and every constraint.
- "deny": the call violates the policy or its constraints.
- "ask_user": compliance cannot be determined, or the policy asks for confirmation.
- An empty policy means no explicit policy exists for this tool; judge the call on its own risk.

Return JSON matching the response schema: {"decision": ..., "reason": ...}

<security_policy>
{{policy}}
</security_policy>

<tool_call>
{{tool_call}}
</tool_call>
"#;

#[derive(Debug, Deserialize, JsonSchema)]
struct GenerationResponse {
    policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PolicyEntry {
    tool_name: String,
    policy: ToolPolicy,
}

/// Render the policy generation instruction.
pub fn render_generation_prompt(prompt: &str, trusted: &TrustedContext) -> String {
    fill_template(
        POLICY_GENERATION_TEMPLATE,
        &[("user_prompt", prompt), ("trusted_content", trusted.as_str())],
    )
}

/// Render the enforcement instruction for one call.
pub fn render_enforcement_prompt(policy: Option<&ToolPolicy>, call: &ToolCall) -> String {
    let policy_json = match policy {
        Some(p) => serde_json::to_string_pretty(p).unwrap_or_else(|_| "{}".to_string()),
        None => "{}".to_string(),
    };
    let call_json = serde_json::to_string_pretty(&serde_json::json!({
        "name": call.name,
        "args": call.args,
    }))
    .unwrap_or_else(|_| "{}".to_string());

    fill_template(
        POLICY_ENFORCEMENT_TEMPLATE,
        &[("policy", policy_json.as_str()), ("tool_call", call_json.as_str())],
    )
}

/// Substitute `{{name}}` placeholders in a single pass over the template.
///
/// Values are copied verbatim and never rescanned, so placeholder syntax
/// inside a prompt or tool argument stays literal.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip an optional markdown code fence around a JSON payload.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    serde_json::from_str(extract_json(text)).map_err(|e| OracleError::Parse(e.to_string()))
}

/// [`PolicyOracle`] backed by structured-output model calls.
pub struct LlmPolicyOracle {
    generator: Option<Arc<dyn ContentGenerator>>,
    model: String,
}

impl LlmPolicyOracle {
    /// Oracle that issues policy calls to `model` through `generator`.
    pub fn new(generator: Arc<dyn ContentGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator: Some(generator),
            model: model.into(),
        }
    }

    /// Oracle with no content generator; every call fails with
    /// [`OracleError::NotConfigured`].
    pub fn unconfigured(model: impl Into<String>) -> Self {
        Self {
            generator: None,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call<T>(&self, prompt: String) -> Result<T, OracleError>
    where
        T: serde::de::DeserializeOwned + JsonSchema,
    {
        let generator = self.generator.as_ref().ok_or(OracleError::NotConfigured)?;
        let schema = schemars::schema_for!(T).to_value();
        let request = ContentRequest::new(&self.model, prompt)
            .with_response_schema(schema)
            .with_temperature(0.0);

        let response = generator.generate_content(request).await?;
        parse_response(&response.text())
    }
}

impl std::fmt::Debug for LlmPolicyOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmPolicyOracle")
            .field("model", &self.model)
            .field("configured", &self.generator.is_some())
            .finish()
    }
}

#[async_trait]
impl PolicyOracle for LlmPolicyOracle {
    async fn generate(
        &self,
        prompt: &str,
        trusted: &TrustedContext,
    ) -> Result<SecurityPolicy, OracleError> {
        let response: GenerationResponse =
            self.call(render_generation_prompt(prompt, trusted)).await?;
        Ok(SecurityPolicy::from_entries(
            response
                .policies
                .into_iter()
                .map(|entry| (entry.tool_name, entry.policy)),
        ))
    }

    async fn enforce(
        &self,
        policy: Option<&ToolPolicy>,
        call: &ToolCall,
    ) -> Result<OracleVerdict, OracleError> {
        self.call(render_enforcement_prompt(policy, call)).await
    }
}
