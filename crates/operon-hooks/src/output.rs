//! Hook stdout documents and the per-category rules for reading a decision out of them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::HookError;
use crate::events::{EventCategory, HookEventName};

pub const ADDITIONAL_CONTEXT: &str = "additionalContext";
pub const PERMISSION_DECISION: &str = "permissionDecision";
pub const PERMISSION_DECISION_REASON: &str = "permissionDecisionReason";
pub const LLM_REQUEST: &str = "llm_request";
pub const LLM_RESPONSE: &str = "llm_response";
pub const TOOL_CONFIG: &str = "toolConfig";

/// Reason used when a hook exits 2 without writing to stderr
pub const DEFAULT_BLOCK_REASON: &str = "Blocked by hook (exit code 2)";

/// Policy verdict rendered by a hook. Absent = no opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[serde(alias = "approve")]
    Allow,
    Block,
    Deny,
    Ask,
}

impl Decision {
    /// Lenient parse; unknown values mean "no opinion"
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "approve" => Some(Decision::Allow),
            "block" => Some(Decision::Block),
            "deny" => Some(Decision::Deny),
            "ask" => Some(Decision::Ask),
            _ => None,
        }
    }

    pub fn is_blocking(self) -> bool {
        matches!(self, Decision::Block | Decision::Deny)
    }
}

fn lenient_decision<'de, D>(deserializer: D) -> Result<Option<Decision>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(Decision::parse))
}

/// Structured document a hook prints on stdout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(
        default,
        deserialize_with = "lenient_decision",
        skip_serializing_if = "Option::is_none"
    )]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// `continue: false` asks the agent to stop
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continue_execution: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Map<String, Value>>,
}

impl HookOutput {
    /// Plain-text stdout from a hook that exited 0
    pub fn plain_text(text: &str) -> Self {
        Self {
            decision: Some(Decision::Allow),
            system_message: Some(text.to_string()),
            ..Default::default()
        }
    }

    /// Exit code 2: stderr is the blocking reason
    pub fn blocked(stderr: &str) -> Self {
        let reason = stderr.trim();
        Self {
            decision: Some(Decision::Block),
            reason: Some(if reason.is_empty() {
                DEFAULT_BLOCK_REASON.to_string()
            } else {
                reason.to_string()
            }),
            ..Default::default()
        }
    }

    /// Any other failing exit: stderr surfaces as a warning, the operation proceeds
    pub fn warning(stderr: &str) -> Self {
        Self {
            decision: Some(Decision::Allow),
            system_message: Some(format!("Warning: {}", stderr.trim())),
            ..Default::default()
        }
    }

    /// Only the `systemMessage`, for outputs that carry no policy
    pub fn message_only(&self) -> Self {
        Self {
            system_message: self.system_message.clone(),
            ..Default::default()
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.decision.map(Decision::is_blocking).unwrap_or(false)
    }

    pub fn should_stop(&self) -> bool {
        self.continue_execution == Some(false)
    }

    /// Reason to show when blocking or stopping
    pub fn effective_reason(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.stop_reason.clone())
            .unwrap_or_else(|| "No reason provided".to_string())
    }

    pub fn specific(&self, key: &str) -> Option<&Value> {
        self.hook_specific_output.as_ref()?.get(key)
    }

    pub fn additional_context(&self) -> Option<&str> {
        self.specific(ADDITIONAL_CONTEXT)?.as_str()
    }

    /// Decision as the given event family reads it
    pub fn decision_for(&self, event: HookEventName) -> Option<Decision> {
        match event.category() {
            EventCategory::Tool => self.tool_decision().or(self.decision),
            EventCategory::Lifecycle | EventCategory::Model | EventCategory::ToolSelection => {
                self.decision
            }
        }
    }

    /// Reason as the given event family reads it
    pub fn reason_for(&self, event: HookEventName) -> Option<String> {
        match event.category() {
            EventCategory::Tool if self.tool_decision().is_some() => self
                .specific(PERMISSION_DECISION_REASON)
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| self.reason.clone()),
            _ => self.reason.clone(),
        }
    }

    /// `hookSpecificOutput.permissionDecision`, preferred over `decision` for tool events
    fn tool_decision(&self) -> Option<Decision> {
        self.specific(PERMISSION_DECISION)
            .and_then(Value::as_str)
            .and_then(Decision::parse)
    }
}

/// Parse the stdout of a hook that exited 0.
/// JSON object first (one level of double encoding tolerated), plain text otherwise.
pub fn parse_stdout(stdout: &str) -> Option<HookOutput> {
    decode_stdout(stdout).0
}

/// Like [`parse_stdout`], also reporting stdout that looked like a hook output
/// document but could not be read as one. The output still falls back to plain text.
pub fn decode_stdout(stdout: &str) -> (Option<HookOutput>, Option<HookError>) {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(inner.trim()) {
            Ok(nested @ Value::Object(_)) => nested,
            _ => return (Some(HookOutput::plain_text(&inner)), None),
        },
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return (Some(HookOutput::plain_text(trimmed)), None),
        Err(e) => {
            debug!(error = %e, "Hook stdout is not JSON, treating as plain text");
            let error = trimmed
                .starts_with('{')
                .then(|| HookError::Protocol(format!("invalid JSON: {}", e)));
            return (Some(HookOutput::plain_text(trimmed)), error);
        }
    };

    match serde_json::from_value::<HookOutput>(value) {
        Ok(output) => (Some(output), None),
        Err(e) => {
            debug!(error = %e, "Hook stdout is not a hook output document");
            (
                Some(HookOutput::plain_text(trimmed)),
                Some(HookError::Protocol(e.to_string())),
            )
        }
    }
}
