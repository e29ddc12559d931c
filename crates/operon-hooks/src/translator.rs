//! Stable, text-only schema that hooks see for model requests and responses.
//!
//! The internal `llm` types carry images, tool calls and tool results. Hooks
//! only ever see text: everything else is dropped on the way out and restored
//! from the original on the way back, unless the hook rewrote the field that
//! held it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{
    Content, GenerateResponse, Message, ModelRequest, Role, StopReason, ToolChoice, ToolMode,
    Usage,
};

/// Model request as written to a hook's stdin (`llm_request`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<LlmMessage>,
    #[serde(default)]
    pub config: LlmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<LlmToolConfig>,
}

/// One text-only message; role is `user`, `model` or `system`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Ordered by restrictiveness: NONE > ANY > AUTO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LlmToolMode {
    #[default]
    Auto,
    Any,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmToolConfig {
    #[serde(default)]
    pub mode: LlmToolMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Model response as written to a hook's stdin (`llm_response`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub candidates: Vec<LlmCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<LlmUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCandidate {
    #[serde(default)]
    pub content: LlmCandidateContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCandidateContent {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<String>,
}

impl Default for LlmCandidateContent {
    fn default() -> Self {
        Self {
            role: "model".to_string(),
            parts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmUsage {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
}

// ============================================================================
// Requests
// ============================================================================

/// Translate an internal request into the hook schema (text only)
pub fn to_external(request: &ModelRequest) -> LlmRequest {
    let config = &request.config;
    LlmRequest {
        model: config.model.clone(),
        messages: request
            .messages
            .iter()
            .filter_map(message_to_external)
            .collect(),
        config: LlmConfig {
            temperature: Some(config.temperature),
            max_output_tokens: Some(config.max_tokens),
            top_p: config.top_p,
            top_k: config.top_k,
            stop_sequences: if config.stop_sequences.is_empty() {
                None
            } else {
                Some(config.stop_sequences.clone())
            },
        },
        tool_config: request.tool_choice.as_ref().map(tool_choice_to_external),
    }
}

/// Merge a hook-edited request back onto a copy of `original`.
/// Only fields whose value differs from the translated original are taken.
pub fn from_external(modified: &LlmRequest, original: &ModelRequest) -> ModelRequest {
    let baseline = to_external(original);
    let mut out = original.clone();

    if modified.model != baseline.model && !modified.model.is_empty() {
        out.config.model = modified.model.clone();
    }

    if modified.messages != baseline.messages {
        out.messages = modified
            .messages
            .iter()
            .map(message_from_external)
            .collect();
    }

    let (m, b) = (&modified.config, &baseline.config);
    if m.temperature != b.temperature {
        if let Some(temperature) = m.temperature {
            out.config.temperature = temperature;
        }
    }
    if m.max_output_tokens != b.max_output_tokens {
        if let Some(max_tokens) = m.max_output_tokens {
            out.config.max_tokens = max_tokens;
        }
    }
    if m.top_p != b.top_p && m.top_p.is_some() {
        out.config.top_p = m.top_p;
    }
    if m.top_k != b.top_k && m.top_k.is_some() {
        out.config.top_k = m.top_k;
    }
    if m.stop_sequences != b.stop_sequences {
        if let Some(stop_sequences) = &m.stop_sequences {
            out.config.stop_sequences = stop_sequences.clone();
        }
    }

    if modified.tool_config != baseline.tool_config {
        out.tool_choice = modified.tool_config.as_ref().map(tool_choice_from_external);
    }

    out
}

/// Apply a partial `llm_request` object from a hook on top of `original`
pub fn apply_request_patch(original: &ModelRequest, patch: &Value) -> ModelRequest {
    let mut merged = match serde_json::to_value(to_external(original)) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Failed to serialize request for patching");
            return original.clone();
        }
    };
    shallow_merge(&mut merged, patch);

    match serde_json::from_value::<LlmRequest>(merged) {
        Ok(modified) => from_external(&modified, original),
        Err(e) => {
            debug!(error = %e, "Ignoring malformed llm_request modification");
            original.clone()
        }
    }
}

fn message_to_external(message: &Message) -> Option<LlmMessage> {
    let content = message.content.text()?;
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "model",
    };
    Some(LlmMessage {
        role: role.to_string(),
        content,
    })
}

fn message_from_external(message: &LlmMessage) -> Message {
    let role = match message.role.as_str() {
        "model" | "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::User,
    };
    Message {
        role,
        content: Content::Text {
            text: message.content.clone(),
        },
    }
}

pub fn tool_choice_to_external(choice: &ToolChoice) -> LlmToolConfig {
    LlmToolConfig {
        mode: match choice.mode {
            ToolMode::Auto => LlmToolMode::Auto,
            ToolMode::Any => LlmToolMode::Any,
            ToolMode::None => LlmToolMode::None,
        },
        allowed_function_names: if choice.allowed.is_empty() {
            None
        } else {
            Some(choice.allowed.clone())
        },
    }
}

pub fn tool_choice_from_external(config: &LlmToolConfig) -> ToolChoice {
    ToolChoice {
        mode: match config.mode {
            LlmToolMode::Auto => ToolMode::Auto,
            LlmToolMode::Any => ToolMode::Any,
            LlmToolMode::None => ToolMode::None,
        },
        allowed: config.allowed_function_names.clone().unwrap_or_default(),
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Translate an internal response into the hook schema (text only)
pub fn to_external_response(response: &GenerateResponse) -> LlmResponse {
    let text = response.content.text();
    LlmResponse {
        text: text.clone(),
        candidates: vec![LlmCandidate {
            content: LlmCandidateContent {
                role: "model".to_string(),
                parts: text.into_iter().collect(),
            },
            finish_reason: Some(finish_reason_to_external(&response.stop_reason).to_string()),
            index: 0,
        }],
        usage_metadata: Some(LlmUsage {
            prompt_token_count: response.usage.input_tokens,
            candidates_token_count: response.usage.output_tokens,
            total_token_count: response.usage.total(),
        }),
    }
}

/// Merge a hook-edited response back onto a copy of `original`
pub fn from_external_response(modified: &LlmResponse, original: &GenerateResponse) -> GenerateResponse {
    let baseline = to_external_response(original);
    let mut out = original.clone();

    let first = modified.candidates.first();
    let new_text = if modified.candidates != baseline.candidates {
        first.map(|c| c.content.parts.join(""))
    } else if modified.text != baseline.text {
        modified.text.clone()
    } else {
        None
    };
    if let Some(text) = new_text {
        if Some(&text) != original.content.text().as_ref() {
            out.content = Content::Text { text };
        }
    }

    if let Some(reason) = first
        .and_then(|c| c.finish_reason.as_deref())
        .and_then(finish_reason_from_external)
    {
        out.stop_reason = reason;
    }

    if modified.usage_metadata != baseline.usage_metadata {
        if let Some(usage) = &modified.usage_metadata {
            out.usage = Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            };
        }
    }

    out
}

/// Build a complete response from a hook-supplied `llm_response` object.
/// Returns None when the value is not a response document.
pub fn response_from_patch(patch: &Value, request: &ModelRequest) -> Option<GenerateResponse> {
    let modified: LlmResponse = match serde_json::from_value(patch.clone()) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed llm_response");
            return None;
        }
    };
    let blank = GenerateResponse {
        content: Content::Text {
            text: String::new(),
        },
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
        model: request.config.model.clone(),
    };
    Some(from_external_response(&modified, &blank))
}

/// Apply a partial `llm_response` object from a hook on top of `original`
pub fn apply_response_patch(original: &GenerateResponse, patch: &Value) -> GenerateResponse {
    let mut merged = match serde_json::to_value(to_external_response(original)) {
        Ok(value) => value,
        Err(_) => return original.clone(),
    };
    shallow_merge(&mut merged, patch);
    match serde_json::from_value::<LlmResponse>(merged) {
        Ok(modified) => from_external_response(&modified, original),
        Err(e) => {
            debug!(error = %e, "Ignoring malformed llm_response modification");
            original.clone()
        }
    }
}

fn finish_reason_to_external(reason: &StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "STOP",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::ToolUse => "TOOL_USE",
    }
}

fn finish_reason_from_external(reason: &str) -> Option<StopReason> {
    match reason {
        "STOP" => Some(StopReason::EndTurn),
        "MAX_TOKENS" => Some(StopReason::MaxTokens),
        "TOOL_USE" => Some(StopReason::ToolUse),
        _ => None,
    }
}

/// Copy every top-level key of `patch` into `target`. Nested values are replaced, not merged.
pub fn shallow_merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        (None, Some(_)) => *target = patch.clone(),
        _ => {}
    }
}
