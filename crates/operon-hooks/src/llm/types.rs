use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role in conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Content within a message - text, image, tool call, or tool result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        mime: String,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    /// Mixed content blocks (assistant can return text + tool calls)
    Mixed {
        parts: Vec<Content>,
    },
}

/// Tool call request from LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Tool execution result sent back to LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    #[serde(default)]
    pub name: String,
    pub output: String,
    pub is_error: bool,
}

/// Conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn system(text: &str) -> Self {
        Self {
            role: Role::System,
            content: Content::Text {
                text: text.to_string(),
            },
        }
    }

    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: Content::Text {
                text: text.to_string(),
            },
        }
    }

    pub fn assistant(content: Content) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_result(tool_use_id: &str, name: &str, output: &str, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: Content::ToolResult(ToolResult {
                tool_use_id: tool_use_id.to_string(),
                name: name.to_string(),
                output: output.to_string(),
                is_error,
            }),
        }
    }
}

/// Tool schema for LLM function calling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for tool parameters
    pub input_schema: Value,
}

/// Why LLM stopped generating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Token usage info
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// LLM generation response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    pub content: Content,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub model: String,
}

/// Config for LLM generation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerateConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Vec<String>,
    pub system_prompt: Option<String>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
            system_prompt: None,
        }
    }
}

/// How the model may pick tools for the next call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Model decides freely
    #[default]
    Auto,
    /// Model must call one of the allowed tools
    Any,
    /// Tool calling disabled
    None,
}

/// Tool selection constraints attached to a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolChoice {
    pub mode: ToolMode,
    /// Empty = every declared tool
    #[serde(default)]
    pub allowed: Vec<String>,
}

/// A fully materialized model call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub config: GenerateConfig,
    pub tool_choice: Option<ToolChoice>,
}

impl Content {
    /// Text of this content, or None when it carries no text block at all
    pub fn text(&self) -> Option<String> {
        match self {
            Content::Text { text } => Some(text.clone()),
            Content::Mixed { parts } => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| match p {
                        Content::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join(""))
                }
            }
            _ => None,
        }
    }

    /// Extract text from content
    pub fn extract_text(&self) -> String {
        self.text().unwrap_or_default()
    }
}
