use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HookError;
use crate::llm::{GenerateResponse, ModelRequest};
use crate::translator::{self, LlmRequest, LlmResponse};

/// Hook lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HookEventName {
    /// Before a tool call executes
    BeforeTool,
    /// After a tool call returned
    AfterTool,
    /// Before the agent handles a user prompt
    BeforeAgent,
    /// After the agent produced its final answer for a prompt
    AfterAgent,
    /// Before a model request is sent
    BeforeModel,
    /// After a model response is fully received
    AfterModel,
    /// Before the model is told which tools it may call
    BeforeToolSelection,
    SessionStart,
    SessionEnd,
    /// Before conversation history is compressed
    PreCompress,
    Notification,
}

/// Closed set of event families; each has its own decision extraction and merge strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Tool,
    Lifecycle,
    Model,
    ToolSelection,
}

impl HookEventName {
    pub const ALL: [HookEventName; 11] = [
        HookEventName::BeforeTool,
        HookEventName::AfterTool,
        HookEventName::BeforeAgent,
        HookEventName::AfterAgent,
        HookEventName::BeforeModel,
        HookEventName::AfterModel,
        HookEventName::BeforeToolSelection,
        HookEventName::SessionStart,
        HookEventName::SessionEnd,
        HookEventName::PreCompress,
        HookEventName::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEventName::BeforeTool => "BeforeTool",
            HookEventName::AfterTool => "AfterTool",
            HookEventName::BeforeAgent => "BeforeAgent",
            HookEventName::AfterAgent => "AfterAgent",
            HookEventName::BeforeModel => "BeforeModel",
            HookEventName::AfterModel => "AfterModel",
            HookEventName::BeforeToolSelection => "BeforeToolSelection",
            HookEventName::SessionStart => "SessionStart",
            HookEventName::SessionEnd => "SessionEnd",
            HookEventName::PreCompress => "PreCompress",
            HookEventName::Notification => "Notification",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            HookEventName::BeforeTool | HookEventName::AfterTool => EventCategory::Tool,
            HookEventName::BeforeModel | HookEventName::AfterModel => EventCategory::Model,
            HookEventName::BeforeToolSelection => EventCategory::ToolSelection,
            HookEventName::BeforeAgent
            | HookEventName::AfterAgent
            | HookEventName::SessionStart
            | HookEventName::SessionEnd
            | HookEventName::PreCompress
            | HookEventName::Notification => EventCategory::Lifecycle,
        }
    }
}

impl fmt::Display for HookEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEventName {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEventName::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| HookError::Config(format!("unknown hook event '{}'", s)))
    }
}

/// Why a session started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStartSource {
    Startup,
    Resume,
    Clear,
    Compress,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    Exit,
    Clear,
    Logout,
    PromptInputExit,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreCompressTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    ToolPermission,
}

/// Serialized wire name of a unit enum, used as matcher subject
fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

// ============================================================================
// HookPayload (caller side)
// ============================================================================

/// What the caller hands to `fire`: event fields in the internal representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookPayload {
    BeforeTool {
        tool_name: String,
        #[serde(default)]
        tool_input: Value,
    },
    AfterTool {
        tool_name: String,
        #[serde(default)]
        tool_input: Value,
        #[serde(default)]
        tool_response: Value,
    },
    BeforeAgent {
        prompt: String,
    },
    AfterAgent {
        prompt: String,
        prompt_response: String,
        #[serde(default)]
        stop_hook_active: bool,
    },
    BeforeModel {
        request: ModelRequest,
    },
    AfterModel {
        request: ModelRequest,
        response: GenerateResponse,
    },
    BeforeToolSelection {
        request: ModelRequest,
    },
    SessionStart {
        source: SessionStartSource,
    },
    SessionEnd {
        reason: SessionEndReason,
    },
    PreCompress {
        trigger: PreCompressTrigger,
    },
    Notification {
        notification_type: NotificationType,
        message: String,
        #[serde(default)]
        details: Value,
    },
}

impl HookPayload {
    pub fn event(&self) -> HookEventName {
        match self {
            HookPayload::BeforeTool { .. } => HookEventName::BeforeTool,
            HookPayload::AfterTool { .. } => HookEventName::AfterTool,
            HookPayload::BeforeAgent { .. } => HookEventName::BeforeAgent,
            HookPayload::AfterAgent { .. } => HookEventName::AfterAgent,
            HookPayload::BeforeModel { .. } => HookEventName::BeforeModel,
            HookPayload::AfterModel { .. } => HookEventName::AfterModel,
            HookPayload::BeforeToolSelection { .. } => HookEventName::BeforeToolSelection,
            HookPayload::SessionStart { .. } => HookEventName::SessionStart,
            HookPayload::SessionEnd { .. } => HookEventName::SessionEnd,
            HookPayload::PreCompress { .. } => HookEventName::PreCompress,
            HookPayload::Notification { .. } => HookEventName::Notification,
        }
    }

    /// Subject that group matchers are tested against (None = every group applies)
    pub fn match_subject(&self) -> Option<String> {
        match self {
            HookPayload::BeforeTool { tool_name, .. } | HookPayload::AfterTool { tool_name, .. } => {
                Some(tool_name.clone())
            }
            HookPayload::SessionStart { source } => Some(wire_name(source)),
            HookPayload::SessionEnd { reason } => Some(wire_name(reason)),
            HookPayload::PreCompress { trigger } => Some(wire_name(trigger)),
            HookPayload::Notification {
                notification_type, ..
            } => Some(wire_name(notification_type)),
            _ => None,
        }
    }

    /// Model request carried by the payload, if any
    pub fn model_request(&self) -> Option<&ModelRequest> {
        match self {
            HookPayload::BeforeModel { request }
            | HookPayload::AfterModel { request, .. }
            | HookPayload::BeforeToolSelection { request } => Some(request),
            _ => None,
        }
    }

    /// Event fields in the stable wire shape
    pub fn to_event_input(&self) -> EventInput {
        match self {
            HookPayload::BeforeTool {
                tool_name,
                tool_input,
            } => EventInput::BeforeTool {
                tool_name: tool_name.clone(),
                tool_input: tool_input.clone(),
            },
            HookPayload::AfterTool {
                tool_name,
                tool_input,
                tool_response,
            } => EventInput::AfterTool {
                tool_name: tool_name.clone(),
                tool_input: tool_input.clone(),
                tool_response: tool_response.clone(),
            },
            HookPayload::BeforeAgent { prompt } => EventInput::BeforeAgent {
                prompt: prompt.clone(),
            },
            HookPayload::AfterAgent {
                prompt,
                prompt_response,
                stop_hook_active,
            } => EventInput::AfterAgent {
                prompt: prompt.clone(),
                prompt_response: prompt_response.clone(),
                stop_hook_active: *stop_hook_active,
            },
            HookPayload::BeforeModel { request } => EventInput::BeforeModel {
                llm_request: translator::to_external(request),
            },
            HookPayload::AfterModel { request, response } => EventInput::AfterModel {
                llm_request: translator::to_external(request),
                llm_response: translator::to_external_response(response),
            },
            HookPayload::BeforeToolSelection { request } => EventInput::BeforeToolSelection {
                llm_request: translator::to_external(request),
            },
            HookPayload::SessionStart { source } => EventInput::SessionStart { source: *source },
            HookPayload::SessionEnd { reason } => EventInput::SessionEnd { reason: *reason },
            HookPayload::PreCompress { trigger } => EventInput::PreCompress { trigger: *trigger },
            HookPayload::Notification {
                notification_type,
                message,
                details,
            } => EventInput::Notification {
                notification_type: *notification_type,
                message: message.clone(),
                details: details.clone(),
            },
        }
    }
}

// ============================================================================
// HookInput (wire side)
// ============================================================================

/// Event-specific fields of the document written to a hook's stdin
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventInput {
    BeforeTool {
        tool_name: String,
        tool_input: Value,
    },
    AfterTool {
        tool_name: String,
        tool_input: Value,
        tool_response: Value,
    },
    BeforeAgent {
        prompt: String,
    },
    AfterAgent {
        prompt: String,
        prompt_response: String,
        stop_hook_active: bool,
    },
    BeforeModel {
        llm_request: LlmRequest,
    },
    AfterModel {
        llm_request: LlmRequest,
        llm_response: LlmResponse,
    },
    BeforeToolSelection {
        llm_request: LlmRequest,
    },
    SessionStart {
        source: SessionStartSource,
    },
    SessionEnd {
        reason: SessionEndReason,
    },
    PreCompress {
        trigger: PreCompressTrigger,
    },
    Notification {
        notification_type: NotificationType,
        message: String,
        details: Value,
    },
}

/// Full stdin document: base envelope plus event fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
    pub hook_event_name: HookEventName,
    /// RFC 3339, informational only
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: EventInput,
}

impl HookInput {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_name_parse_and_display() {
        for event in HookEventName::ALL {
            assert_eq!(event.as_str().parse::<HookEventName>().unwrap(), event);
            assert_eq!(
                serde_json::to_value(event).unwrap(),
                json!(event.to_string())
            );
        }
        assert!("PreToolUse".parse::<HookEventName>().is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(HookEventName::AfterTool.category(), EventCategory::Tool);
        assert_eq!(HookEventName::AfterModel.category(), EventCategory::Model);
        assert_eq!(
            HookEventName::BeforeToolSelection.category(),
            EventCategory::ToolSelection
        );
        assert_eq!(HookEventName::SessionEnd.category(), EventCategory::Lifecycle);
    }

    #[test]
    fn test_match_subjects() {
        let payload = HookPayload::BeforeTool {
            tool_name: "shell".to_string(),
            tool_input: json!({}),
        };
        assert_eq!(payload.match_subject().as_deref(), Some("shell"));

        let payload = HookPayload::SessionEnd {
            reason: SessionEndReason::PromptInputExit,
        };
        assert_eq!(payload.match_subject().as_deref(), Some("prompt_input_exit"));

        let payload = HookPayload::BeforeAgent {
            prompt: "hi".to_string(),
        };
        assert!(payload.match_subject().is_none());
    }

    #[test]
    fn test_input_envelope_is_flat() {
        let input = HookInput {
            session_id: "s1".to_string(),
            transcript_path: String::new(),
            cwd: "/work".to_string(),
            hook_event_name: HookEventName::BeforeTool,
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            fields: EventInput::BeforeTool {
                tool_name: "shell".to_string(),
                tool_input: json!({"cmd": "ls"}),
            },
        };
        let value: Value = serde_json::from_str(&input.to_json().unwrap()).unwrap();
        assert_eq!(value["hook_event_name"], "BeforeTool");
        assert_eq!(value["tool_name"], "shell");
        assert_eq!(value["tool_input"]["cmd"], "ls");
        assert_eq!(value["cwd"], "/work");
    }

    #[test]
    fn test_payload_deserializes_from_tagged_json() {
        let payload: HookPayload = serde_json::from_value(json!({
            "hook_event_name": "SessionStart",
            "source": "resume"
        }))
        .unwrap();
        assert_eq!(
            payload,
            HookPayload::SessionStart {
                source: SessionStartSource::Resume
            }
        );
    }
}
