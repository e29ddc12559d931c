//! Merging per-hook outputs into one verdict for the caller.
//!
//! Tool and lifecycle events use OR semantics: any block wins. Model events
//! let later hooks override earlier ones field by field. Tool selection
//! unions the allowed function lists and keeps the most restrictive mode.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::error::HookError;
use crate::events::{EventCategory, HookEventName};
use crate::llm::{GenerateResponse, ModelRequest, ToolChoice};
use crate::output::{
    Decision, HookOutput, ADDITIONAL_CONTEXT, LLM_REQUEST, LLM_RESPONSE, PERMISSION_DECISION,
    PERMISSION_DECISION_REASON, TOOL_CONFIG,
};
use crate::runner::{as_millis, HookExecutionResult};
use crate::translator::{self, shallow_merge, LlmToolConfig, LlmToolMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    OrDecision,
    FieldReplacement,
    Union,
}

impl MergeStrategy {
    pub fn for_event(event: HookEventName) -> Self {
        match event.category() {
            EventCategory::Tool | EventCategory::Lifecycle => MergeStrategy::OrDecision,
            EventCategory::Model => MergeStrategy::FieldReplacement,
            EventCategory::ToolSelection => MergeStrategy::Union,
        }
    }
}

/// What a fire returns. Never an error: failures are listed in `errors`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedHookResult {
    /// False if any hook failed
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<HookOutput>,
    pub outputs: Vec<HookOutput>,
    pub errors: Vec<HookError>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub results: Vec<HookExecutionResult>,
}

impl AggregatedHookResult {
    /// Nothing ran: the operation proceeds untouched
    pub fn empty() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.final_output
            .as_ref()
            .map(HookOutput::is_blocking)
            .unwrap_or(false)
    }

    pub fn should_stop(&self) -> bool {
        self.final_output
            .as_ref()
            .map(HookOutput::should_stop)
            .unwrap_or(false)
    }

    pub fn effective_reason(&self) -> Option<String> {
        self.final_output.as_ref().map(HookOutput::effective_reason)
    }

    pub fn system_message(&self) -> Option<&str> {
        self.final_output.as_ref()?.system_message.as_deref()
    }

    pub fn additional_context(&self) -> Option<&str> {
        self.final_output.as_ref()?.additional_context()
    }

    pub fn suppress_output(&self) -> bool {
        self.final_output
            .as_ref()
            .and_then(|o| o.suppress_output)
            .unwrap_or(false)
    }

    fn specific(&self, key: &str) -> Option<&Value> {
        self.final_output.as_ref()?.specific(key)
    }

    /// BeforeModel: a response supplied by hooks in place of calling the model
    pub fn synthetic_response(&self, request: &ModelRequest) -> Option<GenerateResponse> {
        translator::response_from_patch(self.specific(LLM_RESPONSE)?, request)
    }

    /// BeforeModel: the request with hook edits applied
    pub fn apply_request_modifications(&self, request: &ModelRequest) -> ModelRequest {
        match self.specific(LLM_REQUEST) {
            Some(patch) => translator::apply_request_patch(request, patch),
            None => request.clone(),
        }
    }

    /// AfterModel: the response with hook edits applied, None when untouched
    pub fn modified_response(&self, response: &GenerateResponse) -> Option<GenerateResponse> {
        self.specific(LLM_RESPONSE)
            .map(|patch| translator::apply_response_patch(response, patch))
    }

    /// BeforeToolSelection: merged tool configuration
    pub fn tool_config(&self) -> Option<ToolChoice> {
        let value = self.specific(TOOL_CONFIG)?;
        let config: LlmToolConfig = serde_json::from_value(value.clone()).ok()?;
        Some(translator::tool_choice_from_external(&config))
    }
}

#[derive(Debug, Default)]
pub struct HookAggregator;

impl HookAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(&self, results: Vec<HookExecutionResult>, event: HookEventName) -> AggregatedHookResult {
        let outputs: Vec<HookOutput> = results.iter().filter_map(|r| r.output.clone()).collect();
        let errors: Vec<HookError> = results
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| r.error.clone())
            .collect();
        let success = results.iter().all(|r| r.success);
        let duration = results.iter().map(|r| r.duration).sum();

        // Failed hooks keep their warning text but never a decision or edits
        let contributions: Vec<HookOutput> = results
            .iter()
            .filter_map(|r| {
                let output = r.output.as_ref()?;
                Some(if r.has_opinion() {
                    output.clone()
                } else {
                    output.message_only()
                })
            })
            .collect();

        let strategy = MergeStrategy::for_event(event);
        let final_output = if contributions.is_empty() {
            None
        } else {
            Some(match strategy {
                MergeStrategy::OrDecision => merge_or_decision(&contributions, event),
                MergeStrategy::FieldReplacement => merge_field_replacement(&contributions),
                MergeStrategy::Union => merge_tool_selection(&contributions),
            })
        };

        debug!(
            event = %event,
            ?strategy,
            outputs = outputs.len(),
            errors = errors.len(),
            "Merged hook outputs"
        );

        AggregatedHookResult {
            success,
            final_output,
            outputs,
            errors,
            duration,
            results,
        }
    }
}

fn join(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Any block wins (first blocking kind is kept), then ask, then allow
fn merge_or_decision(outputs: &[HookOutput], event: HookEventName) -> HookOutput {
    let mut merged = HookOutput::default();
    let mut blocking: Option<Decision> = None;
    let mut ask = false;
    let mut allow = false;
    let mut block_reasons = Vec::new();
    let mut reasons = Vec::new();
    let mut messages = Vec::new();
    let mut contexts = Vec::new();
    let mut stop_reasons = Vec::new();
    let mut specific = Map::new();

    for output in outputs {
        let reason = output.reason_for(event);
        match output.decision_for(event) {
            Some(decision) if decision.is_blocking() => {
                blocking.get_or_insert(decision);
                block_reasons.extend(reason.clone());
            }
            Some(Decision::Ask) => ask = true,
            Some(_) => allow = true,
            None => {}
        }
        reasons.extend(reason);

        messages.extend(output.system_message.clone());
        contexts.extend(output.additional_context().map(str::to_string));
        if output.suppress_output == Some(true) {
            merged.suppress_output = Some(true);
        }
        if output.should_stop() {
            merged.continue_execution = Some(false);
            stop_reasons.extend(output.stop_reason.clone());
        }
        if let Some(map) = &output.hook_specific_output {
            specific.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    merged.decision = blocking.or(if ask {
        Some(Decision::Ask)
    } else if allow {
        Some(Decision::Allow)
    } else {
        None
    });
    merged.reason = join(if blocking.is_some() { block_reasons } else { reasons });
    merged.system_message = join(messages);
    merged.stop_reason = join(stop_reasons);

    // Normalized into the top-level decision and reason above
    specific.remove(PERMISSION_DECISION);
    specific.remove(PERMISSION_DECISION_REASON);
    match join(contexts) {
        Some(context) => {
            specific.insert(ADDITIONAL_CONTEXT.to_string(), Value::String(context));
        }
        None => {
            specific.remove(ADDITIONAL_CONTEXT);
        }
    }
    merged.hook_specific_output = (!specific.is_empty()).then_some(specific);
    merged
}

/// Later outputs override earlier ones field by field. Object values inside
/// `hookSpecificOutput` (llm_request, llm_response) merge one level deep.
fn merge_field_replacement(outputs: &[HookOutput]) -> HookOutput {
    let mut merged = HookOutput::default();

    for output in outputs {
        if output.decision.is_some() {
            merged.decision = output.decision;
        }
        if output.reason.is_some() {
            merged.reason = output.reason.clone();
        }
        if output.continue_execution.is_some() {
            merged.continue_execution = output.continue_execution;
        }
        if output.stop_reason.is_some() {
            merged.stop_reason = output.stop_reason.clone();
        }
        if output.suppress_output.is_some() {
            merged.suppress_output = output.suppress_output;
        }
        if output.system_message.is_some() {
            merged.system_message = output.system_message.clone();
        }

        if let Some(map) = &output.hook_specific_output {
            let target = merged.hook_specific_output.get_or_insert_with(Map::new);
            for (key, value) in map {
                let both_objects =
                    value.is_object() && target.get(key).map_or(false, Value::is_object);
                if both_objects {
                    if let Some(existing) = target.get_mut(key) {
                        shallow_merge(existing, value);
                    }
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
    }

    merged
}

/// Most restrictive mode wins; function names are unioned unless the mode is NONE
fn merge_tool_selection(outputs: &[HookOutput]) -> HookOutput {
    let mut merged = merge_field_replacement(outputs);

    let mut mode: Option<LlmToolMode> = None;
    let mut names = BTreeSet::new();
    for output in outputs {
        let config = output
            .specific(TOOL_CONFIG)
            .and_then(|v| serde_json::from_value::<LlmToolConfig>(v.clone()).ok());
        if let Some(config) = config {
            mode = mode.max(Some(config.mode));
            names.extend(config.allowed_function_names.unwrap_or_default());
        }
    }

    if let Some(mode) = mode {
        let allowed = match mode {
            LlmToolMode::None => Vec::new(),
            LlmToolMode::Auto | LlmToolMode::Any => names.into_iter().collect(),
        };
        let config = LlmToolConfig {
            mode,
            allowed_function_names: Some(allowed),
        };
        if let Ok(value) = serde_json::to_value(config) {
            merged
                .hook_specific_output
                .get_or_insert_with(Map::new)
                .insert(TOOL_CONFIG.to_string(), value);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HookConfig, HookKind};
    use crate::llm::{Content, GenerateConfig, Message, StopReason, ToolMode, Usage};
    use crate::output::parse_stdout;
    use crate::runner::HookExit;
    use serde_json::json;

    fn result(event: HookEventName, stdout: &str) -> HookExecutionResult {
        HookExecutionResult {
            hook: HookConfig {
                kind: HookKind::Command,
                command: "test".to_string(),
                timeout: None,
                name: None,
                plugin: None,
            },
            event,
            success: true,
            exit: HookExit::Code { code: 0 },
            duration: Duration::from_millis(5),
            output: parse_stdout(stdout),
            stdout: stdout.to_string(),
            stderr: String::new(),
            error: None,
        }
    }

    fn merge(event: HookEventName, stdouts: &[&str]) -> AggregatedHookResult {
        let results = stdouts.iter().map(|s| result(event, s)).collect();
        HookAggregator::new().merge(results, event)
    }

    #[test]
    fn test_any_block_wins_regardless_of_order() {
        let block = r#"{"decision":"block","reason":"dangerous"}"#;
        let allow_b = r#"{"decision":"allow","reason":"fine"}"#;
        let allow_c = r#"{"decision":"allow","systemMessage":"note"}"#;

        for order in [
            [block, allow_b, allow_c],
            [allow_b, block, allow_c],
            [allow_b, allow_c, block],
        ] {
            let merged = merge(HookEventName::BeforeTool, &order);
            assert!(merged.is_blocking());
            let output = merged.final_output.unwrap();
            assert_eq!(output.decision, Some(Decision::Block));
            assert_eq!(output.reason.as_deref(), Some("dangerous"));
            assert_eq!(output.system_message.as_deref(), Some("note"));
        }
    }

    #[test]
    fn test_or_merge_joins_text_and_stop() {
        let merged = merge(
            HookEventName::AfterAgent,
            &[
                r#"{"systemMessage":"one","hookSpecificOutput":{"additionalContext":"a"}}"#,
                r#"{"decision":"ask","continue":false,"stopReason":"enough","suppressOutput":true}"#,
                r#"{"systemMessage":"two","hookSpecificOutput":{"additionalContext":"b"}}"#,
            ],
        );

        let output = merged.final_output.clone().unwrap();
        assert_eq!(output.decision, Some(Decision::Ask));
        assert_eq!(output.system_message.as_deref(), Some("one\ntwo"));
        assert_eq!(merged.additional_context(), Some("a\nb"));
        assert!(merged.should_stop());
        assert_eq!(output.stop_reason.as_deref(), Some("enough"));
        assert!(merged.suppress_output());
        assert!(!merged.is_blocking());
    }

    #[test]
    fn test_permission_decision_is_normalized() {
        let merged = merge(
            HookEventName::BeforeTool,
            &[r#"{"hookSpecificOutput":{"permissionDecision":"deny","permissionDecisionReason":"policy"}}"#],
        );
        let output = merged.final_output.unwrap();
        assert_eq!(output.decision, Some(Decision::Deny));
        assert_eq!(output.reason.as_deref(), Some("policy"));
        assert!(output.hook_specific_output.is_none());
    }

    #[test]
    fn test_no_outputs_no_final_output() {
        let merged = merge(HookEventName::SessionStart, &["", "  "]);
        assert!(merged.success);
        assert!(merged.final_output.is_none());

        let merged = HookAggregator::new().merge(Vec::new(), HookEventName::BeforeTool);
        assert!(merged.final_output.is_none());
        assert!(merged.success);
    }

    #[test]
    fn test_failure_marks_aggregate_unsuccessful() {
        let mut failed = result(HookEventName::AfterTool, "");
        failed.success = false;
        failed.exit = HookExit::Code { code: 1 };
        failed.error = Some(HookError::Execution {
            command: "test".to_string(),
            detail: "exited with code 1".to_string(),
        });
        let ok = result(HookEventName::AfterTool, r#"{"decision":"allow"}"#);

        let merged = HookAggregator::new().merge(vec![ok, failed], HookEventName::AfterTool);
        assert!(!merged.success);
        assert_eq!(merged.errors.len(), 1);
        assert_eq!(merged.outputs.len(), 1);
    }

    #[test]
    fn test_field_replacement_later_wins() {
        let merged = merge(
            HookEventName::AfterModel,
            &[
                r#"{"decision":"block","reason":"first","systemMessage":"kept"}"#,
                r#"{"decision":"allow","reason":"second"}"#,
            ],
        );
        let output = merged.final_output.unwrap();
        assert_eq!(output.decision, Some(Decision::Allow));
        assert_eq!(output.reason.as_deref(), Some("second"));
        assert_eq!(output.system_message.as_deref(), Some("kept"));
    }

    fn crashed(event: HookEventName, stderr: &str) -> HookExecutionResult {
        let mut failed = result(event, "");
        failed.success = false;
        failed.exit = HookExit::Code { code: 1 };
        failed.output = Some(HookOutput::warning(stderr));
        failed.stderr = stderr.to_string();
        failed.error = Some(HookError::Execution {
            command: "test".to_string(),
            detail: "exited with code 1".to_string(),
        });
        failed
    }

    #[test]
    fn test_crashed_model_hook_keeps_earlier_block() {
        let blocking = result(
            HookEventName::BeforeModel,
            r#"{"decision":"block","reason":"pii","hookSpecificOutput":{"llm_request":{"config":{"temperature":0.0}}}}"#,
        );
        let merged = HookAggregator::new().merge(
            vec![blocking, crashed(HookEventName::BeforeModel, "crashed")],
            HookEventName::BeforeModel,
        );

        assert!(!merged.success);
        assert!(merged.is_blocking());
        let output = merged.final_output.clone().unwrap();
        assert_eq!(output.decision, Some(Decision::Block));
        assert_eq!(output.reason.as_deref(), Some("pii"));
        assert_eq!(output.system_message.as_deref(), Some("Warning: crashed"));
        assert_eq!(
            output.specific(LLM_REQUEST),
            Some(&json!({"config": {"temperature": 0.0}}))
        );
        assert_eq!(merged.outputs.len(), 2);
    }

    #[test]
    fn test_crashed_hook_alone_has_no_decision() {
        let merged = HookAggregator::new().merge(
            vec![crashed(HookEventName::BeforeToolSelection, "boom")],
            HookEventName::BeforeToolSelection,
        );
        let output = merged.final_output.unwrap();
        assert_eq!(output.decision, None);
        assert!(output.hook_specific_output.is_none());
        assert_eq!(output.system_message.as_deref(), Some("Warning: boom"));
    }

    #[test]
    fn test_exit_two_still_blocks_model_events() {
        let mut blocked = result(HookEventName::AfterModel, "");
        blocked.success = false;
        blocked.exit = HookExit::Code { code: 2 };
        blocked.output = Some(HookOutput::blocked("leaked secret"));
        let allow = result(HookEventName::AfterModel, r#"{"systemMessage":"ok"}"#);

        let merged =
            HookAggregator::new().merge(vec![allow, blocked], HookEventName::AfterModel);
        assert!(merged.is_blocking());
        assert_eq!(merged.effective_reason().as_deref(), Some("leaked secret"));
    }

    #[test]
    fn test_sequential_model_edits_both_survive() {
        let request = ModelRequest {
            messages: vec![Message::user("hello")],
            config: GenerateConfig {
                temperature: 0.7,
                max_tokens: 256,
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge(
            HookEventName::BeforeModel,
            &[
                r#"{"hookSpecificOutput":{"llm_request":{"messages":[{"role":"user","content":"hello"},{"role":"user","content":"added"}]}}}"#,
                r#"{"hookSpecificOutput":{"llm_request":{"config":{"temperature":0.1}}}}"#,
            ],
        );

        let modified = merged.apply_request_modifications(&request);
        assert_eq!(modified.messages.len(), 2);
        assert_eq!(modified.messages[1].content.extract_text(), "added");
        assert_eq!(modified.config.temperature, 0.1);
        assert_eq!(modified.config.max_tokens, 256);
    }

    #[test]
    fn test_synthetic_and_modified_responses() {
        let request = ModelRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let merged = merge(
            HookEventName::BeforeModel,
            &[r#"{"hookSpecificOutput":{"llm_response":{"candidates":[{"content":{"role":"model","parts":["cached"]},"finishReason":"STOP"}]}}}"#],
        );
        let response = merged.synthetic_response(&request).unwrap();
        assert_eq!(response.content.extract_text(), "cached");
        assert_eq!(response.stop_reason, StopReason::EndTurn);

        let original = GenerateResponse {
            content: Content::Text {
                text: "raw".to_string(),
            },
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
            model: "gemini-2.0-flash".to_string(),
        };
        let merged = merge(
            HookEventName::AfterModel,
            &[r#"{"hookSpecificOutput":{"llm_response":{"candidates":[{"content":{"role":"model","parts":["redacted"]}}]}}}"#],
        );
        let modified = merged.modified_response(&original).unwrap();
        assert_eq!(modified.content.extract_text(), "redacted");

        assert!(AggregatedHookResult::empty()
            .modified_response(&original)
            .is_none());
    }

    #[test]
    fn test_tool_selection_none_forces_empty_list() {
        let none = r#"{"hookSpecificOutput":{"toolConfig":{"mode":"NONE"}}}"#;
        let any = r#"{"hookSpecificOutput":{"toolConfig":{"mode":"ANY","allowedFunctionNames":["read_file"]}}}"#;

        for order in [[none, any], [any, none]] {
            let merged = merge(HookEventName::BeforeToolSelection, &order);
            let choice = merged.tool_config().unwrap();
            assert_eq!(choice.mode, ToolMode::None);
            assert!(choice.allowed.is_empty());
        }
    }

    #[test]
    fn test_tool_selection_unions_names() {
        let merged = merge(
            HookEventName::BeforeToolSelection,
            &[
                r#"{"hookSpecificOutput":{"toolConfig":{"mode":"AUTO","allowedFunctionNames":["write_file","read_file"]}}}"#,
                r#"{"hookSpecificOutput":{"toolConfig":{"mode":"ANY","allowedFunctionNames":["read_file","shell"]}}}"#,
            ],
        );
        let choice = merged.tool_config().unwrap();
        assert_eq!(choice.mode, ToolMode::Any);
        assert_eq!(choice.allowed, vec!["read_file", "shell", "write_file"]);
        assert_eq!(
            merged.final_output.unwrap().specific(TOOL_CONFIG),
            Some(&json!({"mode": "ANY", "allowedFunctionNames": ["read_file", "shell", "write_file"]}))
        );
    }
}
