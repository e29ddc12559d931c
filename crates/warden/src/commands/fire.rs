use anyhow::{Context, Result};
use operon_hooks::{HookEventName, HookPayload};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

use crate::config::Config;

/// Fire one event, print the merged result. Returns whether it blocks.
pub async fn execute(
    config: &Config,
    event: &str,
    payload_file: Option<&Path>,
    tool: Option<String>,
) -> Result<bool> {
    let event: HookEventName = event.parse()?;
    let payload = build_payload(event, payload_file, tool)?;

    let handler = super::load_handler(config).await?;
    let result = handler.fire(payload).await;
    info!(event = %event, blocking = result.is_blocking(), "Event fired");

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_blocking())
}

/// Event fields from the payload file, tagged with the event name
fn build_payload(
    event: HookEventName,
    payload_file: Option<&Path>,
    tool: Option<String>,
) -> Result<HookPayload> {
    let mut fields = match payload_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .context(format!("Failed to read payload file: {:?}", path))?;
            match serde_json::from_str::<Value>(&content)
                .context(format!("Failed to parse payload JSON: {:?}", path))?
            {
                Value::Object(map) => map,
                _ => anyhow::bail!("Payload must be a JSON object: {:?}", path),
            }
        }
        None => Map::new(),
    };

    fields.insert(
        "hook_event_name".to_string(),
        Value::String(event.to_string()),
    );
    if let Some(tool) = tool {
        fields.insert("tool_name".to_string(), Value::String(tool));
    }

    serde_json::from_value(Value::Object(fields))
        .context(format!("Payload does not match the fields of {}", event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_flag_fills_tool_name() {
        let payload = build_payload(HookEventName::BeforeTool, None, Some("shell".to_string()))
            .unwrap();
        assert_eq!(payload.event(), HookEventName::BeforeTool);
        assert_eq!(payload.match_subject().as_deref(), Some("shell"));
    }

    #[test]
    fn test_payload_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"source": "resume"}"#).unwrap();

        let payload = build_payload(HookEventName::SessionStart, Some(&path), None).unwrap();
        assert_eq!(payload.match_subject().as_deref(), Some("resume"));
    }

    #[test]
    fn test_missing_fields_are_an_error() {
        assert!(build_payload(HookEventName::BeforeAgent, None, None).is_err());
    }
}
