//! Hook execution: one child process per hook, fanned out in parallel or
//! chained sequentially with each output feeding the next hook's input.

pub mod process;

pub use process::{expand_project_dir, HookExit, PROJECT_DIR_VARS};

use futures::future::join_all;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::HookConfig;
use crate::error::HookError;
use crate::events::{EventInput, HookEventName, HookInput};
use crate::output::{decode_stdout, HookOutput, LLM_REQUEST};
use crate::planner::ExecutionPlan;
use crate::registry::RegistryEntry;
use crate::translator::{shallow_merge, LlmRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Exit code that turns stderr into a blocking decision
pub const BLOCKING_EXIT_CODE: i32 = 2;

/// Outcome of running a single hook
#[derive(Debug, Clone, Serialize)]
pub struct HookExecutionResult {
    pub hook: HookConfig,
    pub event: HookEventName,
    pub success: bool,
    pub exit: HookExit,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<HookOutput>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
}

pub(crate) fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl HookExecutionResult {
    /// True when this hook's output blocks the operation for its event
    pub fn is_blocking(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.decision_for(self.event))
            .map(|d| d.is_blocking())
            .unwrap_or(false)
    }

    /// Whether this hook's output counts as policy. A hook that failed
    /// without exit 2 only contributes its warning message.
    pub fn has_opinion(&self) -> bool {
        self.success
            || self.exit
                == HookExit::Code {
                    code: BLOCKING_EXIT_CODE,
                }
    }

    fn failed(entry: &RegistryEntry, exit: HookExit, error: HookError, duration: Duration) -> Self {
        Self {
            hook: entry.hook.clone(),
            event: entry.event,
            success: false,
            exit,
            duration,
            output: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }
}

pub struct HookRunner {
    cwd: PathBuf,
    default_timeout: Duration,
    termination_grace: Duration,
}

impl HookRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            default_timeout: DEFAULT_TIMEOUT,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    /// Timeout for hooks that do not set their own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Delay between SIGTERM and SIGKILL once a hook times out
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub async fn execute_plan(&self, plan: &ExecutionPlan, input: HookInput) -> Vec<HookExecutionResult> {
        if plan.sequential {
            self.execute_sequential(&plan.entries, input).await
        } else {
            self.execute_parallel(&plan.entries, &input).await
        }
    }

    /// Run all hooks at once and wait for every one of them.
    /// Results come back in plan order.
    pub async fn execute_parallel(
        &self,
        entries: &[RegistryEntry],
        input: &HookInput,
    ) -> Vec<HookExecutionResult> {
        join_all(entries.iter().map(|entry| self.execute_hook(entry, input))).await
    }

    /// Run hooks one after another, folding each successful output into the
    /// next hook's input. A blocking decision ends the chain.
    pub async fn execute_sequential(
        &self,
        entries: &[RegistryEntry],
        input: HookInput,
    ) -> Vec<HookExecutionResult> {
        let mut results = Vec::with_capacity(entries.len());
        let mut current = input;

        for (index, entry) in entries.iter().enumerate() {
            let result = self.execute_hook(entry, &current).await;
            let blocking = result.is_blocking();
            current = chain_input(current, &result);
            results.push(result);

            if blocking {
                info!(
                    event = %entry.event,
                    hook = entry.hook.label(),
                    skipped = entries.len() - index - 1,
                    "Hook blocked, stopping sequential chain"
                );
                break;
            }
        }

        results
    }

    /// Spawn one hook, feed it `input` and interpret how it ended
    pub async fn execute_hook(&self, entry: &RegistryEntry, input: &HookInput) -> HookExecutionResult {
        let started = Instant::now();
        let timeout = entry.hook.timeout.unwrap_or(self.default_timeout);

        let payload = match input.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(hook = entry.hook.label(), error = %e, "Failed to serialize hook input");
                return HookExecutionResult::failed(
                    entry,
                    HookExit::Error,
                    HookError::Infrastructure(format!("failed to serialize hook input: {}", e)),
                    started.elapsed(),
                );
            }
        };

        let outcome = process::run(
            &entry.hook.command,
            &self.cwd,
            payload,
            timeout,
            self.termination_grace,
        )
        .await;

        match outcome {
            Ok(out) => interpret(entry, out, timeout, started.elapsed()),
            Err(e) => {
                warn!(hook = entry.hook.label(), error = %e, "Failed to spawn hook");
                HookExecutionResult::failed(
                    entry,
                    HookExit::Error,
                    HookError::Execution {
                        command: entry.hook.command.clone(),
                        detail: format!("failed to spawn: {}", e),
                    },
                    started.elapsed(),
                )
            }
        }
    }
}

/// Map exit status and captured streams onto success, output and error
fn interpret(
    entry: &RegistryEntry,
    out: process::ProcessOutput,
    timeout: Duration,
    duration: Duration,
) -> HookExecutionResult {
    let label = entry.hook.label();
    let stderr = out.stderr.trim();
    let execution_error = |detail: String| HookError::Execution {
        command: entry.hook.command.clone(),
        detail,
    };

    let (success, output, error) = match out.exit {
        HookExit::Code { code: 0 } => {
            if !stderr.is_empty() {
                debug!(hook = label, stderr, "Hook wrote to stderr");
            }
            let (output, error) = decode_stdout(&out.stdout);
            (true, output, error)
        }
        HookExit::Code {
            code: BLOCKING_EXIT_CODE,
        } => {
            info!(hook = label, event = %entry.event, "Hook blocked with exit code 2");
            (
                false,
                Some(HookOutput::blocked(stderr)),
                Some(execution_error("blocked with exit code 2".to_string())),
            )
        }
        HookExit::Code { .. } | HookExit::Signal { .. } => {
            let detail = match out.exit {
                HookExit::Signal { signal } => format!("terminated by signal {}", signal),
                _ => format!("exited with code {}", out.exit.display_code().unwrap_or(-1)),
            };
            warn!(hook = label, event = %entry.event, stderr, "Hook {}", detail);
            let output = (!stderr.is_empty()).then(|| HookOutput::warning(stderr));
            (false, output, Some(execution_error(detail)))
        }
        HookExit::TimedOut => (
            false,
            None,
            Some(execution_error(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        ),
        HookExit::Error => (
            false,
            None,
            Some(execution_error("process could not be waited on".to_string())),
        ),
    };

    debug!(
        hook = label,
        success,
        exit_code = out.exit.display_code(),
        duration_ms = duration.as_millis() as u64,
        "Hook finished"
    );

    HookExecutionResult {
        hook: entry.hook.clone(),
        event: entry.event,
        success,
        exit: out.exit,
        duration,
        output,
        stdout: out.stdout,
        stderr: out.stderr,
        error,
    }
}

/// Input for the next hook in a sequential chain.
///
/// Only successful outputs feed forward: `additionalContext` is prepended to
/// a BeforeAgent prompt, `hookSpecificOutput.llm_request` is merged over a
/// BeforeModel request. Everything else passes through unchanged.
pub fn chain_input(input: HookInput, result: &HookExecutionResult) -> HookInput {
    let output = match (&result.output, result.success) {
        (Some(output), true) => output,
        _ => return input,
    };

    let fields = match input.fields {
        EventInput::BeforeAgent { prompt } => match output.additional_context() {
            Some(context) if !context.trim().is_empty() => EventInput::BeforeAgent {
                prompt: format!("{}\n\n{}", context, prompt),
            },
            _ => EventInput::BeforeAgent { prompt },
        },
        EventInput::BeforeModel { llm_request } => match output.specific(LLM_REQUEST) {
            Some(patch) => EventInput::BeforeModel {
                llm_request: merge_request(llm_request, patch),
            },
            None => EventInput::BeforeModel { llm_request },
        },
        other => other,
    };

    HookInput { fields, ..input }
}

fn merge_request(request: LlmRequest, patch: &Value) -> LlmRequest {
    let mut value = match serde_json::to_value(&request) {
        Ok(value) => value,
        Err(_) => return request,
    };
    shallow_merge(&mut value, patch);
    match serde_json::from_value(value) {
        Ok(merged) => merged,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed llm_request from hook");
            request
        }
    }
}
