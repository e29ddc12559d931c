use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregatedHookResult, HookAggregator};
use crate::config::{HookConfigLoader, HookSources};
use crate::events::{
    HookInput, HookPayload, NotificationType, PreCompressTrigger, SessionEndReason,
    SessionStartSource,
};
use crate::llm::{GenerateResponse, ModelRequest};
use crate::planner::{HookPlanner, MatchContext};
use crate::registry::HookRegistry;
use crate::runner::{HookRunner, DEFAULT_TERMINATION_GRACE, DEFAULT_TIMEOUT};

/// Per-session settings for the event handler
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// When false every fire returns an empty result without loading config
    pub enabled: bool,
    pub session_id: String,
    pub transcript_path: Option<PathBuf>,
    /// Working directory of hooks and value of the project dir variables
    pub cwd: PathBuf,
    pub default_timeout: Duration,
    pub termination_grace: Duration,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            session_id: uuid::Uuid::new_v4().to_string(),
            transcript_path: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            default_timeout: DEFAULT_TIMEOUT,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

/// Entry point for the host: fire an event, get back one merged verdict.
///
/// Configuration is loaded on the first fire. Nothing in here ever fails the
/// caller; infrastructure errors and panics degrade to an empty result.
pub struct HookEventHandler {
    settings: HandlerSettings,
    loader: Arc<dyn HookConfigLoader>,
    registry: HookRegistry,
    planner: HookPlanner,
    runner: HookRunner,
    aggregator: HookAggregator,
    initialized: OnceCell<()>,
}

impl HookEventHandler {
    pub fn new(settings: HandlerSettings, loader: Arc<dyn HookConfigLoader>) -> Self {
        let runner = HookRunner::new(settings.cwd.clone())
            .with_default_timeout(settings.default_timeout)
            .with_termination_grace(settings.termination_grace);
        Self {
            settings,
            loader,
            registry: HookRegistry::new(),
            planner: HookPlanner::new(),
            runner,
            aggregator: HookAggregator::new(),
            initialized: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Load configuration into the registry. Runs once; concurrent callers
    /// wait for the first one.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                let sources = match self.loader.load().await {
                    Ok(sources) => sources,
                    Err(e) => {
                        warn!(error = %e, "Failed to load hook configuration, running without hooks");
                        HookSources::default()
                    }
                };
                self.registry.initialize(sources);
            })
            .await;
    }

    /// Fire one event through plan, run and merge
    pub async fn fire(&self, payload: HookPayload) -> AggregatedHookResult {
        if !self.settings.enabled {
            return AggregatedHookResult::empty();
        }

        let event = payload.event();
        match AssertUnwindSafe(self.try_fire(payload)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                warn!(event = %event, "Hook pipeline panicked, continuing without hooks");
                AggregatedHookResult::empty()
            }
        }
    }

    async fn try_fire(&self, payload: HookPayload) -> AggregatedHookResult {
        self.initialize().await;

        let started = Instant::now();
        let event = payload.event();
        let subject = payload.match_subject();
        let plan = match self.planner.plan(
            &self.registry,
            event,
            MatchContext {
                subject: subject.as_deref(),
            },
        ) {
            Some(plan) => plan,
            None => {
                debug!(event = %event, "No hooks apply");
                return AggregatedHookResult::empty();
            }
        };

        let input = self.build_input(&payload);
        let results = self.runner.execute_plan(&plan, input).await;
        let mut aggregated = self.aggregator.merge(results, event);
        aggregated.duration = started.elapsed();

        info!(
            event = %event,
            hooks = plan.entries.len(),
            sequential = plan.sequential,
            blocking = aggregated.is_blocking(),
            success = aggregated.success,
            duration_ms = aggregated.duration.as_millis() as u64,
            "Hooks fired"
        );
        aggregated
    }

    fn build_input(&self, payload: &HookPayload) -> HookInput {
        HookInput {
            session_id: self.settings.session_id.clone(),
            transcript_path: self
                .settings
                .transcript_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            cwd: self.settings.cwd.to_string_lossy().into_owned(),
            hook_event_name: payload.event(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            fields: payload.to_event_input(),
        }
    }

    // ========================================================================
    // Per-event helpers
    // ========================================================================

    pub async fn fire_before_tool(&self, tool_name: &str, tool_input: Value) -> AggregatedHookResult {
        self.fire(HookPayload::BeforeTool {
            tool_name: tool_name.to_string(),
            tool_input,
        })
        .await
    }

    pub async fn fire_after_tool(
        &self,
        tool_name: &str,
        tool_input: Value,
        tool_response: Value,
    ) -> AggregatedHookResult {
        self.fire(HookPayload::AfterTool {
            tool_name: tool_name.to_string(),
            tool_input,
            tool_response,
        })
        .await
    }

    pub async fn fire_before_agent(&self, prompt: &str) -> AggregatedHookResult {
        self.fire(HookPayload::BeforeAgent {
            prompt: prompt.to_string(),
        })
        .await
    }

    pub async fn fire_after_agent(
        &self,
        prompt: &str,
        prompt_response: &str,
        stop_hook_active: bool,
    ) -> AggregatedHookResult {
        self.fire(HookPayload::AfterAgent {
            prompt: prompt.to_string(),
            prompt_response: prompt_response.to_string(),
            stop_hook_active,
        })
        .await
    }

    pub async fn fire_before_model(&self, request: &ModelRequest) -> AggregatedHookResult {
        self.fire(HookPayload::BeforeModel {
            request: request.clone(),
        })
        .await
    }

    pub async fn fire_after_model(
        &self,
        request: &ModelRequest,
        response: &GenerateResponse,
    ) -> AggregatedHookResult {
        self.fire(HookPayload::AfterModel {
            request: request.clone(),
            response: response.clone(),
        })
        .await
    }

    pub async fn fire_before_tool_selection(&self, request: &ModelRequest) -> AggregatedHookResult {
        self.fire(HookPayload::BeforeToolSelection {
            request: request.clone(),
        })
        .await
    }

    pub async fn fire_session_start(&self, source: SessionStartSource) -> AggregatedHookResult {
        self.fire(HookPayload::SessionStart { source }).await
    }

    pub async fn fire_session_end(&self, reason: SessionEndReason) -> AggregatedHookResult {
        self.fire(HookPayload::SessionEnd { reason }).await
    }

    pub async fn fire_pre_compress(&self, trigger: PreCompressTrigger) -> AggregatedHookResult {
        self.fire(HookPayload::PreCompress { trigger }).await
    }

    pub async fn fire_notification(
        &self,
        notification_type: NotificationType,
        message: &str,
        details: Value,
    ) -> AggregatedHookResult {
        self.fire(HookPayload::Notification {
            notification_type,
            message: message.to_string(),
            details,
        })
        .await
    }
}
