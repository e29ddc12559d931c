pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod llm;
pub mod output;
pub mod planner;
pub mod plugin;
pub mod registry;
pub mod runner;
pub mod translator;

pub use aggregator::{AggregatedHookResult, HookAggregator, MergeStrategy};
pub use config::{
    load_hooks_file, ConfigSource, FileConfigLoader, HookConfig, HookConfigLoader, HookDef,
    HookGroupDef, HookKind, HookSources, HooksConfig, SourcedHooks, StaticConfigLoader,
};
pub use error::HookError;
pub use events::{
    EventCategory, EventInput, HookEventName, HookInput, HookPayload, NotificationType,
    PreCompressTrigger, SessionEndReason, SessionStartSource,
};
pub use handler::{HandlerSettings, HookEventHandler};
pub use llm::{
    Content, GenerateConfig, GenerateResponse, Message, ModelRequest, Role, StopReason, ToolChoice,
    ToolMode, Usage,
};
pub use output::{Decision, HookOutput};
pub use planner::{ExecutionPlan, HookPlanner, MatchContext, Matcher};
pub use plugin::{discover_plugins, PluginManifest};
pub use registry::{HookRegistry, RegistryEntry};
pub use runner::{HookExecutionResult, HookExit, HookRunner};
pub use translator::{LlmRequest, LlmResponse};

/// Initialize structured JSON logging on stderr; stdout belongs to the host
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
