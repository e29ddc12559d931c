pub mod fire;
pub mod init;
pub mod list;
pub mod validate;

use anyhow::Result;
use operon_hooks::HookEventHandler;
use std::sync::Arc;

use crate::config::Config;

/// Build a handler over the config and load its hooks
pub(crate) async fn load_handler(config: &Config) -> Result<HookEventHandler> {
    let handler = HookEventHandler::new(config.handler_settings()?, Arc::new(config.loader()?));
    handler.initialize().await;
    Ok(handler)
}
