use anyhow::{Context, Result};
use operon_hooks::{FileConfigLoader, HandlerSettings, HooksConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Project-tier hooks
    #[serde(default)]
    pub hooks: HooksConfig,

    /// File this config was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_grace_ms")]
    pub termination_grace_ms: u64,

    /// Hook working directory; current directory when unset
    #[serde(default)]
    pub cwd: Option<String>,

    #[serde(default)]
    pub transcript_path: Option<String>,

    /// Directory scanned for `<plugin>/plugin.toml`
    #[serde(default)]
    pub plugins_dir: Option<String>,

    /// Commands skipped regardless of where they are configured
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_grace_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_ms: default_timeout_ms(),
            termination_grace_ms: default_grace_ms(),
            cwd: None,
            transcript_path: None,
            plugins_dir: None,
            disabled: Vec::new(),
        }
    }
}

/// Expand `~` and environment variables in a configured path
fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(raw).context(format!("Failed to expand path: {:?}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

impl Config {
    pub fn handler_settings(&self) -> Result<HandlerSettings> {
        let mut settings = HandlerSettings {
            enabled: self.engine.enabled,
            default_timeout: Duration::from_millis(self.engine.timeout_ms),
            termination_grace: Duration::from_millis(self.engine.termination_grace_ms),
            ..Default::default()
        };
        if let Some(cwd) = &self.engine.cwd {
            settings.cwd = expand_path(cwd)?;
        }
        if let Some(transcript) = &self.engine.transcript_path {
            settings.transcript_path = Some(expand_path(transcript)?);
        }
        Ok(settings)
    }

    /// Loader reading `[hooks]` back from the config file plus any plugins
    pub fn loader(&self) -> Result<FileConfigLoader> {
        let plugins_dir = match &self.engine.plugins_dir {
            Some(dir) => Some(expand_path(dir)?),
            None => None,
        };
        Ok(FileConfigLoader {
            project_file: self.source.clone(),
            plugins_dir,
            disabled: self.engine.disabled.clone(),
        })
    }
}

/// Load config from file, `./warden.toml`, or use defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.exists() {
                return Ok(Config::default());
            }
            fallback
        }
    };

    let content =
        fs::read_to_string(&path).context(format!("Failed to read config file: {:?}", path))?;
    let mut config: Config = toml::from_str(&content)
        .context(format!("Failed to parse TOML config: {:?}", path))?;
    config.source = Some(path);

    Ok(config)
}
