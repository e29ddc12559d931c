use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::plugin::discover_plugins;

/// Where a set of hook definitions came from. Lower priority number wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Project,
    User,
    System,
    Extensions,
}

impl ConfigSource {
    pub fn priority(self) -> u8 {
        match self {
            ConfigSource::Project => 1,
            ConfigSource::User => 2,
            ConfigSource::System => 3,
            ConfigSource::Extensions => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Project => "project",
            ConfigSource::User => "user",
            ConfigSource::System => "system",
            ConfigSource::Extensions => "extensions",
        }
    }
}

// ============================================================================
// Raw definitions (as written in settings files)
// ============================================================================

/// Event name -> ordered hook groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HooksConfig {
    pub events: BTreeMap<String, Vec<HookGroupDef>>,
}

impl HooksConfig {
    pub fn is_empty(&self) -> bool {
        self.events.values().all(|groups| groups.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookGroupDef {
    /// Regex tested against the event subject; empty or `*` matches everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    #[serde(default)]
    pub sequential: bool,
    #[serde(default)]
    pub hooks: Vec<HookDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Milliseconds
    #[serde(
        default,
        alias = "timeout_ms",
        alias = "timeoutMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning plugin, required for `type = "plugin"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

// ============================================================================
// Validated definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    Command,
    /// Command contributed by a plugin manifest
    Plugin,
}

/// One validated, executable hook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookConfig {
    pub kind: HookKind,
    pub command: String,
    /// None = runner default (60s)
    pub timeout: Option<Duration>,
    pub name: Option<String>,
    pub plugin: Option<String>,
}

impl HookConfig {
    /// Label for logs: name if given, else the command
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }
}

impl TryFrom<&HookDef> for HookConfig {
    type Error = HookError;

    fn try_from(def: &HookDef) -> std::result::Result<Self, Self::Error> {
        let kind = match def.kind.as_deref() {
            Some("command") => HookKind::Command,
            Some("plugin") => HookKind::Plugin,
            Some(other) => {
                return Err(HookError::Config(format!("unknown hook type '{}'", other)))
            }
            None => return Err(HookError::Config("hook is missing 'type'".to_string())),
        };

        let command = match def.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => {
                return Err(HookError::Config(format!(
                    "{} hook is missing 'command'",
                    def.kind.as_deref().unwrap_or_default()
                )))
            }
        };

        if kind == HookKind::Plugin && def.plugin.as_deref().map_or(true, str::is_empty) {
            return Err(HookError::Config(format!(
                "plugin hook '{}' is missing 'plugin'",
                command
            )));
        }

        Ok(Self {
            kind,
            command,
            timeout: def.timeout.map(Duration::from_millis),
            name: def.name.clone(),
            plugin: def.plugin.clone(),
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Hook definitions from one source tier
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedHooks {
    pub source: ConfigSource,
    /// Plugin name for extension hooks
    pub origin: Option<String>,
    pub hooks: HooksConfig,
}

impl SourcedHooks {
    pub fn new(source: ConfigSource, hooks: HooksConfig) -> Self {
        Self {
            source,
            origin: None,
            hooks,
        }
    }
}

/// Everything the registry ingests, in ingestion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookSources {
    pub sources: Vec<SourcedHooks>,
    /// Commands to skip regardless of source
    pub disabled: Vec<String>,
}

/// Seam to whatever owns hook configuration on disk
#[async_trait]
pub trait HookConfigLoader: Send + Sync {
    async fn load(&self) -> Result<HookSources>;
}

/// Loader over definitions already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    sources: HookSources,
}

impl StaticConfigLoader {
    pub fn new(sources: HookSources) -> Self {
        Self { sources }
    }

    /// Project-tier hooks only
    pub fn project(hooks: HooksConfig) -> Self {
        Self::new(HookSources {
            sources: vec![SourcedHooks::new(ConfigSource::Project, hooks)],
            disabled: Vec::new(),
        })
    }
}

#[async_trait]
impl HookConfigLoader for StaticConfigLoader {
    async fn load(&self) -> Result<HookSources> {
        Ok(self.sources.clone())
    }
}

/// Settings document: only the `hooks` table is read
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    hooks: HooksConfig,
}

/// Read the `hooks` table of a TOML or JSON settings file (by extension)
pub fn load_hooks_file(path: &Path) -> Result<HooksConfig> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read hooks file: {:?}", path))?;

    let settings: SettingsFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .context(format!("Failed to parse JSON hooks file: {:?}", path))?,
        _ => toml::from_str(&content)
            .context(format!("Failed to parse TOML hooks file: {:?}", path))?,
    };

    Ok(settings.hooks)
}

/// Project settings file plus plugin manifests from a plugins directory
#[derive(Debug, Clone, Default)]
pub struct FileConfigLoader {
    pub project_file: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
    pub disabled: Vec<String>,
}

#[async_trait]
impl HookConfigLoader for FileConfigLoader {
    async fn load(&self) -> Result<HookSources> {
        let project_file = self.project_file.clone();
        let plugins_dir = self.plugins_dir.clone();

        let mut sources = tokio::task::spawn_blocking(move || -> Result<Vec<SourcedHooks>> {
            let mut sources = Vec::new();
            if let Some(path) = project_file {
                sources.push(SourcedHooks::new(
                    ConfigSource::Project,
                    load_hooks_file(&path)?,
                ));
            }
            if let Some(dir) = plugins_dir {
                for (manifest, manifest_dir) in discover_plugins(&dir)? {
                    sources.push(SourcedHooks {
                        source: ConfigSource::Extensions,
                        origin: Some(manifest.name.clone()),
                        hooks: manifest.resolved_hooks(&manifest_dir),
                    });
                }
            }
            Ok(sources)
        })
        .await
        .context("Hook config loading task failed")??;

        sources.retain(|s| !s.hooks.is_empty());

        Ok(HookSources {
            sources,
            disabled: self.disabled.clone(),
        })
    }
}
