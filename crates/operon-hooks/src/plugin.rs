use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::HooksConfig;

/// Placeholder in plugin hook commands for the manifest directory
pub const PLUGIN_ROOT_VAR: &str = "${PLUGIN_ROOT}";

/// Plugin manifest (parsed from plugin.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Hooks contributed at the extensions tier
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl PluginManifest {
    /// Load manifest from plugin.toml file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read plugin manifest: {:?}", path))?;
        let manifest: Self =
            toml::from_str(&content).context(format!("Failed to parse manifest: {:?}", path))?;
        Ok(manifest)
    }

    /// Hooks with `type` defaulted to `plugin`, owner filled in and
    /// `${PLUGIN_ROOT}` expanded to the manifest directory
    pub fn resolved_hooks(&self, manifest_dir: &Path) -> HooksConfig {
        let root = manifest_dir.to_string_lossy();
        let mut hooks = self.hooks.clone();
        for def in hooks
            .events
            .values_mut()
            .flat_map(|groups| groups.iter_mut())
            .flat_map(|group| group.hooks.iter_mut())
        {
            if def.kind.is_none() {
                def.kind = Some("plugin".to_string());
            }
            if def.plugin.is_none() {
                def.plugin = Some(self.name.clone());
            }
            if let Some(command) = &def.command {
                def.command = Some(command.replace(PLUGIN_ROOT_VAR, &root));
            }
        }
        hooks
    }
}

/// Discover plugins by walking a directory for plugin.toml files
pub fn discover_plugins(plugin_dir: &Path) -> Result<Vec<(PluginManifest, PathBuf)>> {
    let mut plugins = Vec::new();

    if !plugin_dir.exists() {
        return Ok(plugins);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(plugin_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    // read_dir order is platform-defined; ingestion order must be stable
    entries.sort();

    for dir in entries {
        let manifest_path = dir.join("plugin.toml");
        if manifest_path.exists() {
            match PluginManifest::load(&manifest_path) {
                Ok(manifest) => {
                    plugins.push((manifest, dir));
                }
                Err(e) => {
                    tracing::warn!(path = ?manifest_path, error = %e, "Skipping invalid plugin");
                }
            }
        }
    }

    Ok(plugins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_manifest_and_resolve_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("scanner");
        std::fs::create_dir(&plugin_dir).unwrap();
        let manifest_path = plugin_dir.join("plugin.toml");
        let mut f = std::fs::File::create(&manifest_path).unwrap();
        write!(
            f,
            r#"
name = "scanner"
version = "1.0.0"
description = "Secret scanner"

[[hooks.BeforeTool]]
matcher = "write_file"

[[hooks.BeforeTool.hooks]]
command = "${{PLUGIN_ROOT}}/scan.sh"
"#
        )
        .unwrap();

        let manifest = PluginManifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.name, "scanner");

        let hooks = manifest.resolved_hooks(&plugin_dir);
        let def = &hooks.events["BeforeTool"][0].hooks[0];
        assert_eq!(def.kind.as_deref(), Some("plugin"));
        assert_eq!(def.plugin.as_deref(), Some("scanner"));
        assert_eq!(
            def.command.as_deref(),
            Some(format!("{}/scan.sh", plugin_dir.display()).as_str())
        );

        let plugins = discover_plugins(dir.path()).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].1, plugin_dir);
    }

    #[test]
    fn test_invalid_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("broken");
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.toml"), "name = 3").unwrap();

        let plugins = discover_plugins(dir.path()).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_discover_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = discover_plugins(dir.path()).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_discover_nonexistent_dir() {
        let plugins = discover_plugins(Path::new("/nonexistent")).unwrap();
        assert!(plugins.is_empty());
    }
}
