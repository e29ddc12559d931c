use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigSource, HookConfig, HookDef, HookSources};
use crate::error::HookError;
use crate::events::HookEventName;
use crate::planner::Matcher;

/// A validated hook placed in the context of its event, source and group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEntry {
    pub event: HookEventName,
    pub source: ConfigSource,
    /// Plugin name for extension hooks
    pub origin: Option<String>,
    pub matcher: Option<Matcher>,
    pub sequential: bool,
    pub hook: HookConfig,
}

#[derive(Debug, Default)]
struct Catalog {
    entries: HashMap<HookEventName, Vec<RegistryEntry>>,
    rejected: Vec<HookError>,
}

/// Catalog of configured hooks, built once and read-only afterwards
#[derive(Debug, Default)]
pub struct HookRegistry {
    catalog: OnceLock<Catalog>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            catalog: OnceLock::new(),
        }
    }

    /// Ingest hook definitions. Only the first call has any effect, also
    /// when several callers race; returns whether this call did the work.
    pub fn initialize(&self, sources: HookSources) -> bool {
        let mut performed = false;
        self.catalog.get_or_init(|| {
            performed = true;
            ingest(sources)
        });
        performed
    }

    pub fn is_initialized(&self) -> bool {
        self.catalog.get().is_some()
    }

    /// Entries for one event, highest precedence first
    pub fn groups(&self, event: HookEventName) -> &[RegistryEntry] {
        self.catalog
            .get()
            .and_then(|c| c.entries.get(&event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check if any hooks are registered for an event
    pub fn has_hooks(&self, event: HookEventName) -> bool {
        !self.groups(event).is_empty()
    }

    /// Every entry, grouped by event in declaration order of `HookEventName`
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        HookEventName::ALL
            .into_iter()
            .flat_map(move |event| self.groups(event).iter())
    }

    /// Definitions discarded during ingestion
    pub fn rejected(&self) -> &[HookError] {
        self.catalog
            .get()
            .map(|c| c.rejected.as_slice())
            .unwrap_or(&[])
    }

    /// Validate one raw definition
    pub fn validate(def: &HookDef) -> Result<HookConfig, HookError> {
        HookConfig::try_from(def)
    }
}

fn ingest(input: HookSources) -> Catalog {
    let mut catalog = Catalog::default();

    for sourced in input.sources {
        for (event_name, groups) in &sourced.hooks.events {
            let event = match event_name.parse::<HookEventName>() {
                Ok(event) => event,
                Err(e) => {
                    warn!(source = sourced.source.as_str(), error = %e, "Discarding hooks for unknown event");
                    catalog.rejected.push(e);
                    continue;
                }
            };

            for group in groups {
                let matcher = Matcher::compile(group.matcher.as_deref());
                for def in &group.hooks {
                    let hook = match HookRegistry::validate(def) {
                        Ok(hook) => hook,
                        Err(e) => {
                            warn!(
                                source = sourced.source.as_str(),
                                event = %event,
                                error = %e,
                                "Discarding invalid hook"
                            );
                            catalog.rejected.push(e);
                            continue;
                        }
                    };

                    if input.disabled.iter().any(|d| d == &hook.command) {
                        debug!(command = %hook.command, event = %event, "Hook disabled");
                        continue;
                    }

                    catalog.entries.entry(event).or_default().push(RegistryEntry {
                        event,
                        source: sourced.source,
                        origin: sourced.origin.clone(),
                        matcher: matcher.clone(),
                        sequential: group.sequential,
                        hook,
                    });
                }
            }
        }
    }

    // Stable: equal priorities keep ingestion order
    for entries in catalog.entries.values_mut() {
        entries.sort_by_key(|e| e.source.priority());
    }

    info!(
        hooks = catalog.entries.values().map(Vec::len).sum::<usize>(),
        rejected = catalog.rejected.len(),
        "Hook registry initialized"
    );

    catalog
}
