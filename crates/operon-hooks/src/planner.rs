use std::collections::HashSet;

use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::events::HookEventName;
use crate::registry::{HookRegistry, RegistryEntry};

/// Ordered, deduplicated work list for one event fire
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub event: HookEventName,
    pub entries: Vec<RegistryEntry>,
    /// True when any contributing group asked for sequential execution
    pub sequential: bool,
}

/// What group matchers are tested against
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchContext<'a> {
    pub subject: Option<&'a str>,
}

impl<'a> MatchContext<'a> {
    pub fn subject(subject: &'a str) -> Self {
        Self {
            subject: Some(subject),
        }
    }
}

#[derive(Debug, Default)]
pub struct HookPlanner;

impl HookPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build the plan for one fire; None when no hook applies
    pub fn plan(
        &self,
        registry: &HookRegistry,
        event: HookEventName,
        context: MatchContext<'_>,
    ) -> Option<ExecutionPlan> {
        let mut seen = HashSet::new();
        let entries: Vec<RegistryEntry> = registry
            .groups(event)
            .iter()
            .filter(|entry| {
                entry
                    .matcher
                    .as_ref()
                    .map_or(true, |m| m.is_match(context.subject))
            })
            .filter(|entry| seen.insert(entry.hook.command.as_str()))
            .cloned()
            .collect();

        if entries.is_empty() {
            return None;
        }

        let sequential = entries.iter().any(|e| e.sequential);
        debug!(
            event = %event,
            hooks = entries.len(),
            sequential,
            "Planned hook execution"
        );

        Some(ExecutionPlan {
            event,
            entries,
            sequential,
        })
    }
}

/// Group matcher, compiled once when the registry ingests its group.
/// Unanchored regex match, exact equality when the pattern does not compile.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: String,
    regex: Option<Regex>,
}

impl Matcher {
    /// None for an absent, empty or `*` matcher: those match everything
    pub fn compile(raw: Option<&str>) -> Option<Self> {
        let pattern = match raw.map(str::trim) {
            None | Some("") | Some("*") => return None,
            Some(p) => p,
        };
        let regex = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                debug!(matcher = pattern, error = %e, "Invalid matcher regex, comparing literally");
                None
            }
        };
        Some(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// A fire without a subject passes every matcher
    pub fn is_match(&self, subject: Option<&str>) -> bool {
        let Some(subject) = subject else {
            return true;
        };
        match &self.regex {
            Some(re) => re.is_match(subject),
            None => self.pattern == subject,
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, HookDef, HookGroupDef, HookSources, HooksConfig, SourcedHooks};

    fn group(matcher: Option<&str>, sequential: bool, commands: &[&str]) -> HookGroupDef {
        HookGroupDef {
            matcher: matcher.map(str::to_string),
            sequential,
            hooks: commands
                .iter()
                .map(|c| HookDef {
                    kind: Some("command".to_string()),
                    command: Some(c.to_string()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn registry(sources: Vec<(ConfigSource, Vec<HookGroupDef>)>) -> HookRegistry {
        let registry = HookRegistry::new();
        registry.initialize(HookSources {
            sources: sources
                .into_iter()
                .map(|(source, groups)| {
                    let mut hooks = HooksConfig::default();
                    hooks.events.insert("BeforeTool".to_string(), groups);
                    SourcedHooks::new(source, hooks)
                })
                .collect(),
            disabled: vec![],
        });
        registry
    }

    fn commands(plan: &ExecutionPlan) -> Vec<&str> {
        plan.entries.iter().map(|e| e.hook.command.as_str()).collect()
    }

    #[test]
    fn test_empty_matcher_matches_everything() {
        for matcher in [None, Some(""), Some("*")] {
            let registry = registry(vec![(ConfigSource::Project, vec![group(matcher, false, &["a"])])]);
            let plan = HookPlanner::new()
                .plan(&registry, HookEventName::BeforeTool, MatchContext::subject("anything"))
                .unwrap();
            assert_eq!(commands(&plan), vec!["a"]);
        }
    }

    #[test]
    fn test_regex_matcher_filters_by_subject() {
        let registry = registry(vec![(
            ConfigSource::Project,
            vec![
                group(Some("write_.*|edit"), false, &["writes"]),
                group(Some("^shell$"), false, &["shell"]),
            ],
        )]);
        let planner = HookPlanner::new();

        let plan = planner
            .plan(&registry, HookEventName::BeforeTool, MatchContext::subject("write_file"))
            .unwrap();
        assert_eq!(commands(&plan), vec!["writes"]);

        assert!(planner
            .plan(&registry, HookEventName::BeforeTool, MatchContext::subject("read_file"))
            .is_none());
    }

    #[test]
    fn test_invalid_regex_degrades_to_equality() {
        let matcher = Matcher::compile(Some("tool([")).unwrap();
        assert!(matcher.regex.is_none());
        assert!(matcher.is_match(Some("tool([")));
        assert!(!matcher.is_match(Some("tool")));
    }

    #[test]
    fn test_no_subject_passes_every_matcher() {
        let matcher = Matcher::compile(Some("^shell$")).unwrap();
        assert!(matcher.is_match(None));
        assert!(!matcher.is_match(Some("shell_exec")));
    }

    #[test]
    fn test_matchers_compiled_at_ingestion() {
        assert!(Matcher::compile(Some(" * ")).is_none());

        let registry = registry(vec![(
            ConfigSource::Project,
            vec![group(Some(" ^shell$ "), false, &["a"]), group(Some("*"), false, &["b"])],
        )]);
        let entries = registry.groups(HookEventName::BeforeTool);
        let matcher = entries[0].matcher.as_ref().unwrap();
        assert_eq!(matcher.as_str(), "^shell$");
        assert!(matcher.regex.is_some());
        assert!(entries[1].matcher.is_none());
        assert_eq!(
            serde_json::to_value(&entries[0].matcher).unwrap(),
            serde_json::json!("^shell$")
        );
    }

    #[test]
    fn test_dedup_keeps_highest_priority() {
        let registry = registry(vec![
            (ConfigSource::Extensions, vec![group(None, true, &["same", "ext-only"])]),
            (ConfigSource::Project, vec![group(None, false, &["same"])]),
        ]);
        let plan = HookPlanner::new()
            .plan(&registry, HookEventName::BeforeTool, MatchContext::default())
            .unwrap();

        assert_eq!(commands(&plan), vec!["same", "ext-only"]);
        assert_eq!(plan.entries[0].source, ConfigSource::Project);
        // The surviving extension entry still escalates the plan
        assert!(plan.sequential);
    }

    #[test]
    fn test_parallel_unless_some_group_is_sequential() {
        let registry = registry(vec![(
            ConfigSource::Project,
            vec![group(None, false, &["a"]), group(Some("other"), true, &["b"])],
        )]);
        let planner = HookPlanner::new();

        let plan = planner
            .plan(&registry, HookEventName::BeforeTool, MatchContext::subject("shell"))
            .unwrap();
        assert!(!plan.sequential);

        let plan = planner
            .plan(&registry, HookEventName::BeforeTool, MatchContext::subject("other"))
            .unwrap();
        assert!(plan.sequential);
    }

    #[test]
    fn test_no_groups_no_plan() {
        let registry = registry(vec![]);
        assert!(HookPlanner::new()
            .plan(&registry, HookEventName::AfterModel, MatchContext::default())
            .is_none());
    }
}
