use anyhow::Result;
use operon_hooks::HookEventName;

use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    let handler = super::load_handler(config).await?;
    let registry = handler.registry();

    if registry.entries().next().is_none() {
        println!("No hooks configured.");
        return Ok(());
    }

    for event in HookEventName::ALL {
        let entries = registry.groups(event);
        if entries.is_empty() {
            continue;
        }
        println!("{}:", event);
        for entry in entries {
            let origin = match &entry.origin {
                Some(plugin) => format!("{}:{}", entry.source.as_str(), plugin),
                None => entry.source.as_str().to_string(),
            };
            println!(
                "  [{}] matcher={} sequential={} {}",
                origin,
                entry.matcher.as_ref().map_or("*", |m| m.as_str()),
                entry.sequential,
                entry.hook.command
            );
        }
    }

    Ok(())
}
