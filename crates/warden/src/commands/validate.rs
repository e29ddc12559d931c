use anyhow::Result;

use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    let handler = super::load_handler(config).await?;
    let registry = handler.registry();
    let rejected = registry.rejected();

    for error in rejected {
        println!("rejected: {}", error);
    }

    if !rejected.is_empty() {
        anyhow::bail!("{} hook definition(s) rejected", rejected.len());
    }

    println!("{} hook(s) valid.", registry.entries().count());
    Ok(())
}
