use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Warden Configuration

[engine]
enabled = true
timeout_ms = 60000
termination_grace_ms = 5000
# cwd = "~/projects/app"
# transcript_path = "~/.warden/transcripts/current.jsonl"
# plugins_dir = "~/.warden/plugins"
disabled = []

# Block writes outside the project
[[hooks.BeforeTool]]
matcher = "write_file|edit|shell"

[[hooks.BeforeTool.hooks]]
type = "command"
command = "$OPERON_PROJECT_DIR/.warden/hooks/guard.sh"
timeout = 10000

# Add repository context to every prompt
[[hooks.BeforeAgent]]
sequential = true

[[hooks.BeforeAgent.hooks]]
type = "command"
command = "git -C \"$OPERON_PROJECT_DIR\" status --short | head -20"
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}
