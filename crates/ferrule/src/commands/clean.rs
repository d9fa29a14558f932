//! Clean command: deletes everything a build produced.

use std::path::PathBuf;

use anyhow::Result;

/// Run the clean command.
pub async fn run(root: PathBuf, config_path: PathBuf) -> Result<()> {
    let config = super::build::load_build_config(&root, &config_path)?;

    let removed = ferrule_build::clean(&config)?;

    if removed.is_empty() {
        tracing::info!("Nothing to clean");
    } else {
        tracing::info!("Removed {} directories", removed.len());
    }

    Ok(())
}
