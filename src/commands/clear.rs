use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ClearArgs;
use crate::config::AppConfig;

pub async fn run(config: &AppConfig, args: ClearArgs) -> Result<()> {
    if !args.yes {
        bail!(
            "refusing to delete every vector in index '{}' without --yes",
            config.index.name
        );
    }

    let indexer = super::build_indexer(config)?;
    let before = indexer.stats().await?.vector_count;
    indexer.clear().await?;
    info!(index = %config.index.name, removed = before, "clear complete");
    Ok(())
}
