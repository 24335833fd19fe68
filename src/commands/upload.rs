use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::UploadArgs;
use crate::config::AppConfig;
use crate::model::PassageRecord;

pub async fn run(config: &AppConfig, args: UploadArgs) -> Result<()> {
    let records = read_passages(&args.input)?;
    info!(
        input = %args.input.display(),
        passages = records.len(),
        backend = config.index.backend.as_str(),
        index = %config.index.name,
        "upload requested"
    );

    let indexer = super::build_indexer(config)?;
    let summary = indexer.upload(records).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn read_passages(path: &Path) -> Result<Vec<PassageRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_passages(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_passages(raw: &str) -> Result<Vec<PassageRecord>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<PassageRecord>(line)
                .with_context(|| format!("invalid passage on line {}", index + 1))
        })
        .collect()
}
