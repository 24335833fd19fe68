use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::AppConfig;
use crate::util::redact_secret;

pub async fn run(config: &AppConfig, args: StatusArgs) -> Result<()> {
    println!("{}", render_config(config)?);

    if args.skip_index {
        return Ok(());
    }

    let indexer = super::build_indexer(config)?;
    match indexer.stats().await {
        Ok(stats) => info!(
            backend = %stats.backend,
            index = %stats.index_name,
            vectors = stats.vector_count,
            "index status"
        ),
        Err(err) => warn!(error = %format!("{err:#}"), "index status unavailable"),
    }
    Ok(())
}

fn render_config(config: &AppConfig) -> Result<String> {
    let mut redacted = config.clone();
    for key in [
        &mut redacted.chat.api_key,
        &mut redacted.embedding.api_key,
        &mut redacted.index.api_key,
    ] {
        *key = Some(redact_secret(key.as_deref()));
    }

    toml::to_string_pretty(&redacted).context("failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_are_redacted() {
        let mut config = AppConfig::default();
        config.chat.api_key = Some("gsk_live_secret_value".to_string());

        let rendered = render_config(&config).expect("render");

        assert!(!rendered.contains("gsk_live_secret_value"));
        assert!(rendered.contains("gsk_***"));
        assert!(rendered.contains("<unset>"));
        assert!(rendered.contains("[retrieval]"));
    }
}
