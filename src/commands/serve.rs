use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::server::{self, AppState};

pub async fn run(config: &AppConfig) -> Result<()> {
    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;

    let state = AppState {
        pipeline: Arc::new(super::build_pipeline(config)?),
        indexer: Arc::new(super::build_indexer(config)?),
    };
    info!(
        backend = config.index.backend.as_str(),
        index = %config.index.name,
        embedding = config.embedding.provider.as_str(),
        "starting server"
    );

    server::serve(state, bind).await
}
