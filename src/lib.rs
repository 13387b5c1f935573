// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod metrics;
pub mod records;
pub mod tagging;

use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tracing::info;

pub use crate::api::router;
pub use crate::config::TaggingConfig;
pub use crate::tagging::{RuntimeState, TagKind};

use crate::api::AppState;
use crate::tagging::{smart_sync, HttpCatalog, RuleCatalog};

/// Load config, sync rules (catalog → rules file → cached catalog) and build
/// the full router including `/metrics`. Also returns the shared tagger so
/// the caller can attach background tasks.
pub async fn app_with_state() -> anyhow::Result<(Router, Arc<RuntimeState>)> {
    // Install the recorder first so the initial reload is counted.
    let metrics = crate::metrics::Metrics::global()?;
    let config = TaggingConfig::load()?;
    let catalog = HttpCatalog::from_config(&config.catalog)?;
    let tagger = Arc::new(RuntimeState::new(config));

    let outcome = smart_sync(
        &tagger,
        catalog.as_ref().map(|c| c as &dyn RuleCatalog),
        false,
    )
    .await
    .context("initial rule sync")?;
    info!(
        target: "tagging",
        source = ?outcome.source,
        rules = outcome.rules_count,
        skipped = outcome.failures.len(),
        "tagging rules loaded"
    );

    let router = api::router(AppState::new(tagger.clone())).merge(metrics.router());
    Ok((router, tagger))
}

/// Router only; see [`app_with_state`].
pub async fn app() -> anyhow::Result<Router> {
    app_with_state().await.map(|(router, _)| router)
}
