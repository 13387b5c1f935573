//! Meeting tagger service: binary entrypoint.
//! Boots the Axum HTTP server with the tagging engine, hot reload and cache housekeeping.

use shuttle_axum::ShuttleAxum;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meeting_tagger::tagging::{spawn_cache_housekeeping, start_hot_reload_thread};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - TAGGING_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("TAGGING_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tagging=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let (router, tagger) = meeting_tagger::app_with_state()
        .await
        .map_err(shuttle_runtime::Error::Custom)?;

    // No-op unless TAGGING_HOT_RELOAD=1 in a dev environment.
    start_hot_reload_thread(tagger.clone());

    let every = Duration::from_secs(tagger.config().cache.prune_interval_secs);
    spawn_cache_housekeeping(tagger, every);

    Ok(router.into())
}
