//! Tracing/logging bootstrap for the smoke binary.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,backend_smoke=debug,backend_core=info,backend_mattermost=info";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `MATTERMOST_SMOKE_LOG`
/// 3) `MATTERMOST_LOG`
/// 4) internal default filter
pub fn init() {
    let env_filter = filter_from_lookup(|key| env::var(key).ok());
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_lookup<F>(lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    ["RUST_LOG", "MATTERMOST_SMOKE_LOG", "MATTERMOST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .find_map(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
