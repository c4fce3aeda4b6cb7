use serde::Serialize;
use tracing::info;

use crate::types::{AppConfig, FeedMode, StoreMode};

#[derive(Serialize)]
struct StartupLog<'a> {
    event: &'a str,
    feed_mode: &'a str,
    store_mode: &'a str,
    interval_secs: u64,
    control_addr: &'a str,
}

pub fn log_startup(cfg: &AppConfig) {
    let feed_mode = match cfg.feed.mode {
        FeedMode::Http => "http",
        FeedMode::Fixture => "fixture",
    };
    let store_mode = match cfg.engine.store {
        StoreMode::Postgres => "postgres",
        StoreMode::Memory => "memory",
    };
    let payload = StartupLog {
        event: "startup",
        feed_mode,
        store_mode,
        interval_secs: cfg.engine.interval_secs,
        control_addr: &cfg.engine.control_addr,
    };
    info!(target: "bot", startup = serde_json::to_string(&payload).unwrap_or_default().as_str());
}
