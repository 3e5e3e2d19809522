use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ladder_bot::config::Config;
use ladder_bot::engine::manager::OrderManager;
use ladder_bot::exec::replay::{ReplayService, load_bars};
use ladder_bot::report;
use ladder_bot::state::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Basic logging: set RUST_LOG=info (or debug) to see output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path: PathBuf = env::args()
        .nth(1)
        .context("usage: ladder_bot <config.toml>")?
        .into();
    let cfg = Config::load(&config_path)?;

    let store = FileStore::new(&cfg.state);
    let state = store.load()?;

    let bars = load_bars(&cfg.replay.bars_file)?;
    let service = ReplayService::from_config(bars, &cfg.replay)?;
    let mut manager = OrderManager::new(cfg.ladder.clone(), service, state);

    let mut ticks: u64 = 0;
    loop {
        manager.run().await?;
        store.save(manager.state_mut())?;

        ticks += 1;
        if cfg.replay.max_ticks.is_some_and(|max| ticks >= max) {
            tracing::info!(ticks, "tick limit reached");
            break;
        }
        if !manager.service_mut().advance()? {
            tracing::info!(ticks, "bar history exhausted");
            break;
        }
    }

    report::log_metrics(manager.state());
    Ok(())
}
