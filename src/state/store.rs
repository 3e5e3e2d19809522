//! File-backed persistence for `BotState`: one JSON document for the live
//! state, one append-only JSON-lines file for fill history.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use super::BotState;
use crate::config::StateConfig;

pub struct FileStore {
    orders_path: PathBuf,
    history_path: PathBuf,
}

impl FileStore {
    pub fn new(cfg: &StateConfig) -> Self {
        Self {
            orders_path: cfg.orders_file.clone(),
            history_path: cfg.history_file.clone(),
        }
    }

    /// Load persisted state, or start fresh when no file exists yet.
    pub fn load(&self) -> Result<BotState> {
        if !self.orders_path.exists() {
            debug!(path = %self.orders_path.display(), "no state file, starting fresh");
            return Ok(BotState::default());
        }
        let raw = std::fs::read_to_string(&self.orders_path)
            .with_context(|| format!("reading state file {}", self.orders_path.display()))?;
        let state: BotState = serde_json::from_str(&raw)
            .with_context(|| format!("parsing state file {}", self.orders_path.display()))?;
        Ok(state)
    }

    /// Append this tick's fills to the history log and rewrite the state
    /// document. Called only after a tick completes fully, so a failed tick
    /// leaves the previous state intact.
    pub fn save(&self, state: &mut BotState) -> Result<()> {
        if !state.pending_history.is_empty() {
            let mut history = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.history_path)
                .with_context(|| {
                    format!("opening history file {}", self.history_path.display())
                })?;
            for order in state.pending_history.drain(..) {
                let line = serde_json::to_string(&order)?;
                writeln!(history, "{line}")?;
            }
        }

        let doc = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.orders_path, doc)
            .with_context(|| format!("writing state file {}", self.orders_path.display()))?;
        Ok(())
    }
}
