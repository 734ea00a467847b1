//! Step log and snapshot writer
//!
//! Every message goes to `tracing` and into the current step's log. Saving a
//! step writes the graph together with that log and starts the next step.

use std::path::PathBuf;

use cdot_graph::{ChangingGraph, SnapshotStore};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug)]
pub struct Observer {
    run_id: Uuid,
    store: Option<SnapshotStore>,
    step: usize,
    logs: Vec<String>,
}

impl Observer {
    /// Observer writing into `store`, continuing after its last step
    ///
    /// # Errors
    /// Returns an I/O error when the existing snapshots cannot be listed
    pub fn new(store: SnapshotStore) -> Result<Self> {
        let step = store.next_step()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            store: Some(store),
            step,
            logs: Vec::new(),
        })
    }

    /// Observer that only logs
    #[must_use]
    pub fn detached() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            store: None,
            step: 0,
            logs: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Step the next snapshot will get
    #[inline]
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Messages logged since the last snapshot
    #[inline]
    #[must_use]
    pub fn pending_logs(&self) -> &[String] {
        &self.logs
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(run = %self.run_id, step = self.step, "{message}");
        self.logs.push(format!("{} {message}", Utc::now().format("%H:%M:%S%.3f")));
    }

    /// Log a label followed by the JSON form of `value`
    pub fn log_value<T: Serialize>(&mut self, label: &str, value: &T) {
        let json = serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"));
        self.log(format!("{label} {json}"));
    }

    /// Persist the graph with the step's log and move to the next step
    ///
    /// Without a store the log is simply cleared.
    ///
    /// # Errors
    /// Returns an I/O or serialization error from the store
    pub fn save_graph_state(&mut self, graph: &ChangingGraph) -> Result<Option<PathBuf>> {
        let logs = std::mem::take(&mut self.logs);
        let saved = match &self.store {
            Some(store) => Some(store.save(graph, self.step, logs)?),
            None => None,
        };
        self.step += 1;
        Ok(saved)
    }
}
