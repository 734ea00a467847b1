//! Numbered JSON snapshots of the graph
//!
//! Snapshots are written to `<output>/<iteration>/<step>_<project>.json`,
//! one per handled node, so a run can be inspected step by step and resumed
//! from the last one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::graph::ChangingGraph;
use crate::node::{ChangingNode, NodeId};

/// Serialized form of a [`ChangingGraph`] at one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub step: usize,
    pub project: String,
    pub iteration: String,
    pub created_at: DateTime<Utc>,
    pub next_id: u64,
    pub nodes: Vec<ChangingNode>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub logs: Vec<String>,
}

impl ChangingGraph {
    /// Capture the graph with the log lines of the step
    #[must_use]
    pub fn to_snapshot(&self, step: usize, project: &str, iteration: &str, logs: Vec<String>) -> GraphSnapshot {
        GraphSnapshot {
            step,
            project: project.to_string(),
            iteration: iteration.to_string(),
            created_at: Utc::now(),
            next_id: self.next_id,
            nodes: self.nodes().cloned().collect(),
            edges: self.edges(),
            logs,
        }
    }

    /// Rebuild a graph from a snapshot
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownNode`] when an edge names a missing node
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self, GraphError> {
        let nodes: BTreeMap<NodeId, ChangingNode> =
            snapshot.nodes.iter().map(|n| (n.id, n.clone())).collect();
        let mut edges = DiGraphMap::new();
        for id in nodes.keys() {
            edges.add_node(*id);
        }
        for (from, to) in &snapshot.edges {
            for end in [from, to] {
                if !nodes.contains_key(end) {
                    return Err(GraphError::UnknownNode(*end));
                }
            }
            edges.add_edge(*from, *to, ());
        }
        let highest = nodes.keys().next_back().map_or(0, |id| id.0 + 1);
        Ok(Self {
            nodes,
            edges,
            next_id: snapshot.next_id.max(highest),
        })
    }
}

/// Directory of numbered snapshots for one iteration of one project
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    project: String,
    iteration: String,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(output: impl AsRef<Path>, iteration: impl Into<String>, project: impl Into<String>) -> Self {
        let iteration = iteration.into();
        Self {
            dir: output.as_ref().join(&iteration),
            project: project.into(),
            iteration,
        }
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Path of the snapshot for `step`
    #[must_use]
    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{step}_{}.json", self.project))
    }

    /// Write the graph as snapshot `step`
    ///
    /// # Errors
    /// Returns an I/O or serialization error
    pub fn save(&self, graph: &ChangingGraph, step: usize, logs: Vec<String>) -> Result<PathBuf, GraphError> {
        fs::create_dir_all(&self.dir).map_err(|e| GraphError::io(&self.dir, e))?;
        let snapshot = graph.to_snapshot(step, &self.project, &self.iteration, logs);
        let path = self.path_for(step);
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, json).map_err(|e| GraphError::io(&path, e))?;
        debug!(path = %path.display(), nodes = snapshot.nodes.len(), "graph snapshot saved");
        Ok(path)
    }

    /// Snapshot files of this project, ordered by step
    ///
    /// # Errors
    /// Returns an I/O error other than a missing directory
    pub fn list(&self) -> Result<Vec<(usize, PathBuf)>, GraphError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GraphError::io(&self.dir, e)),
        };

        let suffix = format!("_{}.json", self.project);
        let mut steps = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GraphError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(step) = name.strip_suffix(&suffix).and_then(|s| s.parse::<usize>().ok()) else {
                continue;
            };
            steps.push((step, entry.path()));
        }
        steps.sort();
        Ok(steps)
    }

    /// Step number the next snapshot should use
    ///
    /// # Errors
    /// Returns an I/O error while listing
    pub fn next_step(&self) -> Result<usize, GraphError> {
        Ok(self.list()?.last().map_or(0, |(step, _)| step + 1))
    }

    /// Read one snapshot file
    ///
    /// # Errors
    /// Returns an I/O or deserialization error
    pub fn load(path: &Path) -> Result<GraphSnapshot, GraphError> {
        let json = fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Most recent snapshot, if any
    ///
    /// # Errors
    /// Returns an I/O or deserialization error
    pub fn load_latest(&self) -> Result<Option<GraphSnapshot>, GraphError> {
        match self.list()?.last() {
            Some((_, path)) => Ok(Some(Self::load(path)?)),
            None => Ok(None),
        }
    }
}
