//! Run configuration
//!
//! One file describes a migration run: where the project lives, the error
//! that starts it, which analyzer to ask, how hard to retry and where the
//! snapshots go. TOML and YAML are accepted, chosen by extension. Relative
//! paths are resolved against the directory holding the configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cdot_blocks::{BlockEdit, Language};
use cdot_graph::{CompileError, ErrorPosition, Instruction, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OrchestratorError, Result};
use crate::retry::RetryPolicy;

fn default_output() -> PathBuf {
    PathBuf::from(".cdot")
}

fn default_true() -> bool {
    true
}

fn default_project() -> String {
    "initial".to_string()
}

/// Complete description of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name grouping the snapshots of this attempt
    pub iteration: String,
    /// Project name used in snapshot file names
    pub project: String,
    /// What the migration is for, kept in the logs
    #[serde(default)]
    pub goal: String,
    /// Root of the source tree
    pub project_root: PathBuf,
    /// Source files to index; empty means every supported file under the root
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Snapshot directory
    #[serde(default = "default_output")]
    pub output_dir: PathBuf,
    /// Restore the working tree when the run ends
    #[serde(default = "default_true")]
    pub revert_on_finish: bool,
    #[serde(default)]
    pub initial_change: Option<InitialChange>,
    #[serde(default)]
    pub restrictions: RestrictionOptions,
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub generators: GeneratorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub commit: Option<CommitSettings>,
    #[serde(default)]
    pub resume: Option<ResumeNode>,
}

/// The error that seeds the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialChange {
    pub error: String,
    pub file: PathBuf,
    /// `[start_row, start_column, end_row, end_column]`
    pub position: [usize; 4],
    #[serde(default = "default_project")]
    pub project: String,
}

impl InitialChange {
    #[must_use]
    pub fn to_compile_error(&self) -> CompileError {
        let [sr, sc, er, ec] = self.position;
        CompileError::new(
            self.error.clone(),
            self.file.clone(),
            self.project.clone(),
            ErrorPosition::new(sr, sc, er, ec),
        )
    }
}

/// Which analyzer errors the run is allowed to act on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionOptions {
    #[serde(default)]
    pub single_file: Option<PathBuf>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub project_blacklist: Vec<String>,
}

impl RestrictionOptions {
    #[inline]
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.single_file.is_none() && self.project.is_none() && self.project_blacklist.is_empty()
    }
}

/// How compile errors are obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzerConfig {
    /// Run a command and parse its output
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Defaults to the project root
        #[serde(default)]
        working_dir: Option<PathBuf>,
        /// Project name attached to errors that do not carry one
        #[serde(default = "default_project")]
        project: String,
    },
    /// Replay error lists from a JSON file
    Scripted { path: PathBuf },
}

/// Where instructions and edits come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// JSON memory of instructions keyed by error text or node id
    #[serde(default)]
    pub instructions: Option<PathBuf>,
    /// Directory of `<node id>.txt` answers, used when `instructions` is unset
    #[serde(default)]
    pub answers: Option<PathBuf>,
    /// JSON list of edits handed out in order
    #[serde(default)]
    pub edits: Option<PathBuf>,
    /// Directory of `<block id>.diff` files, used when `edits` is unset
    #[serde(default)]
    pub diffs: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per problem; unset means unbounded
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Commit replay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSettings {
    pub branch: String,
    pub repo_path: PathBuf,
    #[serde(default)]
    pub reset_branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
}

/// Restart a node with new input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeNode {
    pub node: NodeId,
    #[serde(default)]
    pub error: Option<CompileError>,
    #[serde(default)]
    pub instruction: Option<Instruction>,
    #[serde(default)]
    pub edits: Option<Vec<BlockEdit>>,
}

impl RunConfig {
    /// Read a configuration file, resolve its paths and validate it
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Config`] for unknown extensions, parse
    /// failures and missing paths
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let mut config: Self = match extension {
            "toml" => toml::from_str(&text).map_err(|e| OrchestratorError::config(path, e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&text).map_err(|e| OrchestratorError::config(path, e.to_string()))?
            }
            other => {
                return Err(OrchestratorError::config(
                    path,
                    format!("unsupported configuration format {other:?}"),
                ))
            }
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate(path)?;
        debug!(config = %path.display(), project = %config.project, "configuration loaded");
        Ok(config)
    }

    /// Make every relative path absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.project_root);
        join(&mut self.output_dir);
        for file in &mut self.files {
            join(file);
        }
        if let Some(initial) = &mut self.initial_change {
            join(&mut initial.file);
        }
        if let Some(file) = &mut self.restrictions.single_file {
            join(file);
        }
        match &mut self.analyzer {
            AnalyzerConfig::Command { working_dir, .. } => {
                if let Some(dir) = working_dir {
                    join(dir);
                }
            }
            AnalyzerConfig::Scripted { path } => join(path),
        }
        let generators = &mut self.generators;
        for file in [
            &mut generators.instructions,
            &mut generators.answers,
            &mut generators.edits,
            &mut generators.diffs,
        ]
        .into_iter()
        .flatten()
        {
            join(file);
        }
        if let Some(commit) = &mut self.commit {
            join(&mut commit.repo_path);
        }
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        if !self.project_root.is_dir() {
            return Err(OrchestratorError::config(
                origin,
                format!("project root {} is not a directory", self.project_root.display()),
            ));
        }
        let mut required: Vec<&Path> = self.files.iter().map(PathBuf::as_path).collect();
        if let Some(initial) = &self.initial_change {
            required.push(&initial.file);
        }
        if let AnalyzerConfig::Scripted { path } = &self.analyzer {
            required.push(path);
        }
        if let Some(missing) = required.into_iter().find(|p| !p.exists()) {
            return Err(OrchestratorError::config(
                origin,
                format!("{} does not exist", missing.display()),
            ));
        }
        Ok(())
    }

    /// Files to index in the block graph
    ///
    /// The explicit list when one is given, otherwise every file under the
    /// project root with a supported extension, skipping hidden directories
    /// and the snapshot directory.
    ///
    /// # Errors
    /// Returns an I/O error while walking the tree
    pub fn source_files(&self) -> Result<Vec<PathBuf>> {
        if !self.files.is_empty() {
            return Ok(self.files.clone());
        }
        let mut out = Vec::new();
        let mut pending = vec![self.project_root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| OrchestratorError::io(&dir, e))?;
            for entry in entries {
                let path = entry.map_err(|e| OrchestratorError::io(&dir, e))?.path();
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if hidden || path == self.output_dir {
                    continue;
                }
                if path.is_dir() {
                    pending.push(path);
                } else if Language::from_path(&path).is_some() {
                    out.push(path);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
iteration = "first"
project = "shop"
goal = "rename DistinctId"
project_root = "src"

[initial_change]
error = "DistinctId does not exist"
file = "src/Cart.cs"
position = [17, 0, 17, 0]

[restrictions]
project_blacklist = ["Tests"]

[analyzer]
kind = "command"
program = "dotnet"
args = ["build"]

[retry]
max_attempts = 3
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/Cart.cs"), "class Cart {}\n").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "ignored\n").unwrap();
        dir
    }

    #[test]
    fn toml_config_resolves_relative_paths() {
        let dir = project();
        let path = dir.path().join("run.toml");
        fs::write(&path, TOML).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.project_root, dir.path().join("src"));
        assert_eq!(config.output_dir, dir.path().join(".cdot"));
        assert!(config.revert_on_finish);
        assert_eq!(config.restrictions.project_blacklist, vec!["Tests".to_string()]);
        assert_eq!(config.retry.policy().max_attempts, Some(3));

        let error = config.initial_change.as_ref().unwrap().to_compile_error();
        assert_eq!(error.position, ErrorPosition::new(17, 0, 17, 0));
        assert_eq!(error.project, "initial");
        assert_eq!(error.file, dir.path().join("src/Cart.cs"));
    }

    #[test]
    fn generator_directories_resolve_against_the_config() {
        let dir = project();
        let path = dir.path().join("run.toml");
        let text = format!("{TOML}\n[generators]\nanswers = \"answers\"\ndiffs = \"diffs\"\n");
        fs::write(&path, text).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.generators.answers, Some(dir.path().join("answers")));
        assert_eq!(config.generators.diffs, Some(dir.path().join("diffs")));
        assert_eq!(config.generators.edits, None);
    }

    #[test]
    fn yaml_config_is_accepted() {
        let dir = project();
        let path = dir.path().join("run.yaml");
        fs::write(
            &path,
            "iteration: a\nproject: b\nproject_root: src\nanalyzer:\n  kind: scripted\n  path: src/Cart.cs\n",
        )
        .unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert!(matches!(config.analyzer, AnalyzerConfig::Scripted { .. }));
        assert!(config.restrictions.is_unrestricted());
        assert_eq!(config.retry.policy().max_attempts, None);
    }

    #[test]
    fn missing_initial_file_is_rejected() {
        let dir = project();
        let path = dir.path().join("run.toml");
        fs::write(&path, TOML.replace("src/Cart.cs", "src/Missing.cs")).unwrap();
        let err = RunConfig::load(&path).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = project();
        let path = dir.path().join("run.ini");
        fs::write(&path, TOML).unwrap();
        assert!(matches!(RunConfig::load(&path), Err(OrchestratorError::Config { .. })));
    }

    #[test]
    fn source_files_walks_supported_extensions() {
        let dir = project();
        let path = dir.path().join("run.toml");
        fs::write(&path, TOML).unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.source_files().unwrap(), vec![dir.path().join("src/Cart.cs")]);
    }
}
