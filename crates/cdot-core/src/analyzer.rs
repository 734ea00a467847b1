//! Compile error sources
//!
//! The loop never compiles anything itself. An [`Analyzer`] reports the
//! current errors of the working tree and whether it still parses.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use cdot_blocks::{same_file, BlockGraph};
use cdot_graph::{CompileError, ErrorPosition};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::RestrictionOptions;

/// Source of compile errors for the working tree
#[cfg_attr(test, mockall::automock)]
pub trait Analyzer {
    /// Errors of the project as it is on disk
    ///
    /// `scope` lists the files the caller just touched; implementations may
    /// use it to narrow the check and are free to ignore it.
    ///
    /// # Errors
    /// Returns an error when the analyzer cannot run
    fn get_compile_errors(&mut self, scope: &[PathBuf]) -> anyhow::Result<Vec<CompileError>>;

    /// Whether any indexed file fails to parse
    ///
    /// # Errors
    /// Returns an error when the files cannot be read
    fn has_syntax_errors(&mut self, graph: &BlockGraph) -> anyhow::Result<bool> {
        Ok(graph.has_syntax_errors()?)
    }
}

/// Keep the first error reported on each line of each file
#[must_use]
pub fn dedup_by_line(errors: Vec<CompileError>) -> Vec<CompileError> {
    let mut seen = HashSet::new();
    errors
        .into_iter()
        .filter(|e| seen.insert((e.file.clone(), e.position.start_row)))
        .collect()
}

impl RestrictionOptions {
    /// Drop errors outside the allowed file and projects
    #[must_use]
    pub fn filter(&self, errors: Vec<CompileError>) -> Vec<CompileError> {
        if errors.is_empty() || self.is_unrestricted() {
            return errors;
        }
        let total = errors.len();
        let kept: Vec<_> = errors
            .into_iter()
            .filter(|e| self.single_file.as_deref().map_or(true, |f| same_file(&e.file, f)))
            .filter(|e| self.project.as_ref().map_or(true, |p| &e.project == p))
            .filter(|e| !self.project_blacklist.contains(&e.project))
            .collect();
        debug!(total, kept = kept.len(), "restricted compile errors");
        kept
    }
}

/// Replays fixed error lists, one per call, starting over after the last
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnalyzer {
    responses: Vec<Vec<CompileError>>,
    calls: usize,
}

impl ScriptedAnalyzer {
    #[must_use]
    pub fn new(responses: Vec<Vec<CompileError>>) -> Self {
        Self { responses, calls: 0 }
    }

    /// Load the error lists from a JSON array of arrays
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let responses = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(responses))
    }

    /// Number of times errors were requested
    #[inline]
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn get_compile_errors(&mut self, _scope: &[PathBuf]) -> anyhow::Result<Vec<CompileError>> {
        if self.responses.is_empty() {
            return Ok(Vec::new());
        }
        let errors = self.responses[self.calls % self.responses.len()].clone();
        self.calls += 1;
        Ok(errors)
    }
}

/// `Cart.cs(18,5): error CS0246: The type 'X' could not be found [Shop.csproj]`
static MSBUILD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<file>[^()\r\n]+)\((?P<line>\d+),(?P<col>\d+)\):\s*error\s*(?:[A-Za-z]+\d+)?:\s*(?P<msg>.*?)(?:\s+\[(?P<project>[^\]]+)\])?\s*$",
    )
    .expect("valid msbuild pattern")
});

/// `cart.py:18:5: error: Name "x" is not defined` or `cart.py:18: error: ...`
static COLON_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<file>[^:\r\n]+):(?P<line>\d+):(?:(?P<col>\d+):)?\s*error:\s*(?P<msg>.+?)\s*$")
        .expect("valid colon pattern")
});

/// Runs a build or check command and parses errors from its output
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    project: String,
}

impl CommandAnalyzer {
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            project: project.into(),
        }
    }

    /// Parse compiler output, one error per matching line
    ///
    /// Lines and columns in the output are one-based; positions are stored
    /// zero-based. Relative file names are resolved against the working
    /// directory.
    #[must_use]
    pub fn parse_output(&self, output: &str) -> Vec<CompileError> {
        output.lines().filter_map(|line| self.parse_line(line)).collect()
    }

    fn parse_line(&self, line: &str) -> Option<CompileError> {
        let caps = MSBUILD_LINE.captures(line).or_else(|| COLON_LINE.captures(line))?;
        let row = caps["line"].parse::<usize>().ok()?.saturating_sub(1);
        let column = caps
            .name("col")
            .and_then(|c| c.as_str().parse::<usize>().ok())
            .map_or(0, |c| c.saturating_sub(1));
        let file = PathBuf::from(caps["file"].trim());
        let file = if file.is_relative() {
            self.working_dir.join(file)
        } else {
            file
        };
        let project = caps
            .name("project")
            .and_then(|p| Path::new(p.as_str()).file_stem())
            .map_or_else(|| self.project.clone(), |p| p.to_string_lossy().into_owned());
        Some(CompileError::new(
            caps["msg"].to_string(),
            file,
            project,
            ErrorPosition::new(row, column, row, column),
        ))
    }
}

impl Analyzer for CommandAnalyzer {
    fn get_compile_errors(&mut self, _scope: &[PathBuf]) -> anyhow::Result<Vec<CompileError>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .output()
            .with_context(|| format!("running {}", self.program))?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let errors = self.parse_output(&text);
        debug!(program = %self.program, status = ?output.status.code(), errors = errors.len(), "analyzer ran");
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn error(file: &str, row: usize, project: &str) -> CompileError {
        CompileError::new("boom", file, project, ErrorPosition::new(row, 0, row, 0))
    }

    #[test]
    fn dedup_keeps_first_error_per_line() {
        let errors = vec![error("A.cs", 1, "p"), error("A.cs", 1, "q"), error("B.cs", 1, "p"), error("A.cs", 2, "p")];
        let kept = dedup_by_line(errors);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].project, "p");
    }

    #[test]
    fn restrictions_filter_file_and_projects() {
        let errors = vec![error("A.cs", 0, "app"), error("B.cs", 0, "app"), error("A.cs", 1, "tests")];
        let only_a = RestrictionOptions {
            single_file: Some(PathBuf::from("A.cs")),
            ..Default::default()
        };
        assert_eq!(only_a.filter(errors.clone()).len(), 2);

        let blacklist = RestrictionOptions {
            project_blacklist: vec!["tests".into()],
            ..Default::default()
        };
        assert_eq!(blacklist.filter(errors.clone()).len(), 2);

        let project = RestrictionOptions {
            project: Some("tests".into()),
            ..Default::default()
        };
        assert_eq!(project.filter(errors).len(), 1);
    }

    #[test]
    fn scripted_analyzer_cycles() {
        let mut analyzer = ScriptedAnalyzer::new(vec![vec![], vec![error("A.cs", 0, "p")]]);
        assert!(analyzer.get_compile_errors(&[]).unwrap().is_empty());
        assert_eq!(analyzer.get_compile_errors(&[]).unwrap().len(), 1);
        assert!(analyzer.get_compile_errors(&[]).unwrap().is_empty());
        assert_eq!(analyzer.calls(), 3);
    }

    #[test]
    fn parses_msbuild_and_colon_output() {
        let analyzer = CommandAnalyzer::new("true", Vec::new(), "/work", "shop");
        let output = "\
Build started\n\
Cart.cs(18,5): error CS0246: The type 'DistinctId' could not be found [/work/Shop.csproj]\n\
src/cart.py:3: error: Name \"x\" is not defined  [name-defined]\n\
/abs/lib.rs:10:2: error: expected item\n\
warning: unused\n";
        let errors = analyzer.parse_output(output);
        assert_eq!(errors.len(), 3);

        assert_eq!(errors[0].file, PathBuf::from("/work/Cart.cs"));
        assert_eq!(errors[0].position, ErrorPosition::new(17, 4, 17, 4));
        assert_eq!(errors[0].project, "Shop");
        assert_eq!(errors[0].text, "The type 'DistinctId' could not be found");

        assert_eq!(errors[1].file, PathBuf::from("/work/src/cart.py"));
        assert_eq!(errors[1].position.start_row, 2);
        assert_eq!(errors[1].project, "shop");

        assert_eq!(errors[2].file, PathBuf::from("/abs/lib.rs"));
        assert_eq!(errors[2].position, ErrorPosition::new(9, 1, 9, 1));
    }

    #[test]
    fn mocked_analyzer_defaults_are_replaceable() {
        let mut mock = MockAnalyzer::new();
        mock.expect_get_compile_errors().times(1).returning(|_| Ok(Vec::new()));
        mock.expect_has_syntax_errors().returning(|_| Ok(true));
        assert!(mock.get_compile_errors(&[]).unwrap().is_empty());
        assert!(mock.has_syntax_errors(&BlockGraph::new()).unwrap());
    }

    proptest! {
        #[test]
        fn dedup_leaves_one_error_per_line(rows in proptest::collection::vec((0usize..3, 0usize..5), 0..40)) {
            let errors: Vec<_> = rows.iter().map(|(f, r)| error(&format!("F{f}.cs"), *r, "p")).collect();
            let kept = dedup_by_line(errors.clone());
            let lines: HashSet<_> = errors.iter().map(|e| (e.file.clone(), e.position.start_row)).collect();
            prop_assert_eq!(kept.len(), lines.len());
            let mut rest = errors.iter();
            for e in &kept {
                prop_assert!(rest.any(|x| x == e));
            }
        }
    }
}
