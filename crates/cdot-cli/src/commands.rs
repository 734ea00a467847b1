//! Subcommand implementations
//!
//! Each command loads the run configuration, wires the collaborators it
//! names and hands over to the library crates.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use cdot_blocks::{BlockEdit, BlockGraph, BlockKind};
use cdot_commit::{commit_edits, reset_repo, CommitConfig, SideResolver};
use cdot_core::{
    optimize_graph, plan_commits, Analyzer, AnalyzerConfig, AnswerDirectory, CommandAnalyzer, CommitSettings,
    DiffDirectory, DiffEditGenerator, EditGenerator, InstructionGenerator, InstructionRequest, Observer, Orchestrator, ResumeNode, RunConfig, ScriptedAnalyzer,
    ScriptedInstructionGenerator, SequenceEditGenerator,
};
use cdot_graph::{ChangingGraph, Instruction, NodeId, SnapshotStore};
use git2::Repository;
use tracing::info;

fn store(config: &RunConfig) -> SnapshotStore {
    SnapshotStore::new(&config.output_dir, &config.iteration, &config.project)
}

fn analyzer(config: &RunConfig) -> anyhow::Result<Box<dyn Analyzer>> {
    Ok(match &config.analyzer {
        AnalyzerConfig::Command {
            program,
            args,
            working_dir,
            project,
        } => Box::new(CommandAnalyzer::new(
            program.clone(),
            args.clone(),
            working_dir.clone().unwrap_or_else(|| config.project_root.clone()),
            project.clone(),
        )),
        AnalyzerConfig::Scripted { path } => Box::new(ScriptedAnalyzer::from_file(path)?),
    })
}

fn instruction_generator(config: &RunConfig) -> anyhow::Result<Box<dyn InstructionGenerator>> {
    let generators = &config.generators;
    Ok(match (&generators.instructions, &generators.answers) {
        (Some(path), _) => Box::new(ScriptedInstructionGenerator::from_file(path)?),
        (None, Some(dir)) => Box::new(AnswerDirectory::new(dir)),
        (None, None) => Box::new(|request: &InstructionRequest<'_>| -> anyhow::Result<Instruction> {
            bail!("no instruction source configured for `{}`", request.error.text)
        }),
    })
}

fn edit_generator(config: &RunConfig) -> anyhow::Result<Box<dyn EditGenerator>> {
    let generators = &config.generators;
    Ok(match (&generators.edits, &generators.diffs) {
        (Some(path), _) => Box::new(SequenceEditGenerator::from_file(path)?),
        (None, Some(dir)) => Box::new(DiffEditGenerator::new(DiffDirectory::new(dir))),
        (None, None) => Box::new(|instruction: &Instruction, _: &BlockGraph| -> anyhow::Result<BlockEdit> {
            bail!("no edit source configured for block {}", instruction.block_id)
        }),
    })
}

/// Orchestrator over a fresh index of the configured sources
pub(crate) fn orchestrator(config: &RunConfig) -> anyhow::Result<Orchestrator> {
    let files = config.source_files()?;
    let blocks = BlockGraph::build(&files)?;
    info!(files = files.len(), blocks = blocks.node_count(), "indexed sources");
    Ok(Orchestrator::new(
        blocks,
        analyzer(config)?,
        instruction_generator(config)?,
        edit_generator(config)?,
    )
    .with_observer(Observer::new(store(config))?)
    .with_restrictions(config.restrictions.clone())
    .with_retry(config.retry.policy())
    .with_goal(config.goal.clone())
    .with_revert_on_finish(config.revert_on_finish))
}

fn latest_graph(config: &RunConfig) -> anyhow::Result<ChangingGraph> {
    let store = store(config);
    let snapshot = store
        .load_latest()?
        .ok_or_else(|| anyhow!("no snapshot found for iteration {}", config.iteration))?;
    info!(step = snapshot.step, nodes = snapshot.nodes.len(), "loaded snapshot");
    Ok(ChangingGraph::from_snapshot(&snapshot)?)
}

fn summary(graph: &ChangingGraph) -> String {
    let counts = graph.count_node_types();
    format!(
        "{} problems, {} solutions, {} unsolvable problems, {} rejected solutions, {} layers",
        counts.problems,
        counts.solutions,
        counts.error_problems,
        counts.error_solutions,
        graph.get_number_of_layers()
    )
}

/// Run the loop from the configured initial change, or from the analyzer,
/// then optimize the resulting graph
pub(crate) fn resolve(config_path: &Path) -> anyhow::Result<String> {
    let config = RunConfig::load(config_path)?;
    let mut orchestrator = orchestrator(&config)?;
    match &config.initial_change {
        Some(initial) => orchestrator.run_from_error(initial.to_compile_error())?,
        None => orchestrator.run_from_analyzer()?,
    }
    orchestrator.optimize()?;
    Ok(summary(orchestrator.graph()))
}

/// Restart a node of the latest snapshot and optimize the result
pub(crate) fn resume(config_path: &Path, node: Option<u64>) -> anyhow::Result<String> {
    let config = RunConfig::load(config_path)?;
    let resume = resume_target(config.resume.clone(), node)?;
    let graph = latest_graph(&config)?;
    let mut orchestrator = orchestrator(&config)?.with_graph(graph);
    orchestrator.resume_problem_node(resume.node, resume.error, resume.instruction, resume.edits)?;
    orchestrator.optimize()?;
    Ok(summary(orchestrator.graph()))
}

fn resume_target(configured: Option<ResumeNode>, node: Option<u64>) -> anyhow::Result<ResumeNode> {
    match (configured, node) {
        (Some(mut resume), Some(id)) => {
            resume.node = NodeId(id);
            Ok(resume)
        }
        (Some(resume), None) => Ok(resume),
        (None, Some(id)) => Ok(ResumeNode {
            node: NodeId(id),
            error: None,
            instruction: None,
            edits: None,
        }),
        (None, None) => bail!("no node to resume: pass --node or add a [resume] section"),
    }
}

/// Merge cycles and drop redundant edges of the latest snapshot
pub(crate) fn optimize(config_path: &Path) -> anyhow::Result<String> {
    let config = RunConfig::load(config_path)?;
    let mut graph = latest_graph(&config)?;
    let mut observer = Observer::new(store(&config))?;
    optimize_graph(&mut graph, &mut observer)?;
    Ok(summary(&graph))
}

fn commit_config(settings: &CommitSettings) -> CommitConfig {
    let config = CommitConfig::new(&settings.branch, &settings.author_name, &settings.author_email);
    match &settings.reset_branch {
        Some(branch) => config.with_reset_branch(branch),
        None => config,
    }
}

/// Replay the latest snapshot's handled solutions as commits
pub(crate) fn commit(config_path: &Path, mut resolver: SideResolver, reset: bool) -> anyhow::Result<String> {
    let config = RunConfig::load(config_path)?;
    let settings = config
        .commit
        .as_ref()
        .ok_or_else(|| anyhow!("{} has no [commit] section", config_path.display()))?;
    let commit_config = commit_config(settings);
    let repo = Repository::open(&settings.repo_path)
        .with_context(|| format!("opening repository {}", settings.repo_path.display()))?;

    if reset {
        reset_repo(&repo, &commit_config)?;
        return Ok(format!("checked out {}", commit_config.reset_branch()));
    }

    let mut graph = latest_graph(&config)?;
    let edit_sets = plan_commits(&mut graph, &mut Observer::detached())?;
    let replay = commit_edits(&repo, &edit_sets, &commit_config, &mut resolver)?;
    Ok(format!(
        "{} commits on {}, {} empty edit sets skipped",
        replay.commits.len(),
        commit_config.branch,
        replay.skipped
    ))
}

/// Parse a block kind name
pub(crate) fn parse_kind(name: &str) -> anyhow::Result<BlockKind> {
    BlockKind::ALL
        .into_iter()
        .find(|k| k.name() == name)
        .ok_or_else(|| anyhow!("unknown block kind {name}"))
}

/// List the blocks of some files
pub(crate) fn blocks(files: &[PathBuf], kind: Option<BlockKind>, json: bool) -> anyhow::Result<String> {
    let graph = BlockGraph::build(files)?;
    let mut selected: Vec<_> = graph.nodes().filter(|b| kind.map_or(true, |k| b.kind == k)).collect();
    selected.sort_by_key(|b| b.id);
    if json {
        return Ok(serde_json::to_string_pretty(&selected)?);
    }
    Ok(selected
        .iter()
        .map(|b| {
            format!(
                "{:>5} {:<11} {}:{}-{}",
                b.id.0,
                b.kind.name(),
                b.file.display(),
                b.start.row + 1,
                b.end.row + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}
