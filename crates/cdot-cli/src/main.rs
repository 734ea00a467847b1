use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use cdot_commit::SideResolver;
use tracing::error;

mod commands;
mod logging;

fn config_arg() -> Arg {
    Arg::new("config")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Run configuration (.toml, .yaml or .yml)")
}

fn cli() -> Command {
    Command::new("cdot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Causal-graph driven code migration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Raise the log level (ignored when RUST_LOG is set)"),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve the initial change, or every current error, into an optimized changing graph")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("resume")
                .about("Restart a problem node of the latest snapshot and optimize the result")
                .arg(config_arg())
                .arg(
                    Arg::new("node")
                        .long("node")
                        .value_parser(value_parser!(u64))
                        .help("Node to restart; overrides the [resume] section"),
                ),
        )
        .subcommand(
            Command::new("optimize")
                .about("Merge cycles and remove redundant edges of the latest snapshot")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("commit")
                .about("Replay handled solutions as commits on the configured branch")
                .arg(config_arg())
                .arg(
                    Arg::new("conflicts")
                        .long("conflicts")
                        .value_parser(["ours", "theirs"])
                        .default_value("theirs")
                        .help("Side kept when a replayed edit set conflicts"),
                )
                .arg(
                    Arg::new("reset")
                        .long("reset")
                        .action(ArgAction::SetTrue)
                        .help("Return to the reset branch and delete the replay branches instead"),
                ),
        )
        .subcommand(
            Command::new("blocks")
                .about("List the blocks found in source files")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source files to parse"),
                )
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .value_parser(["import", "class", "method", "constructor", "field"])
                        .help("Only list blocks of this kind"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn config_path(args: &ArgMatches) -> anyhow::Result<&PathBuf> {
    args.get_one::<PathBuf>("config")
        .ok_or_else(|| anyhow::anyhow!("missing configuration path"))
}

fn run(matches: &ArgMatches) -> anyhow::Result<String> {
    match matches.subcommand() {
        Some(("resolve", args)) => commands::resolve(config_path(args)?),
        Some(("resume", args)) => commands::resume(config_path(args)?, args.get_one::<u64>("node").copied()),
        Some(("optimize", args)) => commands::optimize(config_path(args)?),
        Some(("commit", args)) => {
            let resolver = match args.get_one::<String>("conflicts").map(String::as_str) {
                Some("ours") => SideResolver::Ours,
                _ => SideResolver::Theirs,
            };
            commands::commit(config_path(args)?, resolver, args.get_flag("reset"))
        }
        Some(("blocks", args)) => {
            let files: Vec<PathBuf> = args.get_many::<PathBuf>("files").into_iter().flatten().cloned().collect();
            let kind = args
                .get_one::<String>("kind")
                .map(|k| commands::parse_kind(k))
                .transpose()?;
            commands::blocks(&files, kind, args.get_flag("json"))
        }
        Some((other, _)) => anyhow::bail!("unknown command {other}"),
        None => anyhow::bail!("no command given"),
    }
}

fn main() {
    let matches = cli().get_matches();
    logging::init(matches.get_flag("json-logs"), matches.get_count("verbose"));

    match run(&matches) {
        Ok(report) => println!("{report}"),
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
