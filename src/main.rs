use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use del_library::{
    chemistry::{CommandReactor, Reactor},
    complete::ErrorPolicy,
    config::Config,
    library::{enumerate_library, EnumerateOptions, ParallelMode, RunOutcome},
    visualize::DebugMode,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enumerate every library member of an experiment.
    Enumerate(EnumerateArgs),
    /// Only write the catalog reaction graphs.
    Graph {
        /// Experiment configuration (YAML).
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct EnumerateArgs {
    /// Experiment configuration (YAML).
    config: PathBuf,

    /// What to do with combinations whose reactions cannot be resolved.
    #[arg(long, value_enum, default_value_t = ErrorPolicy::Raise)]
    errors: ErrorPolicy,

    /// Stop after writing the catalog reaction graphs.
    #[arg(long)]
    graph_only: bool,

    /// Restrict enumeration to these building-block positions.
    #[arg(long, num_args = 1..)]
    building_blocks: Option<Vec<String>>,

    /// Which per-combination reaction graphs to write.
    #[arg(long, value_enum, default_value_t = DebugMode::Off)]
    debug: DebugMode,

    /// Replace an existing library.
    #[arg(long)]
    overwrite: bool,

    /// Parallelization strategy over combinations.
    #[arg(long, value_enum, default_value_t = ParallelMode::None)]
    parallel: ParallelMode,

    /// Helper program applying reaction templates (JSON lines over stdio).
    #[arg(long)]
    reactor: Option<String>,

    /// Argument passed to the reactor program; may be repeated.
    #[arg(long = "reactor-arg", allow_hyphen_values = true)]
    reactor_args: Vec<String>,
}

fn run(
    config_path: &Path,
    reactor: Option<&dyn Reactor>,
    options: &EnumerateOptions,
) -> Result<()> {
    let config = Config::from_path(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    match enumerate_library(&config, reactor, options)? {
        RunOutcome::Skipped(path) => println!("library {} exists", path.display()),
        RunOutcome::GraphsOnly(dir) => println!("{}", dir.display()),
        RunOutcome::Written { path, records } => {
            println!("{records} records -> {}", path.display())
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Graph { config } => {
            let options = EnumerateOptions {
                graph_only: true,
                ..Default::default()
            };
            run(&config, None, &options)
        }
        Commands::Enumerate(args) => {
            let options = EnumerateOptions {
                errors: args.errors,
                graph_only: args.graph_only,
                building_block_ids: args.building_blocks,
                debug: args.debug,
                overwrite: args.overwrite,
                parallel: args.parallel,
            };
            let reactor = args
                .reactor
                .as_deref()
                .map(|program| CommandReactor::spawn(program, args.reactor_args.as_slice()))
                .transpose()
                .context("starting the reactor")?;
            run(
                &args.config,
                reactor.as_ref().map(|r| r as &dyn Reactor),
                &options,
            )
        }
    }
}
