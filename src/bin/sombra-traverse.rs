//! Binary entry point for replaying recorded traversals.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sombra_traverse::{
    error::ErrorWithCode,
    profile::profile_snapshot,
    Bytecode, MemoryGraph, TraversalConfig, TraversalError, TraversalSource, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sombra-traverse",
    version,
    about = "Replay recorded traversal bytecode against a graph file",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SOMBRA_TRAVERSAL_CONFIG",
        help = "TOML file with execution settings"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for results"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Load a graph, replay bytecode against it, and print the results")]
    Run {
        #[arg(long, value_name = "FILE", help = "Graph file in JSON lines format")]
        graph: Option<PathBuf>,
        #[arg(long, value_name = "FILE", help = "Bytecode in wire form")]
        bytecode: PathBuf,
        #[arg(long, value_name = "FILE", help = "Write the graph here after the run")]
        save: Option<PathBuf>,
    },
    #[command(about = "Show how the strategy set rewrites a traversal")]
    Explain {
        #[arg(long, value_name = "FILE", help = "Bytecode in wire form")]
        bytecode: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = run() {
        match err.downcast_ref::<TraversalError>() {
            Some(traversal) => eprintln!("error: {}", ErrorWithCode(traversal)),
            None => eprintln!("error: {err}"),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            graph,
            bytecode,
            save,
        } => {
            let g = TraversalSource::new(Arc::new(MemoryGraph::new())).with_config(config);
            if let Some(path) = graph {
                g.read(&path)?.iterate()?;
            }
            let bytecode = load_bytecode(&bytecode)?;
            let results = g.replay(&bytecode)?.to_list()?;
            emit(cli.format, &results)?;
            if let Some(path) = save {
                g.write(&path)?.iterate()?;
            }
            if let Some(profile) = profile_snapshot(false) {
                tracing::info!(?profile, "traversal.cli.profile");
            }
        }
        Command::Explain { bytecode } => {
            let g = TraversalSource::new(Arc::new(MemoryGraph::new())).with_config(config);
            let bytecode = load_bytecode(&bytecode)?;
            println!("{}", g.replay(&bytecode)?.explain()?);
        }
    }
    Ok(())
}

fn load_config(explicit: Option<&PathBuf>) -> Result<TraversalConfig, Box<dyn Error>> {
    let config = match explicit {
        Some(path) => TraversalConfig::load(path)?,
        None => TraversalConfig::discover()?,
    };
    Ok(config)
}

fn load_bytecode(path: &Path) -> Result<Bytecode, Box<dyn Error>> {
    let file = File::open(path).map_err(|err| format!("{}: {err}", path.display()))?;
    Ok(Bytecode::from_reader(BufReader::new(file))?)
}

fn emit(format: OutputFormat, results: &[Value]) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Text => {
            for value in results {
                println!("{value}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
    }
    Ok(())
}
