//! racegen entrypoint.

mod config;
mod mutate;
mod pipeline;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use pipeline::PipelineArgs;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "racegen", version, about = "Concurrency-bug benchmark synthesizer")]
struct Args {
    /// Source tree of the target program.
    #[arg(long)]
    source: PathBuf,
    /// Recorded thread-line trace log.
    #[arg(long)]
    trace: PathBuf,
    /// Line blacklist accompanying the trace.
    #[arg(long)]
    blacklist: Option<PathBuf>,
    /// Input seed the mutator perturbs per bug.
    #[arg(long = "input-seed")]
    input_seed: PathBuf,
    /// Output directory receiving the injected tree and artifacts.
    #[arg(long)]
    out: PathBuf,
    /// Run configuration (JSON: mutate_num, path_len, bug_num).
    #[arg(long)]
    config: PathBuf,
    /// PRNG seed; identical seeds reproduce byte-identical outputs.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Dominator oracle executable; without it patterns stay single-site.
    #[arg(long = "dom-exe")]
    dom_exe: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let file_appender = tracing_appender::rolling::never(log_dir, "racegen.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_err) => {
            // Global subscriber already installed; drop guard so the writer
            // shuts down.
            None
        }
    }
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    let args = Args::parse();
    info!(
        target: "runtime",
        source = %args.source.display(),
        out = %args.out.display(),
        seed = args.seed,
        "startup"
    );

    let config = config::load_from(&args.config)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let pipeline_args = PipelineArgs {
        source: args.source,
        trace: args.trace,
        blacklist: args.blacklist,
        input_seed: args.input_seed,
        out: args.out,
        dom_exe: args.dom_exe,
    };
    let bugs = pipeline::run(&pipeline_args, &config, &mut rng)?;
    for bug in &bugs {
        println!(
            "bug {}: {} sites, {} schedule entries",
            bug.bug_id,
            bug.iter_sites().count(),
            bug.order.len()
        );
    }
    Ok(())
}
