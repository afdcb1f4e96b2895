use std::io;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{forecast::ForecastArg, schema::SchemaArg};

mod forecast;
mod schema;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// More log output (-v: debug, -vv: trace); `RUST_LOG` takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train per-store models and write a submission
    Forecast(#[clap(flatten)] ForecastArg),
    /// Show the aligned feature schema of a training and a test file
    Schema(#[clap(flatten)] SchemaArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(args.verbose, args.quiet);
    match &args.mode {
        Mode::Forecast(arg) => forecast::run(arg)?,
        Mode::Schema(arg) => schema::run(arg)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
