//!
//! This is the command-line front end of the Ren evaluator.
//!
#![warn(missing_docs)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use clap::Parser;
#[cfg(feature = "jemalloc")]
use jemallocator::Jemalloc;
use ren_core::UniverseConfig;
use ren_interpreter::universe::Universe;

mod shell;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Environment variable holding the log filter, as in `REN_LOG=debug` or `REN_LOG=ren_interpreter=trace`.
const LOG_LEVEL_VAR: &str = "REN_LOG";

#[derive(Debug, Clone, PartialEq, Parser)]
#[clap(about, author, version)]
struct Options {
    /// Script to run.
    file: Option<PathBuf>,

    /// Arguments for the script, as `system/options/args`.
    args: Vec<String>,

    /// Code to evaluate, instead of a script.
    #[clap(long, short)]
    eval: Option<String>,

    /// Enable verbose output (with timing information).
    #[clap(short = 'v', long)]
    verbose: bool,

    /// Log every evaluation step.
    #[clap(long)]
    trace: bool,

    /// Maximum number of nested calls.
    #[clap(long)]
    stack_limit: Option<usize>,
}

/// The log filter used when `REN_LOG` isn't set.
fn default_directive(opts: &Options) -> &'static str {
    match (opts.trace, opts.verbose) {
        (true, _) => "trace",
        (false, true) => "info",
        (false, false) => "warn",
    }
}

/// Installs the stderr subscriber. `REN_LOG` takes `RUST_LOG`-style directives and wins over the flags.
fn init_logging(opts: &Options) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_LEVEL_VAR).unwrap_or_else(|_| EnvFilter::new(default_directive(opts)));
    // `try_init` also routes records from the `log` facade, which the library crates log through.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_level(true))
        .with(filter)
        .try_init();
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let opts = Options::parse();
    init_logging(&opts);

    let mut config = UniverseConfig::default().with_env_overrides()?;
    if let Some(limit) = opts.stack_limit {
        config.stack_limit = limit;
    }
    config.trace = opts.trace;
    config.verbose = opts.verbose;
    config.script = opts.file.clone();
    config.args = opts.args.clone();

    let mut universe = Universe::boot(config)?;

    let outcome = match (&opts.eval, &opts.file) {
        (Some(code), _) => universe.run(code).map(drop).map_err(|err| anyhow!("{}", err)),
        (None, Some(file)) => universe.run_file(file).map(drop),
        (None, None) => shell::interactive(&mut universe, opts.verbose),
    };

    let leaked = universe.shutdown();
    if opts.verbose && leaked > 0 {
        eprintln!("{} series were still alive at shutdown", leaked);
    }

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pick_the_log_level() {
        let parse = |args: &[&str]| Options::try_parse_from(args).expect("bad command line");
        assert_eq!(default_directive(&parse(&["ren"])), "warn");
        assert_eq!(default_directive(&parse(&["ren", "-v"])), "info");
        assert_eq!(default_directive(&parse(&["ren", "-v", "--trace"])), "trace");
    }

    #[test]
    fn script_arguments_follow_the_file() {
        let opts = Options::try_parse_from(["ren", "--stack-limit", "64", "demo.reb", "one", "two"]).expect("bad command line");
        assert_eq!(opts.file, Some(PathBuf::from("demo.reb")));
        assert_eq!(opts.args, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(opts.stack_limit, Some(64));
    }
}
