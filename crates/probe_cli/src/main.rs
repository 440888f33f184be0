//! stackprobe CLI - Main entry point.
//!
//! Exit codes:
//! - 0: All tests passed
//! - 1: General error
//! - 2: Invalid arguments or suite
//! - 3: Test failures
//! - 4: Leaked resources

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, LogFormat};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const TEST_FAILURE: u8 = 3;
    pub const LEAK_DETECTED: u8 = 4;
}

const DEFAULT_FILTER: &str = "stackprobe=info,probe_=info,warn";
const VERBOSE_FILTER: &str = "stackprobe=debug,probe_=debug,warn";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::List(args) => commands::list::execute(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    });
    let json = cli.log_format == LogFormat::Json;

    // Logs go to stderr so reports on stdout stay machine-readable.
    let log_result = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Suite problems are the caller's to fix; everything else is ours.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let invalid_input = e.chain().any(|cause| {
        cause.is::<probe_spec::SpecError>() || cause.is::<glob::PatternError>()
    });
    if invalid_input {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
