//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};

pub mod list;
pub mod run;
pub mod validate;

/// stackprobe - live infrastructure testing
#[derive(Parser)]
#[command(name = "stackprobe")]
#[command(version, about = "stackprobe - provision, probe, assert and tear down infrastructure")]
#[command(long_about = r#"
stackprobe provisions Terraform stacks, probes the live resources they create,
evaluates checks against them and always tears them down again.

COMMANDS:
  run       → Run the tests of a suite file
  validate  → Lint suite files without provisioning anything
  list      → Show the tests a suite declares

EXIT CODES:
  0 - All tests passed
  1 - General error
  2 - Invalid arguments or suite
  3 - Test failures
  4 - Leaked resources
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a suite against live infrastructure
    Run(run::RunArgs),

    /// Validate suite files
    Validate(validate::ValidateArgs),

    /// List the tests in one or more suites
    List(list::ListArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
