//! Validate command - Lint suite files without provisioning anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use probe_spec::{SuiteReader, SuiteValidator};

use crate::ExitCodes;

#[derive(Args)]
pub struct ValidateArgs {
    /// Suite files, or directories to search for them
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

pub async fn execute(args: ValidateArgs) -> Result<u8> {
    let mut all_passed = true;
    let mut checked = 0;

    for path in &args.paths {
        let files = if path.is_dir() {
            SuiteReader::discover(path)?
                .into_iter()
                .map(|(file, _)| file)
                .collect()
        } else {
            vec![path.clone()]
        };

        for file in files {
            checked += 1;
            info!("Validating {:?}", file);
            println!("📋 {}", file.display());

            let suite = match SuiteReader::read(&file) {
                Ok(suite) => suite,
                Err(e) => {
                    all_passed = false;
                    println!("   ❌ {}", e);
                    continue;
                }
            };

            let result = SuiteValidator::validate(&suite);
            let failed = !result.valid || (args.strict && !result.warnings.is_empty());

            if failed {
                all_passed = false;
                println!("   ❌ Suite '{}' failed validation:", suite.name);
                for error in &result.errors {
                    println!("      - {}", error);
                }
            } else {
                println!("   ✅ Suite '{}' ({} tests)", suite.name, suite.tests.len());
            }

            for warning in &result.warnings {
                println!("   ⚠️  {}", warning);
            }
        }
    }

    println!();
    if checked == 0 {
        println!("⚠️  No suite files found");
        return Ok(ExitCodes::INVALID_ARGS);
    }
    if all_passed {
        println!("✅ All suites valid");
        Ok(ExitCodes::SUCCESS)
    } else {
        println!("❌ Some suites are invalid. Please fix the issues above.");
        Ok(ExitCodes::INVALID_ARGS)
    }
}
