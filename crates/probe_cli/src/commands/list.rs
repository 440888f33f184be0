//! List command - Show the tests a suite declares.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use probe_spec::{Suite, SuiteReader};

use super::OutputFormat;
use crate::ExitCodes;

#[derive(Args)]
pub struct ListArgs {
    /// Suite file, or directory to search for suite files
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Only list tests whose name matches this glob, or that carry it as a tag
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output format (text, json)
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct TestEntry {
    suite: String,
    name: String,
    directory: PathBuf,
    checks: usize,
    tags: Vec<String>,
}

pub async fn execute(args: ListArgs) -> Result<u8> {
    let suites = load(&args.path)?;
    let pattern = args
        .filter
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;

    let entries = entries(suites, pattern.as_ref());

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No tests found");
            }
            let mut current = None;
            for entry in &entries {
                if current != Some(&entry.suite) {
                    println!("📦 {}", entry.suite);
                    current = Some(&entry.suite);
                }
                let tags = if entry.tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", entry.tags.join(", "))
                };
                println!(
                    "   • {} ({} checks, {}){}",
                    entry.name,
                    entry.checks,
                    entry.directory.display(),
                    tags
                );
            }
        }
    }

    Ok(ExitCodes::SUCCESS)
}

fn load(path: &Path) -> Result<Vec<Suite>> {
    if path.is_dir() {
        Ok(SuiteReader::discover(path)?
            .into_iter()
            .map(|(_, suite)| suite)
            .collect())
    } else {
        Ok(vec![SuiteReader::read(path)?])
    }
}

fn entries(suites: Vec<Suite>, pattern: Option<&glob::Pattern>) -> Vec<TestEntry> {
    suites
        .into_iter()
        .map(|suite| match pattern {
            Some(pattern) => suite.filtered(pattern),
            None => suite,
        })
        .flat_map(|suite| {
            let name = suite.name;
            suite.tests.into_iter().map(move |test| TestEntry {
                suite: name.clone(),
                name: test.name,
                directory: test.stack.directory,
                checks: test.checks.len(),
                tags: test.tags,
            })
        })
        .collect()
}
