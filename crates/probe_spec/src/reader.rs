//! Suite file reading utilities.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{SpecError, SpecResult};
use crate::suite::Suite;

/// Reader for suite files.
pub struct SuiteReader;

impl SuiteReader {
    /// Read a suite file, resolving stack directories relative to it.
    pub fn read(path: impl AsRef<Path>) -> SpecResult<Suite> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SpecError::NotFound(path.to_path_buf()));
        }
        debug!("Reading suite from {:?}", path);

        let content = fs::read_to_string(path)?;
        let suite = Self::parse(&content).map_err(|e| SpecError::InvalidFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::rooted(suite, &base))
    }

    /// Parse suite YAML without touching the filesystem.
    pub fn parse(content: &str) -> SpecResult<Suite> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Find every suite file under `dir`.
    ///
    /// Unparseable YAML files are skipped; a directory of mixed YAML is normal.
    pub fn discover(dir: impl AsRef<Path>) -> SpecResult<Vec<(PathBuf, Suite)>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SpecError::NotFound(dir.to_path_buf()));
        }

        let mut suites = Vec::new();
        for entry in WalkDir::new(dir)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !path.is_file() || !is_yaml {
                continue;
            }
            match Self::read(path) {
                Ok(suite) if !suite.tests.is_empty() => suites.push((path.to_path_buf(), suite)),
                Ok(_) => debug!("Skipping {:?}: no tests", path),
                Err(e) => debug!("Skipping invalid suite file {:?}: {}", path, e),
            }
        }

        Ok(suites)
    }

    fn rooted(mut suite: Suite, base: &Path) -> Suite {
        for test in &mut suite.tests {
            test.stack = test.stack.clone().rooted_at(base);
        }
        suite
    }
}
