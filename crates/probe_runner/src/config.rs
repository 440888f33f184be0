//! Container configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bind mount from the host into the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path to mount
    pub source: PathBuf,
    /// Container path to mount to
    pub target: String,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    pub fn new(source: PathBuf, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// One tool invocation: image, arguments, environment and mounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image to use
    pub image: String,
    /// Image tag (default: latest)
    pub tag: String,
    /// Arguments passed to the image entrypoint
    pub command: Vec<String>,
    /// Working directory inside container
    pub workdir: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Volume mounts
    pub mounts: Vec<MountConfig>,
    /// Whether to remove container after execution
    pub auto_remove: bool,
    /// Container name prefix, used to tell concurrent test runs apart
    pub name_prefix: Option<String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: "latest".to_string(),
            command: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
            mounts: Vec::new(),
            auto_remove: true,
            name_prefix: None,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Append arguments to the command line.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy the named variables from the host environment when they are set.
    pub fn env_from_host<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if let Ok(value) = std::env::var(key) {
                self.env.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Get the full image name with tag.
    pub fn full_image(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Command line joined with spaces, for logs and mock matching.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Per-invocation limits. A zero timeout waits indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub timeout_seconds: u64,
    /// Pull the image first when it is missing locally
    pub pull_image: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            pull_image: true,
        }
    }
}

impl RunConfig {
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Skip the image check, for callers that already ran
    /// [`ContainerRunner::ensure_image`](crate::ContainerRunner::ensure_image).
    pub fn no_pull(mut self) -> Self {
        self.pull_image = false;
        self
    }
}

/// Images for the tools the harness drives.
pub struct ToolImages;

impl ToolImages {
    pub const TERRAFORM: &'static str = "hashicorp/terraform";
    pub const TERRAFORM_TAG: &'static str = "1.6";

    pub const AWS_CLI: &'static str = "amazon/aws-cli";
    pub const AWS_CLI_TAG: &'static str = "latest";

    pub fn terraform() -> ContainerConfig {
        ContainerConfig::new(Self::TERRAFORM).tag(Self::TERRAFORM_TAG)
    }

    pub fn aws_cli() -> ContainerConfig {
        ContainerConfig::new(Self::AWS_CLI).tag(Self::AWS_CLI_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_builder() {
        let config = ContainerConfig::new("hashicorp/terraform")
            .tag("1.6")
            .workdir("/workspace")
            .env("TF_IN_AUTOMATION", "1")
            .args(["apply", "-auto-approve"]);

        assert_eq!(config.full_image(), "hashicorp/terraform:1.6");
        assert_eq!(config.workdir, Some("/workspace".to_string()));
        assert_eq!(config.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
        assert_eq!(config.command_line(), "apply -auto-approve");
    }

    #[test]
    fn test_env_from_host_skips_unset() {
        let config = ContainerConfig::new("amazon/aws-cli")
            .env_from_host(["STACKPROBE_TEST_SURELY_UNSET_VARIABLE"]);
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_mount_config() {
        let mount = MountConfig::new(PathBuf::from("/home/ci/.aws"), "/root/.aws").read_only();

        assert!(mount.read_only);
        assert_eq!(mount.target, "/root/.aws");
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default().timeout(30).no_pull();
        assert_eq!(config.timeout_seconds, 30);
        assert!(!config.pull_image);
        assert!(RunConfig::default().pull_image);
    }

    #[test]
    fn test_tool_images() {
        assert_eq!(ToolImages::terraform().full_image(), "hashicorp/terraform:1.6");
        assert_eq!(ToolImages::aws_cli().full_image(), "amazon/aws-cli:latest");
    }
}
