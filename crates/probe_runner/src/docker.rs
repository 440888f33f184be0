//! Docker implementation of ContainerRunner.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::abandon::AbandonGuard;
use crate::config::{ContainerConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ContainerRunner, ExecutionResult};

/// Docker-based container runner.
pub struct DockerRunner {
    client: Docker,
}

impl DockerRunner {
    /// Connect to the local Docker daemon.
    pub async fn new() -> RunnerResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| RunnerError::RuntimeNotAvailable(e.to_string()))?;

        client
            .ping()
            .await
            .map_err(|e| RunnerError::RuntimeNotAvailable(e.to_string()))?;

        Ok(Self { client })
    }

    /// Connect to a Docker daemon over HTTP.
    pub async fn with_host(host: &str) -> RunnerResult<Self> {
        let client = Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)?;
        client.ping().await?;
        Ok(Self { client })
    }

    fn container_name(prefix: Option<&str>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix.unwrap_or("stackprobe"), &id[..8])
    }

    async fn collect_logs(&self, container_id: &str) -> (String, String) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();

        let mut stream = self.client.logs(container_id, Some(options));
        while let Some(result) = stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Log stream for {} ended early: {}", container_id, e);
                    break;
                }
            }
        }

        (stdout, stderr)
    }

    async fn remove(&self, container_id: &str) {
        force_remove(&self.client, container_id).await;
    }

    /// Arms removal of `container_id` in case the run future is dropped.
    fn removal_guard(&self, container_id: &str) -> AbandonGuard<impl FnOnce()> {
        let client = self.client.clone();
        let container_id = container_id.to_string();
        AbandonGuard::new(move || {
            warn!("Run in {} abandoned, removing container", container_id);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { force_remove(&client, &container_id).await });
                }
                Err(_) => warn!("No runtime left to remove container {}", container_id),
            }
        })
    }

    async fn image_exists(&self, full_image: &str) -> RunnerResult<bool> {
        match self.client.inspect_image(full_image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull(&self, image: &str, tag: &str) -> RunnerResult<()> {
        info!("Pulling image {}:{}", image, tag);

        let options = CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RunnerError::ImagePullFailed {
                        image: format!("{}:{}", image, tag),
                        reason: e.to_string(),
                    })
                }
            }
        }

        Ok(())
    }
}

async fn force_remove(client: &Docker, container_id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    if let Err(e) = client.remove_container(container_id, Some(options)).await {
        warn!("Failed to remove container {}: {}", container_id, e);
    }
}

#[async_trait]
impl ContainerRunner for DockerRunner {
    async fn ensure_image(&self, image: &str, tag: &str) -> RunnerResult<()> {
        if self.image_exists(&format!("{}:{}", image, tag)).await? {
            return Ok(());
        }
        self.pull(image, tag).await
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let full_image = config.full_image();
        let container_name = Self::container_name(config.name_prefix.as_deref());
        let started = Instant::now();

        debug!(
            "Running {} in {} ({})",
            config.command_line(),
            container_name,
            full_image
        );

        if run_config.pull_image {
            self.ensure_image(&config.image, &config.tag).await?;
        }

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.to_string_lossy().to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        // Removal happens manually once the logs have been read.
        let host_config = HostConfig {
            mounts: Some(mounts),
            auto_remove: Some(false),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(full_image.clone()),
            cmd: if config.command.is_empty() {
                None
            } else {
                Some(config.command.clone())
            },
            working_dir: config.workdir.clone(),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container_id = self
            .client
            .create_container(Some(create_options), container_config)
            .await?
            .id;
        let guard = self.removal_guard(&container_id);

        self.client
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await?;

        let wait_future = async {
            let mut wait_stream = self
                .client
                .wait_container(&container_id, None::<WaitContainerOptions<String>>);

            match wait_stream.next().await {
                Some(Ok(exit)) => Ok(exit.status_code),
                // bollard reports non-zero exits as an error carrying the code
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
                Some(Err(e)) => Err(RunnerError::ExecutionFailed(e.to_string())),
                None => Err(RunnerError::ExecutionFailed("Container wait failed".into())),
            }
        };

        let exit_code = if run_config.timeout_seconds > 0 {
            match timeout(Duration::from_secs(run_config.timeout_seconds), wait_future).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "Container {} exceeded {}s, stopping",
                        container_name, run_config.timeout_seconds
                    );
                    let _ = self.client.stop_container(&container_id, None).await;
                    self.remove(&container_id).await;
                    guard.complete();
                    return Err(RunnerError::Timeout(run_config.timeout_seconds));
                }
            }
        } else {
            wait_future.await?
        };

        let (stdout, stderr) = self.collect_logs(&container_id).await;

        let duration_ms = started.elapsed().as_millis() as u64;

        if config.auto_remove {
            self.remove(&container_id).await;
        }
        guard.complete();

        Ok(ExecutionResult {
            container_id,
            exit_code,
            stdout,
            stderr,
            duration_ms,
        })
    }
}
