//! AWS control-plane lookups through the AWS CLI.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use probe_runner::{ContainerConfig, ContainerRunner, MountConfig, RunConfig, ToolImages};
use probe_spec::ResourceKind;

use crate::descriptor::{
    BucketDescriptor, InstanceDescriptor, NetworkDescriptor, PublicAccessBlock,
    ResourceDescriptor, SecurityGroupDescriptor, SecurityGroupRule,
};
use crate::error::{CloudError, CloudResult};
use crate::provider::ProviderApi;

/// Error markers meaning the resource does not exist.
const NOT_FOUND_MARKERS: &[&str] = &["NoSuchBucket", "(404)", "Not Found", ".NotFound"];

/// Error markers worth another attempt.
const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "SlowDown",
    "RequestTimeout",
    "ServiceUnavailable",
    "InternalError",
    "(500)",
    "(503)",
    "Could not connect to the endpoint URL",
    "Connection was closed",
    "Read timeout on endpoint URL",
];

/// How AWS CLI containers are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCliSettings {
    pub image: String,
    pub tag: String,
    pub timeout_seconds: u64,
    /// Host environment variables forwarded into the container
    pub pass_env: Vec<String>,
    /// Host credentials directory mounted read-only at `/root/.aws`
    pub aws_config_dir: Option<PathBuf>,
}

impl Default for AwsCliSettings {
    fn default() -> Self {
        Self {
            image: ToolImages::AWS_CLI.to_string(),
            tag: ToolImages::AWS_CLI_TAG.to_string(),
            timeout_seconds: 120,
            pass_env: [
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_SESSION_TOKEN",
                "AWS_PROFILE",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            aws_config_dir: None,
        }
    }
}

impl AwsCliSettings {
    pub fn with_image(mut self, image: impl Into<String>, tag: impl Into<String>) -> Self {
        self.image = image.into();
        self.tag = tag.into();
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_aws_config(mut self, dir: impl Into<PathBuf>) -> Self {
        self.aws_config_dir = Some(dir.into());
        self
    }
}

/// Classify a failed CLI call from its error output.
pub fn classify(kind: ResourceKind, id: &str, output: &str) -> CloudError {
    if NOT_FOUND_MARKERS.iter().any(|m| output.contains(m)) {
        CloudError::NotFound {
            kind,
            id: id.to_string(),
        }
    } else if TRANSIENT_MARKERS.iter().any(|m| output.contains(m)) {
        CloudError::Transient(output.trim().to_string())
    } else {
        CloudError::Provider(output.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublicAccessBlockResponse {
    public_access_block_configuration: PublicAccessBlockConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PublicAccessBlockConfiguration {
    block_public_acls: bool,
    ignore_public_acls: bool,
    block_public_policy: bool,
    restrict_public_buckets: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptionResponse {
    server_side_encryption_configuration: EncryptionConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EncryptionConfiguration {
    rules: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    instance_type: String,
    state: InstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
    #[serde(default)]
    ip_permissions: Vec<IpPermission>,
    #[serde(default)]
    ip_permissions_egress: Vec<IpPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpPermission {
    ip_protocol: String,
    from_port: Option<i32>,
    to_port: Option<i32>,
    #[serde(default)]
    ip_ranges: Vec<IpRange>,
    #[serde(default)]
    ipv6_ranges: Vec<Ipv6Range>,
    #[serde(default)]
    user_id_group_pairs: Vec<GroupPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpRange {
    cidr_ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ipv6Range {
    cidr_ipv6: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupPair {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVpcs {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    vpc_id: String,
    cidr_block: String,
}

impl IpPermission {
    fn rules(self, direction: &str) -> Vec<SecurityGroupRule> {
        let protocol = match self.ip_protocol.as_str() {
            "-1" => "all".to_string(),
            other => other.to_string(),
        };
        // AWS reports -1 for "every port / type" on icmp rules.
        let port = |p: Option<i32>| p.and_then(|p| u16::try_from(p).ok());
        let (from_port, to_port) = (port(self.from_port), port(self.to_port));

        self.ip_ranges
            .into_iter()
            .map(|r| r.cidr_ip)
            .chain(self.ipv6_ranges.into_iter().map(|r| r.cidr_ipv6))
            .chain(self.user_id_group_pairs.into_iter().map(|g| g.group_id))
            .map(|cidr| SecurityGroupRule {
                direction: direction.to_string(),
                protocol: protocol.clone(),
                from_port,
                to_port,
                cidr,
            })
            .collect()
    }
}

/// [`ProviderApi`] that shells out to `aws` in a container.
pub struct AwsCliApi {
    runner: Arc<dyn ContainerRunner>,
    settings: AwsCliSettings,
}

impl AwsCliApi {
    pub fn new(runner: Arc<dyn ContainerRunner>, settings: AwsCliSettings) -> Self {
        Self { runner, settings }
    }

    fn container(&self, region: &str, args: &[&str]) -> ContainerConfig {
        let mut config = ContainerConfig::new(&self.settings.image)
            .tag(&self.settings.tag)
            .env("AWS_PAGER", "")
            .env("AWS_REGION", region)
            .env_from_host(&self.settings.pass_env)
            .args(["--region", region, "--output", "json"])
            .args(args.iter().copied());

        if let Some(dir) = &self.settings.aws_config_dir {
            if dir.is_dir() {
                config = config.mount(MountConfig::new(dir.clone(), "/root/.aws").read_only());
            }
        }
        config
    }

    /// Run one CLI call; a non-zero exit comes back as its combined output.
    async fn call(&self, region: &str, args: &[&str]) -> CloudResult<Result<String, String>> {
        debug!("aws {}", args.join(" "));
        let run_config = RunConfig::default().timeout(self.settings.timeout_seconds);

        let result = match self
            .runner
            .run_container(&self.container(region, args), &run_config)
            .await
        {
            Ok(result) => result,
            Err(e) if e.is_timeout() => return Err(CloudError::Transient(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        if result.success() {
            Ok(Ok(result.stdout))
        } else {
            Ok(Err(result.combined_output()))
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        id: &str,
        region: &str,
        args: &[&str],
    ) -> CloudResult<T> {
        match self.call(region, args).await? {
            Ok(stdout) => Ok(serde_json::from_str(&stdout)?),
            Err(output) => Err(classify(kind, id, &output)),
        }
    }

    async fn describe_bucket(&self, region: &str, name: &str) -> CloudResult<ResourceDescriptor> {
        let kind = ResourceKind::Bucket;
        if let Err(output) = self.call(region, &["s3api", "head-bucket", "--bucket", name]).await? {
            return Err(classify(kind, name, &output));
        }

        let public_access_block = match self
            .call(region, &["s3api", "get-public-access-block", "--bucket", name])
            .await?
        {
            Ok(stdout) => {
                let c = serde_json::from_str::<PublicAccessBlockResponse>(&stdout)?
                    .public_access_block_configuration;
                PublicAccessBlock {
                    block_public_acls: c.block_public_acls,
                    ignore_public_acls: c.ignore_public_acls,
                    block_public_policy: c.block_public_policy,
                    restrict_public_buckets: c.restrict_public_buckets,
                }
            }
            Err(output) if output.contains("NoSuchPublicAccessBlockConfiguration") => {
                PublicAccessBlock::default()
            }
            Err(output) => return Err(classify(kind, name, &output)),
        };

        let encryption_enabled = match self
            .call(region, &["s3api", "get-bucket-encryption", "--bucket", name])
            .await?
        {
            Ok(stdout) => !serde_json::from_str::<EncryptionResponse>(&stdout)?
                .server_side_encryption_configuration
                .rules
                .is_empty(),
            Err(output) if output.contains("ServerSideEncryptionConfigurationNotFoundError") => false,
            Err(output) => return Err(classify(kind, name, &output)),
        };

        Ok(ResourceDescriptor::Bucket(BucketDescriptor {
            name: name.to_string(),
            encryption_enabled,
            public_access_block,
        }))
    }

    async fn describe_instance(&self, region: &str, id: &str) -> CloudResult<ResourceDescriptor> {
        let kind = ResourceKind::Instance;
        let response: DescribeInstances = self
            .fetch(kind, id, region, &["ec2", "describe-instances", "--instance-ids", id])
            .await?;

        let instance = response
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == id)
            .filter(|i| i.state.name != "terminated")
            .ok_or_else(|| CloudError::NotFound {
                kind,
                id: id.to_string(),
            })?;

        Ok(ResourceDescriptor::Instance(InstanceDescriptor {
            id: instance.instance_id,
            state: instance.state.name,
            instance_type: instance.instance_type,
        }))
    }

    async fn describe_security_group(
        &self,
        region: &str,
        id: &str,
    ) -> CloudResult<ResourceDescriptor> {
        let kind = ResourceKind::SecurityGroup;
        let response: DescribeSecurityGroups = self
            .fetch(kind, id, region, &["ec2", "describe-security-groups", "--group-ids", id])
            .await?;

        let group = response
            .security_groups
            .into_iter()
            .find(|g| g.group_id == id)
            .ok_or_else(|| CloudError::NotFound {
                kind,
                id: id.to_string(),
            })?;

        let mut rules = BTreeSet::new();
        for permission in group.ip_permissions {
            rules.extend(permission.rules("ingress"));
        }
        for permission in group.ip_permissions_egress {
            rules.extend(permission.rules("egress"));
        }

        Ok(ResourceDescriptor::SecurityGroup(SecurityGroupDescriptor {
            id: group.group_id,
            rules,
        }))
    }

    async fn describe_network(&self, region: &str, id: &str) -> CloudResult<ResourceDescriptor> {
        let kind = ResourceKind::Network;
        let response: DescribeVpcs = self
            .fetch(kind, id, region, &["ec2", "describe-vpcs", "--vpc-ids", id])
            .await?;

        let vpc = response
            .vpcs
            .into_iter()
            .find(|v| v.vpc_id == id)
            .ok_or_else(|| CloudError::NotFound {
                kind,
                id: id.to_string(),
            })?;

        Ok(ResourceDescriptor::Network(NetworkDescriptor {
            id: vpc.vpc_id,
            cidr_block: vpc.cidr_block,
        }))
    }
}

#[async_trait]
impl ProviderApi for AwsCliApi {
    async fn describe(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> CloudResult<ResourceDescriptor> {
        match kind {
            ResourceKind::Bucket => self.describe_bucket(region, id).await,
            ResourceKind::Instance => self.describe_instance(region, id).await,
            ResourceKind::SecurityGroup => self.describe_security_group(region, id).await,
            ResourceKind::Network => self.describe_network(region, id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let kind = ResourceKind::Bucket;
        assert!(classify(
            kind,
            "b",
            "An error occurred (404) when calling the HeadBucket operation: Not Found"
        )
        .is_not_found());
        assert!(classify(
            ResourceKind::Instance,
            "i-1",
            "An error occurred (InvalidInstanceID.NotFound) when calling the DescribeInstances operation"
        )
        .is_not_found());
        assert!(classify(
            kind,
            "b",
            "An error occurred (SlowDown) when calling the HeadBucket operation"
        )
        .is_transient());
        assert!(matches!(
            classify(kind, "b", "An error occurred (403) when calling the HeadBucket operation: Forbidden"),
            CloudError::Provider(_)
        ));
    }

    #[test]
    fn test_permission_expands_per_cidr() {
        let permission: IpPermission = serde_json::from_str(
            r#"{"IpProtocol": "tcp", "FromPort": 22, "ToPort": 22,
                "IpRanges": [{"CidrIp": "10.0.0.0/8"}, {"CidrIp": "192.168.0.0/16"}],
                "Ipv6Ranges": [], "UserIdGroupPairs": []}"#,
        )
        .unwrap();

        let rules = permission.rules("ingress");
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.from_port == Some(22)));
    }

    #[test]
    fn test_all_protocol_is_named() {
        let permission: IpPermission = serde_json::from_str(
            r#"{"IpProtocol": "-1", "IpRanges": [{"CidrIp": "0.0.0.0/0"}]}"#,
        )
        .unwrap();

        assert_eq!(permission.rules("egress"), vec![SecurityGroupRule::egress_all("0.0.0.0/0")]);
    }
}
