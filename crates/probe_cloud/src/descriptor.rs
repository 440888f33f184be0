//! Point-in-time descriptions of live resources.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use probe_spec::{ResourceKind, Value};

/// Snapshot of one live resource, as reported by the provider.
///
/// Descriptors are fetched fresh for every check and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDescriptor {
    Bucket(BucketDescriptor),
    Instance(InstanceDescriptor),
    SecurityGroup(SecurityGroupDescriptor),
    Network(NetworkDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    pub name: String,
    pub encryption_enabled: bool,
    pub public_access_block: PublicAccessBlock,
}

/// Bucket-level public access settings. A bucket without a configuration
/// blocks nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn all_blocked() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: String,
    /// Lifecycle state name, e.g. `running` or `stopped`
    pub state: String,
    pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupDescriptor {
    pub id: String,
    pub rules: BTreeSet<SecurityGroupRule>,
}

/// One permitted flow. A permission with several CIDRs expands to one rule
/// per CIDR.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    /// `ingress` or `egress`
    pub direction: String,
    /// `tcp`, `udp`, `icmp` or `all`
    pub protocol: String,
    pub from_port: Option<u16>,
    pub to_port: Option<u16>,
    /// CIDR block, or the id of the referenced group
    pub cidr: String,
}

impl SecurityGroupRule {
    pub fn ingress(protocol: &str, port: u16, cidr: &str) -> Self {
        Self {
            direction: "ingress".to_string(),
            protocol: protocol.to_string(),
            from_port: Some(port),
            to_port: Some(port),
            cidr: cidr.to_string(),
        }
    }

    pub fn egress_all(cidr: &str) -> Self {
        Self {
            direction: "egress".to_string(),
            protocol: "all".to_string(),
            from_port: None,
            to_port: None,
            cidr: cidr.to_string(),
        }
    }

    fn to_value(&self) -> Value {
        let port = |p: Option<u16>| p.map(Value::from).unwrap_or(Value::Null);
        let mut map = BTreeMap::new();
        map.insert("direction".to_string(), Value::from(self.direction.as_str()));
        map.insert("protocol".to_string(), Value::from(self.protocol.as_str()));
        map.insert("from_port".to_string(), port(self.from_port));
        map.insert("to_port".to_string(), port(self.to_port));
        // `port` mirrors `from_port`; rule needles match it against the range.
        map.insert("port".to_string(), port(self.from_port));
        map.insert("cidr".to_string(), Value::from(self.cidr.as_str()));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub id: String,
    pub cidr_block: String,
}

impl ResourceDescriptor {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDescriptor::Bucket(_) => ResourceKind::Bucket,
            ResourceDescriptor::Instance(_) => ResourceKind::Instance,
            ResourceDescriptor::SecurityGroup(_) => ResourceKind::SecurityGroup,
            ResourceDescriptor::Network(_) => ResourceKind::Network,
        }
    }

    /// The identifier the resource was looked up by.
    pub fn id(&self) -> &str {
        match self {
            ResourceDescriptor::Bucket(b) => &b.name,
            ResourceDescriptor::Instance(i) => &i.id,
            ResourceDescriptor::SecurityGroup(g) => &g.id,
            ResourceDescriptor::Network(n) => &n.id,
        }
    }

    /// The whole descriptor as a [`Value::Map`].
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        match self {
            ResourceDescriptor::Bucket(b) => {
                let pab = &b.public_access_block;
                let mut block = BTreeMap::new();
                block.insert("block_public_acls".to_string(), Value::Bool(pab.block_public_acls));
                block.insert("ignore_public_acls".to_string(), Value::Bool(pab.ignore_public_acls));
                block.insert("block_public_policy".to_string(), Value::Bool(pab.block_public_policy));
                block.insert(
                    "restrict_public_buckets".to_string(),
                    Value::Bool(pab.restrict_public_buckets),
                );

                map.insert("name".to_string(), Value::from(b.name.as_str()));
                map.insert("encryption_enabled".to_string(), Value::Bool(b.encryption_enabled));
                map.insert("public_access_block".to_string(), Value::Map(block));
            }
            ResourceDescriptor::Instance(i) => {
                map.insert("id".to_string(), Value::from(i.id.as_str()));
                map.insert("state".to_string(), Value::from(i.state.as_str()));
                map.insert("instance_type".to_string(), Value::from(i.instance_type.as_str()));
            }
            ResourceDescriptor::SecurityGroup(g) => {
                map.insert("id".to_string(), Value::from(g.id.as_str()));
                map.insert(
                    "rules".to_string(),
                    Value::List(g.rules.iter().map(SecurityGroupRule::to_value).collect()),
                );
            }
            ResourceDescriptor::Network(n) => {
                map.insert("id".to_string(), Value::from(n.id.as_str()));
                map.insert("cidr_block".to_string(), Value::from(n.cidr_block.as_str()));
            }
        }
        Value::Map(map)
    }

    /// Project a dotted path such as `public_access_block.block_public_acls`.
    ///
    /// An empty path yields the whole descriptor.
    pub fn field(&self, path: &str) -> Option<Value> {
        self.to_value().get_path(path).cloned()
    }

    /// Names accepted by [`ResourceDescriptor::field`] at the top level.
    pub fn field_names(&self) -> Vec<String> {
        match self.to_value() {
            Value::Map(map) => map.into_keys().collect(),
            _ => Vec::new(),
        }
    }
}
