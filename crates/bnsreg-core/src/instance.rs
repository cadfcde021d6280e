use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One running application instance as published on the lifecycle stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceDescriptor {
    #[serde(default)]
    pub app_uri: Option<Vec<String>>,
    pub app_id: String,
    pub app_name: String,
    pub instance_id: String,
    pub instance_ip: String,
    /// Numeric, but carried as a string on the wire.
    pub instance_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_user: Option<String>,
    #[serde(default)]
    pub instance_tags: InstanceTags,
    pub instance_meta: InstanceMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceTags {
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
}

/// Port layout of an instance. Map order is the order the ports were received in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstanceMeta {
    pub raw_ports: IndexMap<String, PortInfo>,
    pub prod_ports: IndexMap<String, ProdPort>,
}

/// Port numbers are plain integers on the wire and are forwarded without range checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortInfo {
    pub port: i64,
    pub bns: bool,
    pub http: bool,
}

impl PortInfo {
    pub fn is(&self, kind: PortKind) -> bool {
        match kind {
            PortKind::Bns => self.bns,
            PortKind::Http => self.http,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProdPort {
    pub host_port: i64,
    pub container_port: i64,
    pub port_info: PortInfo,
}

/// Which advertisement flag a port filter selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Bns,
    Http,
}

/// Identity used to keep at most one bridge request in flight per instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InFlightKey(String);

impl InFlightKey {
    pub fn of(instance: &InstanceDescriptor) -> Self {
        Self(format!("{}_{}", instance.app_id, instance.instance_index))
    }
}

impl fmt::Display for InFlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
