use serde::Serialize;

/// A port advertised under the naming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RmiPort {
    pub name: String,
    pub port: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDetail {
    pub app_name: String,
    pub cluster: String,
    pub org_name: Option<String>,
    pub space_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDetail {
    pub instance_id: String,
    pub instance_ip: String,
    pub instance_index: i64,
    pub app_id: i64,
    #[serde(flatten)]
    pub app: AppDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterPayload {
    pub instance_http_port: i64,
    pub instance_rmi_ports: Vec<RmiPort>,
    pub instance_path: String,
    #[serde(flatten)]
    pub instance: InstanceDetail,
}

/// Request body sent to the bridge, one shape per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Register(RegisterPayload),
    Unregister(InstanceDetail),
    Create(AppDetail),
    /// Nothing to advertise; serializes as `{}`.
    Empty {},
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty {})
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
