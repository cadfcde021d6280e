//! Validation of lifecycle events and their translation into bridge requests.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::action::Action;
use crate::errors::ProtocolError;
use crate::instance::{InstanceDescriptor, PortKind, ProdPort};
use crate::payload::{AppDetail, InstanceDetail, Payload, RegisterPayload, RmiPort};

pub const DEFAULT_INSTANCE_PATH: &str = "/home/work";

/// Checks a raw event against the instance schema and returns the typed descriptor.
pub fn validate(raw: &Value) -> Result<InstanceDescriptor, ProtocolError> {
    Ok(InstanceDescriptor::deserialize(raw)?)
}

/// Keeps the ports flagged for `kind`, in the order they were received.
pub fn parse_prod_ports(ports: &IndexMap<String, ProdPort>, kind: PortKind) -> Vec<RmiPort> {
    ports
        .iter()
        .filter(|(_, desc)| desc.port_info.is(kind))
        .map(|(name, desc)| RmiPort {
            name: name.clone(),
            port: desc.host_port,
        })
        .collect()
}

/// Lenient string to integer: leading whitespace and sign, then the leading digits.
/// Input without leading digits yields 0.
pub fn coerce_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative { -magnitude } else { magnitude }
}

/// Builds action payloads for one cluster.
#[derive(Debug, Clone)]
pub struct Translator {
    cluster: String,
}

impl Translator {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn translate(&self, instance: &InstanceDescriptor, action: Action) -> Payload {
        match action {
            Action::Register => self.register(instance),
            Action::Unregister => Payload::Unregister(self.instance_detail(instance)),
            Action::Create => Payload::Create(self.app_detail(instance)),
        }
    }

    fn register(&self, instance: &InstanceDescriptor) -> Payload {
        let prod_ports = &instance.instance_meta.prod_ports;
        let rmi_ports = parse_prod_ports(prod_ports, PortKind::Bns);
        let Some(first_rmi) = rmi_ports.first() else {
            return Payload::Empty {};
        };

        let instance_http_port = parse_prod_ports(prod_ports, PortKind::Http)
            .first()
            .map_or(first_rmi.port, |p| p.port);

        Payload::Register(RegisterPayload {
            instance_http_port,
            instance_rmi_ports: rmi_ports,
            instance_path: instance
                .instance_path
                .clone()
                .unwrap_or_else(|| DEFAULT_INSTANCE_PATH.to_string()),
            instance: self.instance_detail(instance),
        })
    }

    fn instance_detail(&self, instance: &InstanceDescriptor) -> InstanceDetail {
        InstanceDetail {
            instance_id: instance.instance_id.clone(),
            instance_ip: instance.instance_ip.clone(),
            instance_index: coerce_int(&instance.instance_index),
            app_id: coerce_int(&instance.app_id),
            app: self.app_detail(instance),
        }
    }

    fn app_detail(&self, instance: &InstanceDescriptor) -> AppDetail {
        AppDetail {
            app_name: instance.app_name.clone(),
            cluster: self.cluster.clone(),
            org_name: instance.instance_tags.org_name.clone(),
            space_name: instance.instance_tags.space_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(prod_ports: Value) -> Value {
        json!({
            "app_id": "42",
            "app_name": "billing",
            "instance_id": "ins-7f3a",
            "instance_ip": "10.0.0.8",
            "instance_index": "0",
            "instance_tags": { "org_name": "acme", "space_name": "prod" },
            "instance_meta": { "raw_ports": {}, "prod_ports": prod_ports }
        })
    }

    fn prod_port(host_port: i64, bns: bool, http: bool) -> Value {
        json!({
            "host_port": host_port,
            "container_port": 8080,
            "port_info": { "port": 8080, "bns": bns, "http": http }
        })
    }

    fn translate(raw: Value, action: Action) -> Value {
        let instance = validate(&raw).unwrap();
        serde_json::to_value(Translator::new("bj-01").translate(&instance, action)).unwrap()
    }

    #[test]
    fn register_falls_back_to_first_bns_port() {
        let payload = translate(event(json!({ "p1": prod_port(9000, true, false) })), Action::Register);

        assert_eq!(payload["instance_rmi_ports"], json!([{ "name": "p1", "port": 9000 }]));
        assert_eq!(payload["instance_http_port"], json!(9000));
        assert_eq!(payload["app_id"], json!(42));
        assert_eq!(payload["instance_index"], json!(0));
        assert_eq!(payload["instance_path"], json!(DEFAULT_INSTANCE_PATH));
        assert_eq!(payload["cluster"], json!("bj-01"));
        assert_eq!(payload["org_name"], json!("acme"));
    }

    #[test]
    fn register_prefers_first_http_port() {
        let payload = translate(
            event(json!({
                "rpc": prod_port(9000, true, false),
                "web": prod_port(9100, false, true),
                "admin": prod_port(9200, true, true),
            })),
            Action::Register,
        );

        assert_eq!(payload["instance_http_port"], json!(9100));
        assert_eq!(
            payload["instance_rmi_ports"],
            json!([{ "name": "rpc", "port": 9000 }, { "name": "admin", "port": 9200 }])
        );
    }

    #[test]
    fn register_without_bns_port_is_empty() {
        let raw = event(json!({ "web": prod_port(9100, false, true) }));
        let instance = validate(&raw).unwrap();
        let payload = Translator::new("bj-01").translate(&instance, Action::Register);

        assert!(payload.is_empty());
        assert_eq!(payload.to_body().unwrap(), "{}");
    }

    #[test]
    fn unregister_carries_identity_only() {
        let payload = translate(event(json!({ "p1": prod_port(9000, true, false) })), Action::Unregister);

        assert_eq!(
            payload,
            json!({
                "instance_id": "ins-7f3a",
                "instance_ip": "10.0.0.8",
                "instance_index": 0,
                "app_id": 42,
                "app_name": "billing",
                "cluster": "bj-01",
                "org_name": "acme",
                "space_name": "prod"
            })
        );
    }

    #[test]
    fn create_carries_app_detail_only() {
        let payload = translate(event(json!({})), Action::Create);

        assert_eq!(
            payload,
            json!({ "app_name": "billing", "cluster": "bj-01", "org_name": "acme", "space_name": "prod" })
        );
    }

    #[test]
    fn filter_keeps_wire_order() {
        let raw = event(json!({
            "zeta": prod_port(1, true, false),
            "alpha": prod_port(2, false, false),
            "mid": prod_port(3, true, false),
        }));
        let instance = validate(&raw).unwrap();
        let ports = parse_prod_ports(&instance.instance_meta.prod_ports, PortKind::Bns);

        let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["zeta", "mid"]);
        assert!(parse_prod_ports(&IndexMap::new(), PortKind::Http).is_empty());
    }

    #[test]
    fn rejects_missing_and_mistyped_fields() {
        let mut missing = event(json!({}));
        missing.as_object_mut().unwrap().remove("instance_ip");
        assert!(matches!(validate(&missing), Err(ProtocolError::SchemaMismatch(_))));

        let mut mistyped = event(json!({}));
        mistyped["instance_index"] = json!(0);
        assert!(matches!(validate(&mistyped), Err(ProtocolError::SchemaMismatch(_))));

        let bad_ports = event(json!({ "p1": { "host_port": "9000" } }));
        assert!(validate(&bad_ports).is_err());
    }

    #[test]
    fn out_of_range_ports_pass_through() {
        let payload = translate(event(json!({ "p1": prod_port(70000, true, false) })), Action::Register);

        assert_eq!(payload["instance_rmi_ports"], json!([{ "name": "p1", "port": 70000 }]));
        assert_eq!(payload["instance_http_port"], json!(70000));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let raw = event(json!({}));
        let instance = validate(&raw).unwrap();

        assert_eq!(instance.instance_user, None);
        assert_eq!(instance.instance_path, None);
    }

    #[test]
    fn coerces_like_a_lenient_parser() {
        assert_eq!(coerce_int("42"), 42);
        assert_eq!(coerce_int(" 7abc"), 7);
        assert_eq!(coerce_int("-3"), -3);
        assert_eq!(coerce_int("abc"), 0);
        assert_eq!(coerce_int(""), 0);
    }
}
