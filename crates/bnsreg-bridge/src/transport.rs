use async_trait::async_trait;
use bnsreg_core::{Action, HttpMethod};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::config::BridgeConfig;
use crate::errors::TransportError;

/// Raw answer from the bridge, classified by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReply {
    pub status: u16,
    pub body: String,
}

impl BridgeReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// One request/response exchange with the bridge for an action.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn send(&self, action: Action, body: String) -> Result<BridgeReply, TransportError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &BridgeConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.register_conn_timeout)
            .read_timeout(config.register_inactive_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.bridge_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, action: Action) -> String {
        format!("{}{}", self.base_url, action.route().0)
    }
}

#[async_trait]
impl BridgeTransport for HttpTransport {
    async fn send(&self, action: Action, body: String) -> Result<BridgeReply, TransportError> {
        let url = self.url_for(action);
        let builder = match action.route().1 {
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        let res = builder.body(body).send().await?;
        let status = res.status().as_u16();
        let body = res.text().await?;
        Ok(BridgeReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn transport(base_url: String) -> HttpTransport {
        HttpTransport::new(&BridgeConfig::new(base_url)).unwrap()
    }

    #[tokio::test]
    async fn register_posts_json_to_add_rmi_ports() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/addRMIports")
                .header("content-type", "application/json")
                .json_body(json!({ "app_id": 42 }));
            then.status(200).json_body(json!({ "success": true }));
        });

        let reply = transport(server.base_url())
            .send(Action::Register, json!({ "app_id": 42 }).to_string())
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(serde_json::from_str::<serde_json::Value>(&reply.body).unwrap(), json!({ "success": true }));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn unregister_sends_delete_with_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE).path("/delRMIports").body(r#"{"app_id":42}"#);
            then.status(200).body(r#"{"success":true}"#);
        });

        let reply = transport(format!("{}/", server.base_url()))
            .send(Action::Unregister, r#"{"app_id":42}"#.to_string())
            .await
            .unwrap();

        assert_eq!(reply.body, r#"{"success":true}"#);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn error_status_still_returns_body() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/addServiceName");
            then.status(502).body("bad gateway");
        });

        let reply = transport(server.base_url()).send(Action::Create, "{}".to_string()).await.unwrap();

        assert_eq!(reply, BridgeReply { status: 502, body: "bad gateway".into() });
    }

    #[tokio::test]
    async fn unreachable_bridge_is_a_transport_error() {
        let result = transport("http://127.0.0.1:1".to_string())
            .send(Action::Register, "{}".to_string())
            .await;

        assert!(matches!(result, Err(TransportError::Connect(_)) | Err(TransportError::Request(_))));
    }
}
