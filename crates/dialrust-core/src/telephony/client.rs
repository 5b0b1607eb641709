//! HTTP telephony client

use super::{OutboundCallRequest, PlacedCall, ProviderError, TelephonyProvider};
use async_trait::async_trait;
use dialrust_common::config::TelephonyConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Response keys providers use for the call identifier
const CALL_ID_KEYS: [&str; 4] = ["call_id", "callSid", "call_sid", "conversation_id"];

/// Places calls through the provider's REST API
pub struct HttpTelephonyClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTelephonyClient {
    pub fn new(config: &TelephonyConfig) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/v1/calls", self.base_url)
    }
}

fn extract_call_id(body: &Value) -> Option<String> {
    CALL_ID_KEYS.iter().find_map(|key| match body.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl TelephonyProvider for HttpTelephonyClient {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<PlacedCall, ProviderError> {
        let mut http_request = self.http_client.post(self.calls_url()).json(request);
        if let Some(ref key) = self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let call_id = extract_call_id(&body)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("no call id in {}", body)))?;

        debug!(%call_id, to = %request.to_number, "Provider accepted call");
        Ok(PlacedCall { call_id, raw: body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpTelephonyClient {
        HttpTelephonyClient::new(&TelephonyConfig {
            base_url: format!("{}/", server.uri()),
            api_key: Some("secret".to_string()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn request() -> OutboundCallRequest {
        OutboundCallRequest {
            agent_id: "agent_1".to_string(),
            from_number: "+15550000".to_string(),
            to_number: "+15551234".to_string(),
            dynamic_variables: BTreeMap::from([("first_name".to_string(), "Ada".to_string())]),
            webhook_url: "http://localhost/webhook".to_string(),
            metadata: json!({ "attempt_id": "a1" }),
        }
    }

    #[tokio::test]
    async fn test_place_call_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/calls"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "agent_id": "agent_1",
                "to_number": "+15551234",
                "dynamic_variables": { "first_name": "Ada" },
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "callSid": "CA123",
                "success": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let placed = client(&server).place_call(&request()).await.unwrap();
        assert_eq!(placed.call_id, "CA123");
        assert_eq!(placed.raw["success"], true);
    }

    #[tokio::test]
    async fn test_place_call_rejected_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/calls"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({ "detail": "bad number" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).place_call(&request()).await.unwrap_err();
        match &err {
            ProviderError::Rejected { status, body } => {
                assert_eq!(*status, 422);
                assert_eq!(body["detail"], "bad number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.payload()["status"], 422);
    }

    #[tokio::test]
    async fn test_missing_call_id_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let err = client(&server).place_call(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_extract_call_id_aliases() {
        assert_eq!(extract_call_id(&json!({ "call_id": "x" })), Some("x".to_string()));
        assert_eq!(
            extract_call_id(&json!({ "conversation_id": "conv_9" })),
            Some("conv_9".to_string())
        );
        assert_eq!(extract_call_id(&json!({ "call_id": "" })), None);
    }
}
