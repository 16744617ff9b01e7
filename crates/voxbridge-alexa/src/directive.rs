//! Inbound directive parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header of an inbound directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveHeader {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_version: Option<String>,
}

/// Endpoint reference inside a directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveEndpoint {
    pub endpoint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<Value>,
}

/// A parsed inbound directive.
#[derive(Debug, Clone, Deserialize)]
pub struct Directive {
    pub header: DirectiveHeader,
    #[serde(default)]
    pub endpoint: Option<DirectiveEndpoint>,
    #[serde(default)]
    pub payload: Value,
}

/// Wire envelope: `{"directive": {...}}`.
#[derive(Debug, Clone, Deserialize)]
struct DirectiveEnvelope {
    directive: Directive,
}

impl Directive {
    /// Parse the wire envelope.
    pub fn from_wire(raw: &Value) -> Option<Self> {
        serde_json::from_value::<DirectiveEnvelope>(raw.clone())
            .map(|e| e.directive)
            .ok()
    }

    /// Build a directive programmatically (used by tests and front-ends).
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            header: DirectiveHeader {
                namespace: namespace.into(),
                name: name.into(),
                instance: None,
                message_id: None,
                correlation_token: None,
                payload_version: Some(crate::PAYLOAD_VERSION.to_string()),
            },
            endpoint: None,
            payload: Value::Null,
        }
    }

    pub fn with_endpoint(mut self, endpoint_id: impl Into<String>) -> Self {
        self.endpoint = Some(DirectiveEndpoint {
            endpoint_id: endpoint_id.into(),
            cookie: None,
        });
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.header.instance = Some(instance.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_correlation_token(mut self, token: impl Into<String>) -> Self {
        self.header.correlation_token = Some(token.into());
        self
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.endpoint_id.as_str())
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.header.correlation_token.as_deref()
    }

    pub fn instance(&self) -> Option<&str> {
        self.header.instance.as_deref()
    }

    pub fn is_discovery(&self) -> bool {
        self.header.namespace == "Alexa.Discovery" && self.header.name == "Discover"
    }

    pub fn is_state_report(&self) -> bool {
        self.header.namespace == "Alexa" && self.header.name == "ReportState"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_power_directive() {
        let raw = json!({
            "directive": {
                "header": {
                    "namespace": "Alexa.PowerController",
                    "name": "TurnOn",
                    "payloadVersion": "3",
                    "messageId": "abc",
                    "correlationToken": "tok-1"
                },
                "endpoint": { "endpointId": "light.living" },
                "payload": {}
            }
        });
        let d = Directive::from_wire(&raw).unwrap();
        assert_eq!(d.header.namespace, "Alexa.PowerController");
        assert_eq!(d.header.name, "TurnOn");
        assert_eq!(d.endpoint_id(), Some("light.living"));
        assert_eq!(d.correlation_token(), Some("tok-1"));
        assert!(!d.is_discovery());
    }

    #[test]
    fn test_parse_discovery() {
        let raw = json!({
            "directive": {
                "header": { "namespace": "Alexa.Discovery", "name": "Discover", "payloadVersion": "3" },
                "payload": { "scope": { "type": "BearerToken", "token": "t" } }
            }
        });
        let d = Directive::from_wire(&raw).unwrap();
        assert!(d.is_discovery());
        assert_eq!(d.endpoint_id(), None);
    }

    #[test]
    fn test_instance_directive() {
        let d = Directive::new("Alexa.ModeController", "SetMode")
            .with_instance("Gate.Position")
            .with_endpoint("gate.front");
        assert_eq!(d.instance(), Some("Gate.Position"));
    }
}
