//! Outbound message envelopes: Response, StateReport, ErrorResponse,
//! ActivationStarted and ChangeReport.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// One property value inside a `context.properties` or
/// `payload.change.properties` block.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyReading {
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub name: String,
    pub value: Value,
    pub time_of_sample: String,
    pub uncertainty_in_milliseconds: u64,
}

impl PropertyReading {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self {
            namespace: namespace.into(),
            instance: None,
            name: name.into(),
            value,
            time_of_sample: iso_now(),
            uncertainty_in_milliseconds: 0,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

fn iso_now() -> String {
    iso(Utc::now())
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cause attribution for state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    VoiceInteraction,
    PhysicalInteraction,
}

impl ChangeCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceInteraction => "VOICE_INTERACTION",
            Self::PhysicalInteraction => "PHYSICAL_INTERACTION",
        }
    }
}

/// Protocol-level error categories for directive handling failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Unknown endpoint id in the directive.
    NoSuchEndpoint,
    /// No capability on the endpoint understands the directive.
    InvalidDirective,
    /// Payload value outside the declared range/enum.
    InvalidValue,
    /// Backend write failed.
    EndpointUnreachable,
    /// Anything else.
    InternalError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchEndpoint => "NO_SUCH_ENDPOINT",
            Self::InvalidDirective => "INVALID_DIRECTIVE",
            Self::InvalidValue => "INVALID_VALUE",
            Self::EndpointUnreachable => "ENDPOINT_UNREACHABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Builder for outbound event messages.
///
/// Every variant renders the envelope `{ "event": {...}, "context"?: {...} }`.
/// Scene activation deliberately carries no context block at all.
pub struct Message;

impl Message {
    fn header(namespace: &str, name: &str, correlation_token: Option<&str>) -> Value {
        let mut header = json!({
            "namespace": namespace,
            "name": name,
            "payloadVersion": crate::PAYLOAD_VERSION,
            "messageId": Uuid::new_v4().to_string(),
        });
        if let Some(token) = correlation_token {
            header["correlationToken"] = json!(token);
        }
        header
    }

    fn context(properties: &[PropertyReading]) -> Value {
        json!({ "properties": properties })
    }

    /// Directive Response carrying the changed + coupled properties.
    pub fn response(
        endpoint_id: &str,
        correlation_token: Option<&str>,
        properties: &[PropertyReading],
    ) -> Value {
        json!({
            "context": Self::context(properties),
            "event": {
                "header": Self::header("Alexa", "Response", correlation_token),
                "endpoint": { "endpointId": endpoint_id },
                "payload": {}
            }
        })
    }

    /// Full state snapshot for a ReportState request.
    pub fn state_report(
        endpoint_id: &str,
        correlation_token: Option<&str>,
        properties: &[PropertyReading],
    ) -> Value {
        json!({
            "context": Self::context(properties),
            "event": {
                "header": Self::header("Alexa", "StateReport", correlation_token),
                "endpoint": { "endpointId": endpoint_id },
                "payload": {}
            }
        })
    }

    /// Scene activation confirmation. No context block by design.
    pub fn activation_started(
        endpoint_id: &str,
        correlation_token: Option<&str>,
        cause: ChangeCause,
    ) -> Value {
        json!({
            "event": {
                "header": Self::header("Alexa.SceneController", "ActivationStarted", correlation_token),
                "endpoint": { "endpointId": endpoint_id },
                "payload": {
                    "cause": { "type": cause.as_str() },
                    "timestamp": iso_now(),
                }
            }
        })
    }

    /// Protocol error envelope.
    pub fn error_response(
        endpoint_id: Option<&str>,
        correlation_token: Option<&str>,
        error_type: ErrorType,
        message: &str,
    ) -> Value {
        let mut event = json!({
            "header": Self::header("Alexa", "ErrorResponse", correlation_token),
            "payload": {
                "type": error_type.as_str(),
                "message": message,
            }
        });
        if let Some(id) = endpoint_id {
            event["endpoint"] = json!({ "endpointId": id });
        }
        json!({ "event": event })
    }

    /// Proactive change report: `changed` goes into the change payload,
    /// `unchanged` (the rest of the device state) into the context block.
    pub fn change_report(
        endpoint_id: &str,
        cause: ChangeCause,
        changed: &[PropertyReading],
        unchanged: &[PropertyReading],
    ) -> Value {
        json!({
            "context": Self::context(unchanged),
            "event": {
                "header": Self::header("Alexa", "ChangeReport", None),
                "endpoint": { "endpointId": endpoint_id },
                "payload": {
                    "change": {
                        "cause": { "type": cause.as_str() },
                        "properties": changed,
                    }
                }
            }
        })
    }
}
