//! Device manager: directive dispatch, discovery, state reporting and
//! backend fan-out.
//!
//! # Architecture
//!
//! The manager owns the device list and the two external seams: the
//! [`StateGateway`](voxbridge_core::StateGateway) it reads and writes
//! through, and the [`EventProxy`](voxbridge_alexa::EventProxy) it hands
//! rendered ChangeReports to. Both are constructor-injected, as is the
//! [`RateLimiter`], so tests run against in-memory fakes with tight limits.

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use voxbridge_alexa::{
    discover_response, ChangeCause, Directive, ErrorType, Message, PropertyReading, SharedProxy,
};
use voxbridge_core::{SharedGateway, StateUpdate};

use crate::controls::Outcome;
use crate::device::{Device, DeviceSummary};
use crate::error::DeviceError;
use crate::ratelimit::RateLimiter;

fn error_type(err: &DeviceError) -> ErrorType {
    match err {
        DeviceError::EndpointNotFound(_) => ErrorType::NoSuchEndpoint,
        DeviceError::UnsupportedDirective(_) => ErrorType::InvalidDirective,
        DeviceError::InvalidValue(_) => ErrorType::InvalidValue,
        DeviceError::Backend(_) => ErrorType::EndpointUnreachable,
        DeviceError::InvalidConfig(_) => ErrorType::InternalError,
    }
}

/// Aggregate root over the registered devices.
pub struct DeviceManager {
    gateway: SharedGateway,
    proxy: SharedProxy,
    limiter: RateLimiter,
    devices: RwLock<Vec<Device>>,
}

impl DeviceManager {
    pub fn new(gateway: SharedGateway, proxy: SharedProxy, limiter: RateLimiter) -> Self {
        Self {
            gateway,
            proxy,
            limiter,
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Register a device. A device with the same endpoint id replaces the
    /// earlier registration in place, keeping discovery order stable.
    pub async fn add_device(&self, device: Device) {
        let mut devices = self.devices.write().await;
        if let Some(existing) = devices.iter_mut().find(|d| d.id() == device.id()) {
            debug!(id = device.id(), "replacing registered device");
            *existing = device;
        } else {
            devices.push(device);
        }
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn device_ids(&self) -> Vec<String> {
        self.devices
            .read()
            .await
            .iter()
            .map(|d| d.id().to_string())
            .collect()
    }

    /// Flat device descriptions for the simpler protocol front-ends.
    pub async fn summaries(&self) -> Vec<DeviceSummary> {
        self.devices.read().await.iter().map(Device::summary).collect()
    }

    /// Summary of one registered endpoint, if any.
    pub async fn endpoint_by_id(&self, endpoint_id: &str) -> Option<DeviceSummary> {
        self.devices
            .read()
            .await
            .iter()
            .find(|d| d.id() == endpoint_id)
            .map(Device::summary)
    }

    /// Execute a directive without envelope rendering. Used by the simpler
    /// protocol front-ends, which translate into directives so every write
    /// path runs the same range and coupling rules.
    pub async fn execute_directive(&self, directive: &Directive) -> Result<Outcome, DeviceError> {
        let endpoint_id = directive.endpoint_id().ok_or_else(|| {
            DeviceError::UnsupportedDirective("directive without an endpoint".into())
        })?;
        let mut devices = self.devices.write().await;
        let device = devices
            .iter_mut()
            .find(|d| d.id() == endpoint_id)
            .ok_or_else(|| DeviceError::EndpointNotFound(endpoint_id.to_string()))?;
        device.execute(self.gateway.as_ref(), directive).await
    }

    /// Current full state snapshot of one endpoint.
    pub async fn snapshot_of(&self, endpoint_id: &str) -> Result<Vec<PropertyReading>, DeviceError> {
        let mut devices = self.devices.write().await;
        let device = devices
            .iter_mut()
            .find(|d| d.id() == endpoint_id)
            .ok_or_else(|| DeviceError::EndpointNotFound(endpoint_id.to_string()))?;
        Ok(device.snapshot(self.gateway.as_ref()).await)
    }

    /// Handle one inbound event in the wire envelope and render the reply.
    ///
    /// Every failure path renders a protocol error envelope; this method
    /// never fails outward.
    pub async fn handle_alexa_event(&self, raw: &Value) -> Value {
        let Some(directive) = Directive::from_wire(raw) else {
            warn!("malformed inbound event");
            return Message::error_response(
                None,
                None,
                ErrorType::InvalidDirective,
                "malformed directive envelope",
            );
        };

        if directive.is_discovery() {
            return self.discover().await;
        }
        if directive.is_state_report() {
            return self.state_report(&directive).await;
        }
        self.execute(&directive).await
    }

    async fn discover(&self) -> Value {
        let devices = self.devices.read().await;
        let endpoints: Vec<_> = devices.iter().map(Device::discovery_endpoint).collect();
        info!(endpoints = endpoints.len(), "discovery");
        discover_response(&endpoints)
    }

    async fn state_report(&self, directive: &Directive) -> Value {
        let token = directive.correlation_token();
        let Some(endpoint_id) = directive.endpoint_id() else {
            return Message::error_response(
                None,
                token,
                ErrorType::InvalidDirective,
                "ReportState without an endpoint",
            );
        };
        let mut devices = self.devices.write().await;
        let Some(device) = devices.iter_mut().find(|d| d.id() == endpoint_id) else {
            return Self::unknown_endpoint(endpoint_id, token);
        };
        let readings = device.snapshot(self.gateway.as_ref()).await;
        Message::state_report(endpoint_id, token, &readings)
    }

    async fn execute(&self, directive: &Directive) -> Value {
        let token = directive.correlation_token();
        let Some(endpoint_id) = directive.endpoint_id() else {
            return Message::error_response(
                None,
                token,
                ErrorType::InvalidDirective,
                "directive without an endpoint",
            );
        };

        info!(
            endpoint = endpoint_id,
            namespace = %directive.header.namespace,
            name = %directive.header.name,
            "directive"
        );
        match self.execute_directive(directive).await {
            Err(DeviceError::EndpointNotFound(_)) => Self::unknown_endpoint(endpoint_id, token),
            Ok(outcome) if outcome.scene => {
                Message::activation_started(endpoint_id, token, ChangeCause::VoiceInteraction)
            }
            Ok(outcome) => Message::response(endpoint_id, token, &outcome.reported),
            Err(err) => {
                warn!(endpoint = endpoint_id, %err, "directive failed");
                Message::error_response(
                    Some(endpoint_id),
                    token,
                    error_type(&err),
                    &err.to_string(),
                )
            }
        }
    }

    fn unknown_endpoint(endpoint_id: &str, token: Option<&str>) -> Value {
        warn!(endpoint = endpoint_id, "unknown endpoint");
        Message::error_response(
            Some(endpoint_id),
            token,
            ErrorType::NoSuchEndpoint,
            &format!("no device with endpoint id {endpoint_id}"),
        )
    }

    /// Fan a backend state change out to every dependent device.
    ///
    /// Unacknowledged updates are command echoes still in flight and are
    /// skipped. Property caches are always brought up to date; the
    /// ChangeReport is additionally gated by the per-endpoint rate limiter
    /// and dropped silently when over budget.
    pub async fn handle_state_update(&self, id: &str, update: &StateUpdate) {
        if !update.ack {
            debug!(id, "skipping unacknowledged state update");
            return;
        }
        let mut devices = self.devices.write().await;
        for device in devices.iter_mut() {
            if !device.depends_on(id) {
                continue;
            }
            let changed = device.apply_backend(id, &update.val);
            if changed.is_empty() {
                continue;
            }
            if !self.limiter.allow(device.id()).await {
                continue;
            }
            let snapshot = device.snapshot(self.gateway.as_ref()).await;
            let unchanged: Vec<PropertyReading> = snapshot
                .into_iter()
                .filter(|r| {
                    !changed.iter().any(|c| {
                        c.namespace == r.namespace && c.name == r.name && c.instance == r.instance
                    })
                })
                .collect();
            let report = Message::change_report(
                device.id(),
                ChangeCause::PhysicalInteraction,
                &changed,
                &unchanged,
            );
            if let Err(err) = self.proxy.publish(report).await {
                warn!(endpoint = device.id(), %err, "change report delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Control, ControlConfig, ControlKind};
    use std::sync::Arc;
    use std::time::Duration;
    use serde_json::json;
    use voxbridge_alexa::CollectingProxy;
    use voxbridge_core::{MemoryGateway, StateValue};

    fn dimmer() -> Device {
        Device::new("dim.hall", "Hallway Dimmer").with_control(
            Control::new(
                ControlKind::Dimmer,
                ControlConfig {
                    set_id: Some("dim.level".into()),
                    power_set_id: Some("dim.on".into()),
                    range: Some(crate::ValueRange::new(500.0, 1000.0)),
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    async fn manager() -> (Arc<MemoryGateway>, Arc<CollectingProxy>, DeviceManager) {
        let gateway = Arc::new(MemoryGateway::new());
        let proxy = Arc::new(CollectingProxy::new());
        let manager =
            DeviceManager::new(gateway.clone(), proxy.clone(), RateLimiter::default());
        manager.add_device(dimmer()).await;
        (gateway, proxy, manager)
    }

    #[tokio::test]
    async fn test_discovery_envelope() {
        let (_, _, manager) = manager().await;
        let reply = manager
            .handle_alexa_event(&json!({
                "directive": {
                    "header": { "namespace": "Alexa.Discovery", "name": "Discover", "payloadVersion": "3" },
                    "payload": {}
                }
            }))
            .await;
        assert_eq!(reply["event"]["header"]["name"], "Discover.Response");
        let eps = reply["event"]["payload"]["endpoints"].as_array().unwrap();
        assert_eq!(eps.len(), 1);
        // Base interface + power + brightness.
        assert_eq!(eps[0]["capabilities"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_error() {
        let (_, _, manager) = manager().await;
        let reply = manager
            .handle_alexa_event(&json!({
                "directive": {
                    "header": { "namespace": "Alexa.PowerController", "name": "TurnOn", "payloadVersion": "3" },
                    "endpoint": { "endpointId": "nope" },
                    "payload": {}
                }
            }))
            .await;
        assert_eq!(reply["event"]["header"]["name"], "ErrorResponse");
        assert_eq!(reply["event"]["payload"]["type"], "NO_SUCH_ENDPOINT");
    }

    #[tokio::test]
    async fn test_malformed_event_error() {
        let (_, _, manager) = manager().await;
        let reply = manager.handle_alexa_event(&json!({ "not": "a directive" })).await;
        assert_eq!(reply["event"]["payload"]["type"], "INVALID_DIRECTIVE");
    }

    #[tokio::test]
    async fn test_state_update_publishes_change_report() {
        let (gateway, proxy, manager) = manager().await;
        gateway.seed("dim.on", true).await;
        manager
            .handle_state_update("dim.level", &StateUpdate::acked(875.0))
            .await;
        let events = proxy.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"]["header"]["name"], "ChangeReport");
        assert_eq!(
            events[0]["event"]["payload"]["change"]["properties"][0]["value"],
            json!(75.0)
        );
    }

    #[tokio::test]
    async fn test_unacked_update_skipped() {
        let (_, proxy, manager) = manager().await;
        manager
            .handle_state_update("dim.level", &StateUpdate::pending(875.0))
            .await;
        assert!(proxy.is_empty().await);
    }

    #[tokio::test]
    async fn test_rate_limited_update_still_caches() {
        let gateway = Arc::new(MemoryGateway::new());
        let proxy = Arc::new(CollectingProxy::new());
        let manager = DeviceManager::new(
            gateway.clone(),
            proxy.clone(),
            RateLimiter::new(1, Duration::from_secs(3600)),
        );
        manager.add_device(dimmer()).await;
        gateway.seed("dim.on", true).await;

        manager
            .handle_state_update("dim.level", &StateUpdate::acked(875.0))
            .await;
        manager
            .handle_state_update("dim.level", &StateUpdate::acked(900.0))
            .await;
        // Second report suppressed, cache still advanced.
        assert_eq!(proxy.len().await, 1);

        let reply = manager
            .handle_alexa_event(&json!({
                "directive": {
                    "header": { "namespace": "Alexa", "name": "ReportState", "payloadVersion": "3" },
                    "endpoint": { "endpointId": "dim.hall" },
                    "payload": {}
                }
            }))
            .await;
        let props = reply["context"]["properties"].as_array().unwrap();
        let brightness = props.iter().find(|p| p["name"] == "brightness").unwrap();
        assert_eq!(brightness["value"], json!(80.0));
    }
}
