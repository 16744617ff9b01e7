//! Capability-object webhook front-end.
//!
//! Devices are listed as `devices.types.*` with `devices.capabilities.*`
//! entries (on_off, range, color_setting, mode); every executed capability
//! gets its own `action_result` with `DONE` or `ERROR` plus an error code.
//! Like the other front-ends this translates onto the shared
//! [`DeviceManager`] directives, never around them.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use voxbridge_alexa::{Directive, PropertyReading};
use voxbridge_devices::{iface, ControlConfig, ControlKind, DeviceError, DeviceManager, DeviceSummary};

const CAP_ON_OFF: &str = "devices.capabilities.on_off";
const CAP_RANGE: &str = "devices.capabilities.range";
const CAP_COLOR: &str = "devices.capabilities.color_setting";
const CAP_MODE: &str = "devices.capabilities.mode";

fn alisa_type(kind: ControlKind) -> &'static str {
    match kind {
        ControlKind::Socket => "devices.types.socket",
        ControlKind::Light | ControlKind::Dimmer | ControlKind::RgbSingle => "devices.types.light",
        ControlKind::Thermostat | ControlKind::AirCondition => "devices.types.thermostat",
        ControlKind::Lock | ControlKind::Blind | ControlKind::Gate => "devices.types.openable",
        ControlKind::Scene => "devices.types.other",
        ControlKind::Volume => "devices.types.media_device",
        ControlKind::TemperatureSensor => "devices.types.sensor",
    }
}

fn error_code(err: &DeviceError) -> &'static str {
    match err {
        DeviceError::EndpointNotFound(_) => "DEVICE_NOT_FOUND",
        DeviceError::UnsupportedDirective(_) => "INVALID_ACTION",
        DeviceError::InvalidValue(_) => "INVALID_VALUE",
        DeviceError::Backend(_) => "DEVICE_UNREACHABLE",
        DeviceError::InvalidConfig(_) => "INTERNAL_ERROR",
    }
}

/// Capability descriptors advertised for one control.
fn capability_descriptors(kind: ControlKind, config: &ControlConfig) -> Vec<Value> {
    let mut caps = Vec::new();
    match kind {
        ControlKind::Socket
        | ControlKind::Light
        | ControlKind::Lock
        | ControlKind::Blind
        | ControlKind::Scene => {
            caps.push(json!({ "type": CAP_ON_OFF }));
        }
        ControlKind::Dimmer => {
            caps.push(json!({ "type": CAP_ON_OFF }));
            caps.push(range_descriptor("brightness", 0.0, 100.0));
        }
        ControlKind::RgbSingle => {
            caps.push(json!({ "type": CAP_ON_OFF }));
            if config.brightness_id.is_some() {
                caps.push(range_descriptor("brightness", 0.0, 100.0));
            }
            caps.push(json!({
                "type": CAP_COLOR,
                "parameters": { "color_model": "hsv" }
            }));
        }
        ControlKind::Thermostat | ControlKind::AirCondition => {
            if kind == ControlKind::AirCondition {
                caps.push(json!({ "type": CAP_ON_OFF }));
            }
            let (min, max) = config
                .setpoint_range
                .map(|r| (r.min, r.max))
                .unwrap_or((5.0, 35.0));
            caps.push(range_descriptor("temperature", min, max));
            if config.mode_id.is_some() {
                let modes: Vec<Value> = config
                    .mode_states
                    .iter()
                    .map(|s| json!({ "value": s.name.to_ascii_lowercase() }))
                    .collect();
                caps.push(json!({
                    "type": CAP_MODE,
                    "parameters": { "instance": "thermostat", "modes": modes }
                }));
            }
        }
        ControlKind::Gate => {
            let modes: Vec<Value> = gate_mode_names(config)
                .iter()
                .map(|m| json!({ "value": m }))
                .collect();
            caps.push(json!({
                "type": CAP_MODE,
                "parameters": { "instance": "open", "modes": modes }
            }));
        }
        ControlKind::Volume => {
            caps.push(range_descriptor("volume", 0.0, 100.0));
            if config.mute_id.is_some() {
                caps.push(json!({ "type": CAP_ON_OFF, "parameters": { "instance": "mute" } }));
            }
        }
        ControlKind::TemperatureSensor => {}
    }
    caps
}

fn range_descriptor(instance: &str, min: f64, max: f64) -> Value {
    json!({
        "type": CAP_RANGE,
        "parameters": {
            "instance": instance,
            "range": { "min": min, "max": max, "precision": 1 }
        }
    })
}

fn gate_mode_names(config: &ControlConfig) -> Vec<String> {
    let modes = if config.modes.is_empty() {
        vec!["Position.Up".to_string(), "Position.Down".to_string()]
    } else {
        config.modes.clone()
    };
    modes
        .iter()
        .map(|m| m.rsplit('.').next().unwrap_or(m).to_ascii_lowercase())
        .collect()
}

/// Capability-object front-end over the shared device manager.
pub struct AlisaBridge {
    manager: Arc<DeviceManager>,
}

impl AlisaBridge {
    pub fn new(manager: Arc<DeviceManager>) -> Self {
        Self { manager }
    }

    /// Device listing.
    pub async fn device_list(&self, request_id: &str) -> Value {
        let devices: Vec<Value> = self
            .manager
            .summaries()
            .await
            .iter()
            .map(|summary| {
                let kind = summary
                    .controls
                    .first()
                    .map(|(kind, _)| *kind)
                    .unwrap_or(ControlKind::Socket);
                let mut caps = Vec::new();
                for (kind, config) in &summary.controls {
                    caps.extend(capability_descriptors(*kind, config));
                }
                json!({
                    "id": summary.id,
                    "name": summary.friendly_name,
                    "type": alisa_type(kind),
                    "capabilities": caps,
                })
            })
            .collect();
        info!(devices = devices.len(), "capability listing");
        json!({ "request_id": request_id, "payload": { "devices": devices } })
    }

    /// Query current state for a set of device ids.
    pub async fn query(&self, request_id: &str, payload: &Value) -> Value {
        let ids: Vec<&str> = payload
            .get("devices")
            .and_then(Value::as_array)
            .map(|devices| {
                devices
                    .iter()
                    .filter_map(|d| d.get("id").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let summaries = self.manager.summaries().await;
        let mut devices = Vec::new();
        for id in ids {
            let entry = match self.manager.snapshot_of(id).await {
                Ok(readings) => {
                    let summary = summaries.iter().find(|s| s.id == id);
                    json!({
                        "id": id,
                        "capabilities": capability_states(&readings, summary),
                    })
                }
                Err(err) => {
                    warn!(id, %err, "query failed");
                    json!({ "id": id, "error_code": error_code(&err), "error_message": err.to_string() })
                }
            };
            devices.push(entry);
        }
        json!({ "request_id": request_id, "payload": { "devices": devices } })
    }

    /// Apply requested capability states, one `action_result` each.
    pub async fn action(&self, request_id: &str, payload: &Value) -> Value {
        let summaries = self.manager.summaries().await;
        let mut devices = Vec::new();
        for device in payload
            .get("devices")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let Some(id) = device.get("id").and_then(Value::as_str) else {
                continue;
            };
            let summary = summaries.iter().find(|s| s.id == id);
            let mut results = Vec::new();
            for capability in device
                .get("capabilities")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                results.push(self.apply_capability(id, summary, capability).await);
            }
            devices.push(json!({ "id": id, "capabilities": results }));
        }
        json!({ "request_id": request_id, "payload": { "devices": devices } })
    }

    async fn apply_capability(
        &self,
        id: &str,
        summary: Option<&DeviceSummary>,
        capability: &Value,
    ) -> Value {
        let cap_type = capability.get("type").and_then(Value::as_str).unwrap_or_default();
        let state = capability.get("state").cloned().unwrap_or(Value::Null);
        let instance = state.get("instance").and_then(Value::as_str).unwrap_or_default();

        let result = match to_directive(id, summary, cap_type, instance, &state) {
            Ok(directive) => self.manager.execute_directive(&directive).await.map(|_| ()),
            Err(err) => Err(err),
        };
        let action_result = match result {
            Ok(()) => json!({ "status": "DONE" }),
            Err(err) => {
                warn!(id, cap_type, instance, %err, "action failed");
                json!({
                    "status": "ERROR",
                    "error_code": error_code(&err),
                    "error_message": err.to_string(),
                })
            }
        };
        json!({
            "type": cap_type,
            "state": { "instance": instance, "action_result": action_result }
        })
    }
}

/// Map one requested capability state onto a directive.
fn to_directive(
    id: &str,
    summary: Option<&DeviceSummary>,
    cap_type: &str,
    instance: &str,
    state: &Value,
) -> Result<Directive, DeviceError> {
    let invalid = |what: &str| DeviceError::InvalidValue(format!("{cap_type}/{instance}: {what}"));
    match (cap_type, instance) {
        (CAP_ON_OFF, "on") | (CAP_ON_OFF, "") => {
            let on = state
                .get("value")
                .and_then(Value::as_bool)
                .ok_or_else(|| invalid("expected a boolean"))?;
            // Locks map "on" to open; scenes map it to activation.
            if let Some(summary) = summary {
                if summary.controls.iter().any(|(k, _)| *k == ControlKind::Lock) {
                    let name = if on { "Unlock" } else { "Lock" };
                    return Ok(Directive::new(iface::LOCK, name).with_endpoint(id));
                }
                if summary.controls.iter().any(|(k, _)| *k == ControlKind::Scene) {
                    return Ok(Directive::new(iface::SCENE, "Activate").with_endpoint(id));
                }
            }
            let name = if on { "TurnOn" } else { "TurnOff" };
            Ok(Directive::new(iface::POWER, name).with_endpoint(id))
        }
        (CAP_ON_OFF, "mute") => {
            let mute = state
                .get("value")
                .and_then(Value::as_bool)
                .ok_or_else(|| invalid("expected a boolean"))?;
            Ok(Directive::new(iface::SPEAKER, "SetMute")
                .with_endpoint(id)
                .with_payload(json!({ "mute": mute })))
        }
        (CAP_RANGE, "brightness") => {
            let value = state
                .get("value")
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("expected a number"))?;
            Ok(Directive::new(iface::BRIGHTNESS, "SetBrightness")
                .with_endpoint(id)
                .with_payload(json!({ "brightness": value })))
        }
        (CAP_RANGE, "volume") => {
            let value = state
                .get("value")
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("expected a number"))?;
            Ok(Directive::new(iface::SPEAKER, "SetVolume")
                .with_endpoint(id)
                .with_payload(json!({ "volume": value })))
        }
        (CAP_RANGE, "temperature") => {
            let value = state
                .get("value")
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("expected a number"))?;
            Ok(Directive::new(iface::THERMOSTAT, "SetTargetTemperature")
                .with_endpoint(id)
                .with_payload(json!({ "targetSetpoint": { "value": value } })))
        }
        (CAP_COLOR, "hsv") => {
            let hue = state
                .get("value")
                .and_then(|v| v.get("h"))
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("expected an hsv object"))?;
            Ok(Directive::new(iface::COLOR, "SetColor")
                .with_endpoint(id)
                .with_payload(json!({ "color": { "hue": hue } })))
        }
        (CAP_MODE, "thermostat") => {
            let mode = state
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("expected a mode name"))?;
            Ok(Directive::new(iface::THERMOSTAT, "SetThermostatMode")
                .with_endpoint(id)
                .with_payload(json!({ "thermostatMode": { "value": mode.to_ascii_uppercase() } })))
        }
        (CAP_MODE, "open") => {
            let wanted = state
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("expected a mode name"))?;
            let config = summary
                .and_then(|s| {
                    s.controls
                        .iter()
                        .find(|(k, _)| *k == ControlKind::Gate)
                        .map(|(_, c)| c.clone())
                })
                .unwrap_or_default();
            let modes = if config.modes.is_empty() {
                vec!["Position.Up".to_string(), "Position.Down".to_string()]
            } else {
                config.modes.clone()
            };
            let mode = modes
                .iter()
                .find(|m| {
                    m.rsplit('.')
                        .next()
                        .map(|tail| tail.eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
                })
                .ok_or_else(|| invalid("unknown mode"))?;
            Ok(Directive::new(iface::MODE, "SetMode")
                .with_endpoint(id)
                .with_instance("Gate.Position")
                .with_payload(json!({ "mode": mode })))
        }
        _ => Err(DeviceError::UnsupportedDirective(format!(
            "{cap_type}/{instance}"
        ))),
    }
}

/// Translate protocol readings into capability state objects.
fn capability_states(readings: &[PropertyReading], summary: Option<&DeviceSummary>) -> Vec<Value> {
    let mut out = Vec::new();
    for reading in readings {
        let entry = match reading.name.as_str() {
            "powerState" => Some(json!({
                "type": CAP_ON_OFF,
                "state": { "instance": "on", "value": reading.value == json!("ON") }
            })),
            "lockState" => Some(json!({
                "type": CAP_ON_OFF,
                "state": { "instance": "on", "value": reading.value == json!("UNLOCKED") }
            })),
            "brightness" => Some(json!({
                "type": CAP_RANGE,
                "state": { "instance": "brightness", "value": reading.value }
            })),
            "volume" => Some(json!({
                "type": CAP_RANGE,
                "state": { "instance": "volume", "value": reading.value }
            })),
            "muted" => Some(json!({
                "type": CAP_ON_OFF,
                "state": { "instance": "mute", "value": reading.value }
            })),
            "targetSetpoint" => reading.value.get("value").map(|v| {
                json!({
                    "type": CAP_RANGE,
                    "state": { "instance": "temperature", "value": v }
                })
            }),
            "thermostatMode" => reading.value.as_str().map(|mode| {
                json!({
                    "type": CAP_MODE,
                    "state": { "instance": "thermostat", "value": mode.to_ascii_lowercase() }
                })
            }),
            "color" => reading.value.get("hue").map(|hue| {
                json!({
                    "type": CAP_COLOR,
                    "state": { "instance": "hsv", "value": { "h": hue, "s": 100, "v": 100 } }
                })
            }),
            "mode" => reading.value.as_str().and_then(|mode| {
                summary?
                    .controls
                    .iter()
                    .find(|(k, _)| *k == ControlKind::Gate)?;
                let tail = mode.rsplit('.').next().unwrap_or(mode).to_ascii_lowercase();
                Some(json!({
                    "type": CAP_MODE,
                    "state": { "instance": "open", "value": tail }
                }))
            }),
            _ => None,
        };
        out.extend(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voxbridge_alexa::CollectingProxy;
    use voxbridge_core::{MemoryGateway, StateValue};
    use voxbridge_devices::{Control, Device, RateLimiter, ValueRange};

    async fn bridge() -> (Arc<MemoryGateway>, AlisaBridge) {
        let gateway = Arc::new(MemoryGateway::new());
        let manager = Arc::new(DeviceManager::new(
            gateway.clone(),
            Arc::new(CollectingProxy::new()),
            RateLimiter::new(60, Duration::from_secs(3600)),
        ));
        manager
            .add_device(
                Device::new("dim.hall", "Hallway Dimmer").with_control(
                    Control::new(
                        ControlKind::Dimmer,
                        ControlConfig {
                            set_id: Some("dim.level".into()),
                            power_set_id: Some("dim.on".into()),
                            range: Some(ValueRange::new(500.0, 1000.0)),
                            ..Default::default()
                        },
                    )
                    .unwrap(),
                ),
            )
            .await;
        manager
            .add_device(
                Device::new("lock.front", "Front Door").with_control(
                    Control::new(
                        ControlKind::Lock,
                        ControlConfig::default().with_set_id("lock.state"),
                    )
                    .unwrap(),
                ),
            )
            .await;
        (gateway, AlisaBridge::new(manager))
    }

    #[tokio::test]
    async fn test_device_list_capabilities() {
        let (_, bridge) = bridge().await;
        let reply = bridge.device_list("r1").await;
        let devices = reply["payload"]["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["type"], "devices.types.light");
        let caps = devices[0]["capabilities"].as_array().unwrap();
        assert_eq!(caps[0]["type"], CAP_ON_OFF);
        assert_eq!(caps[1]["type"], CAP_RANGE);
        assert_eq!(caps[1]["parameters"]["instance"], "brightness");
        assert_eq!(devices[1]["type"], "devices.types.openable");
    }

    #[tokio::test]
    async fn test_action_result_done() {
        let (gateway, bridge) = bridge().await;
        let reply = bridge
            .action(
                "r2",
                &json!({
                    "devices": [{
                        "id": "dim.hall",
                        "capabilities": [{
                            "type": CAP_RANGE,
                            "state": { "instance": "brightness", "value": 75 }
                        }]
                    }]
                }),
            )
            .await;
        let result = &reply["payload"]["devices"][0]["capabilities"][0];
        assert_eq!(result["state"]["action_result"]["status"], "DONE");
        assert_eq!(
            gateway.last_write("dim.level").await,
            Some(StateValue::Number(875.0))
        );
        // Coupled power write went out too.
        assert_eq!(gateway.last_write("dim.on").await, Some(StateValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_action_result_error_code() {
        let (_, bridge) = bridge().await;
        let reply = bridge
            .action(
                "r3",
                &json!({
                    "devices": [{
                        "id": "dim.hall",
                        "capabilities": [{
                            "type": CAP_RANGE,
                            "state": { "instance": "temperature", "value": 21 }
                        }]
                    }]
                }),
            )
            .await;
        let result = &reply["payload"]["devices"][0]["capabilities"][0]["state"]["action_result"];
        assert_eq!(result["status"], "ERROR");
        assert_eq!(result["error_code"], "INVALID_ACTION");
    }

    #[tokio::test]
    async fn test_lock_on_off_maps_to_unlock() {
        let (gateway, bridge) = bridge().await;
        let reply = bridge
            .action(
                "r4",
                &json!({
                    "devices": [{
                        "id": "lock.front",
                        "capabilities": [{
                            "type": CAP_ON_OFF,
                            "state": { "instance": "on", "value": true }
                        }]
                    }]
                }),
            )
            .await;
        let result = &reply["payload"]["devices"][0]["capabilities"][0]["state"]["action_result"];
        assert_eq!(result["status"], "DONE");
        assert_eq!(
            gateway.last_write("lock.state").await,
            Some(StateValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_query_state() {
        let (gateway, bridge) = bridge().await;
        gateway.seed("dim.level", 900.0).await;
        gateway.seed("dim.on", true).await;
        let reply = bridge
            .query("r5", &json!({ "devices": [{ "id": "dim.hall" }] }))
            .await;
        let caps = reply["payload"]["devices"][0]["capabilities"].as_array().unwrap();
        let on = caps.iter().find(|c| c["type"] == CAP_ON_OFF).unwrap();
        assert_eq!(on["state"]["value"], json!(true));
        let brightness = caps.iter().find(|c| c["type"] == CAP_RANGE).unwrap();
        assert_eq!(brightness["state"]["value"], json!(80.0));
    }
}
