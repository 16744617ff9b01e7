//! SYNC/QUERY/EXECUTE webhook front-end.
//!
//! A thin translator: requests are mapped onto directives and snapshots of
//! the shared [`DeviceManager`], so every write runs the same range and
//! coupling rules as the main protocol. Device listings carry the backend
//! ids in `customData.{get_,set_}<attr>` for round-tripping.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use voxbridge_alexa::Directive;
use voxbridge_devices::{iface, ControlConfig, ControlKind, DeviceError, DeviceManager, DeviceSummary};

const INTENT_SYNC: &str = "action.devices.SYNC";
const INTENT_QUERY: &str = "action.devices.QUERY";
const INTENT_EXECUTE: &str = "action.devices.EXECUTE";

fn device_type(kind: ControlKind) -> &'static str {
    match kind {
        ControlKind::Socket => "action.devices.types.OUTLET",
        ControlKind::Light | ControlKind::Dimmer | ControlKind::RgbSingle => {
            "action.devices.types.LIGHT"
        }
        ControlKind::Thermostat | ControlKind::AirCondition => "action.devices.types.THERMOSTAT",
        ControlKind::Lock => "action.devices.types.LOCK",
        ControlKind::Blind => "action.devices.types.BLINDS",
        ControlKind::Gate => "action.devices.types.GARAGE",
        ControlKind::Scene => "action.devices.types.SCENE",
        ControlKind::Volume => "action.devices.types.SPEAKER",
        ControlKind::TemperatureSensor => "action.devices.types.SENSOR",
    }
}

fn traits(kind: ControlKind) -> &'static [&'static str] {
    match kind {
        ControlKind::Socket | ControlKind::Light => &["action.devices.traits.OnOff"],
        ControlKind::Dimmer => &[
            "action.devices.traits.OnOff",
            "action.devices.traits.Brightness",
        ],
        ControlKind::RgbSingle => &[
            "action.devices.traits.OnOff",
            "action.devices.traits.Brightness",
            "action.devices.traits.ColorSetting",
        ],
        ControlKind::Thermostat | ControlKind::AirCondition => {
            &["action.devices.traits.TemperatureSetting"]
        }
        ControlKind::Lock => &["action.devices.traits.LockUnlock"],
        ControlKind::Blind | ControlKind::Gate => &["action.devices.traits.OpenClose"],
        ControlKind::Scene => &["action.devices.traits.Scene"],
        ControlKind::Volume => &["action.devices.traits.Volume"],
        ControlKind::TemperatureSensor => &["action.devices.traits.TemperatureSetting"],
    }
}

/// Backend ids of every configured role, keyed `get_<attr>`/`set_<attr>`.
fn custom_data(controls: &[(ControlKind, ControlConfig)]) -> Value {
    let mut map = Map::new();
    for (_, config) in controls {
        let pairs: [(&str, &Option<String>); 9] = [
            ("set_state", &config.set_id),
            ("get_state", &config.get_id),
            ("set_power", &config.power_set_id),
            ("get_power", &config.power_get_id),
            ("set_brightness", &config.brightness_id),
            ("set_ct", &config.ct_id),
            ("set_open", &config.open_id),
            ("set_mute", &config.mute_id),
            ("set_mode", &config.mode_id),
        ];
        for (key, id) in pairs {
            if let Some(id) = id {
                map.entry(key.to_string()).or_insert_with(|| json!(id));
            }
        }
    }
    Value::Object(map)
}

fn error_code(err: &DeviceError) -> &'static str {
    match err {
        DeviceError::EndpointNotFound(_) => "deviceNotFound",
        DeviceError::UnsupportedDirective(_) => "functionNotSupported",
        DeviceError::InvalidValue(_) => "valueOutOfRange",
        DeviceError::Backend(_) => "deviceOffline",
        DeviceError::InvalidConfig(_) => "hardError",
    }
}

/// Webhook front-end over the shared device manager.
pub struct GhomeBridge {
    manager: Arc<DeviceManager>,
}

impl GhomeBridge {
    pub fn new(manager: Arc<DeviceManager>) -> Self {
        Self { manager }
    }

    /// Handle one webhook request envelope and render the reply.
    pub async fn handle(&self, request: &Value) -> Value {
        let request_id = request
            .get("requestId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(input) = request
            .get("inputs")
            .and_then(Value::as_array)
            .and_then(|inputs| inputs.first())
        else {
            warn!("webhook request without inputs");
            return json!({ "requestId": request_id, "payload": { "errorCode": "protocolError" } });
        };
        let intent = input.get("intent").and_then(Value::as_str).unwrap_or_default();
        let payload = input.get("payload").cloned().unwrap_or(Value::Null);
        info!(intent, "webhook request");
        match intent {
            INTENT_SYNC => self.sync(&request_id).await,
            INTENT_QUERY => self.query(&request_id, &payload).await,
            INTENT_EXECUTE => self.execute(&request_id, &payload).await,
            _ => json!({ "requestId": request_id, "payload": { "errorCode": "notSupported" } }),
        }
    }

    async fn sync(&self, request_id: &str) -> Value {
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
                let mut all_traits: Vec<&str> = Vec::new();
                for (kind, _) in &summary.controls {
                    for t in traits(*kind) {
                        if !all_traits.contains(t) {
                            all_traits.push(*t);
                        }
                    }
                }
                json!({
                    "id": summary.id,
                    "type": device_type(kind),
                    "traits": all_traits,
                    "name": { "name": summary.friendly_name },
                    "willReportState": false,
                    "customData": custom_data(&summary.controls),
                })
            })
            .collect();
        json!({
            "requestId": request_id,
            "payload": { "agentUserId": "voxbridge", "devices": devices }
        })
    }

    async fn query(&self, request_id: &str, payload: &Value) -> Value {
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
        let mut states = Map::new();
        for id in ids {
            let state = match self.manager.snapshot_of(id).await {
                Ok(readings) => {
                    let summary = summaries.iter().find(|s| s.id == id);
                    let mut state = google_state(&readings, summary);
                    state.insert("online".to_string(), json!(true));
                    state.insert("status".to_string(), json!("SUCCESS"));
                    Value::Object(state)
                }
                Err(err) => {
                    warn!(id, %err, "query failed");
                    json!({ "online": false, "status": "ERROR", "errorCode": error_code(&err) })
                }
            };
            states.insert(id.to_string(), state);
        }
        json!({ "requestId": request_id, "payload": { "devices": states } })
    }

    async fn execute(&self, request_id: &str, payload: &Value) -> Value {
        let summaries = self.manager.summaries().await;
        let mut commands = Vec::new();
        for command in payload
            .get("commands")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let device_ids: Vec<&str> = command
                .get("devices")
                .and_then(Value::as_array)
                .map(|devices| {
                    devices
                        .iter()
                        .filter_map(|d| d.get("id").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            let executions = command
                .get("execution")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for id in device_ids {
                let summary = summaries.iter().find(|s| s.id == id);
                for execution in &executions {
                    let name = execution
                        .get("command")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let params = execution.get("params").cloned().unwrap_or(Value::Null);
                    commands.push(self.run_command(id, summary, name, &params).await);
                }
            }
        }
        json!({ "requestId": request_id, "payload": { "commands": commands } })
    }

    async fn run_command(
        &self,
        id: &str,
        summary: Option<&DeviceSummary>,
        command: &str,
        params: &Value,
    ) -> Value {
        let result = match to_directive(id, summary, command, params) {
            Ok(directive) => self.manager.execute_directive(&directive).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(outcome) => {
                let mut states = google_state(&outcome.reported, summary);
                states.insert("online".to_string(), json!(true));
                json!({ "ids": [id], "status": "SUCCESS", "states": states })
            }
            Err(err) => {
                warn!(id, command, %err, "execute failed");
                json!({ "ids": [id], "status": "ERROR", "errorCode": error_code(&err) })
            }
        }
    }
}

/// Map one webhook command onto a directive.
fn to_directive(
    id: &str,
    summary: Option<&DeviceSummary>,
    command: &str,
    params: &Value,
) -> Result<Directive, DeviceError> {
    let unsupported = || DeviceError::UnsupportedDirective(command.to_string());
    match command {
        "action.devices.commands.OnOff" => {
            let on = params.get("on").and_then(Value::as_bool).ok_or_else(unsupported)?;
            let name = if on { "TurnOn" } else { "TurnOff" };
            Ok(Directive::new(iface::POWER, name).with_endpoint(id))
        }
        "action.devices.commands.BrightnessAbsolute" => {
            let brightness = params
                .get("brightness")
                .and_then(Value::as_f64)
                .ok_or_else(unsupported)?;
            Ok(Directive::new(iface::BRIGHTNESS, "SetBrightness")
                .with_endpoint(id)
                .with_payload(json!({ "brightness": brightness })))
        }
        "action.devices.commands.ThermostatTemperatureSetpoint" => {
            let setpoint = params
                .get("thermostatTemperatureSetpoint")
                .and_then(Value::as_f64)
                .ok_or_else(unsupported)?;
            Ok(Directive::new(iface::THERMOSTAT, "SetTargetTemperature")
                .with_endpoint(id)
                .with_payload(json!({ "targetSetpoint": { "value": setpoint } })))
        }
        "action.devices.commands.ThermostatSetMode" => {
            let mode = params
                .get("thermostatMode")
                .and_then(Value::as_str)
                .ok_or_else(unsupported)?;
            Ok(Directive::new(iface::THERMOSTAT, "SetThermostatMode")
                .with_endpoint(id)
                .with_payload(json!({ "thermostatMode": { "value": mode.to_ascii_uppercase() } })))
        }
        "action.devices.commands.LockUnlock" => {
            let lock = params.get("lock").and_then(Value::as_bool).ok_or_else(unsupported)?;
            let name = if lock { "Lock" } else { "Unlock" };
            Ok(Directive::new(iface::LOCK, name).with_endpoint(id))
        }
        "action.devices.commands.ActivateScene" => {
            Ok(Directive::new(iface::SCENE, "Activate").with_endpoint(id))
        }
        "action.devices.commands.OpenClose" => {
            let percent = params
                .get("openPercent")
                .and_then(Value::as_f64)
                .ok_or_else(unsupported)?;
            // Gates are binary mode devices; blinds take the raw percentage.
            if let Some(summary) = summary {
                if let Some((_, config)) =
                    summary.controls.iter().find(|(kind, _)| *kind == ControlKind::Gate)
                {
                    let modes = gate_modes(config);
                    let mode = if percent > 0.0 { modes.0 } else { modes.1 };
                    return Ok(Directive::new(iface::MODE, "SetMode")
                        .with_endpoint(id)
                        .with_instance("Gate.Position")
                        .with_payload(json!({ "mode": mode })));
                }
            }
            Ok(Directive::new(iface::PERCENTAGE, "SetPercentage")
                .with_endpoint(id)
                .with_payload(json!({ "percentage": percent })))
        }
        _ => Err(unsupported()),
    }
}

fn gate_modes(config: &ControlConfig) -> (String, String) {
    let open = config
        .modes
        .first()
        .cloned()
        .unwrap_or_else(|| "Position.Up".to_string());
    let closed = config
        .modes
        .last()
        .cloned()
        .unwrap_or_else(|| "Position.Down".to_string());
    (open, closed)
}

/// Translate protocol readings into the webhook state object.
fn google_state(
    readings: &[voxbridge_alexa::PropertyReading],
    summary: Option<&DeviceSummary>,
) -> Map<String, Value> {
    let mut state = Map::new();
    for reading in readings {
        match reading.name.as_str() {
            "powerState" => {
                state.insert("on".to_string(), json!(reading.value == json!("ON")));
            }
            "brightness" => {
                state.insert("brightness".to_string(), reading.value.clone());
            }
            "targetSetpoint" => {
                if let Some(v) = reading.value.get("value") {
                    state.insert("thermostatTemperatureSetpoint".to_string(), v.clone());
                }
            }
            "temperature" => {
                if let Some(v) = reading.value.get("value") {
                    state.insert("thermostatTemperatureAmbient".to_string(), v.clone());
                }
            }
            "thermostatMode" => {
                if let Some(mode) = reading.value.as_str() {
                    state.insert(
                        "thermostatMode".to_string(),
                        json!(mode.to_ascii_lowercase()),
                    );
                }
            }
            "lockState" => {
                state.insert("isLocked".to_string(), json!(reading.value == json!("LOCKED")));
            }
            "percentage" => {
                state.insert("openPercent".to_string(), reading.value.clone());
            }
            "mode" => {
                if let (Some(summary), Some(mode)) = (summary, reading.value.as_str()) {
                    if let Some((_, config)) =
                        summary.controls.iter().find(|(kind, _)| *kind == ControlKind::Gate)
                    {
                        let (open, _) = gate_modes(config);
                        let percent = if mode == open { 100 } else { 0 };
                        state.insert("openPercent".to_string(), json!(percent));
                    }
                }
            }
            "volume" => {
                state.insert("currentVolume".to_string(), reading.value.clone());
            }
            "muted" => {
                state.insert("isMuted".to_string(), reading.value.clone());
            }
            "color" => {
                if let Some(hue) = reading.value.get("hue") {
                    state.insert(
                        "color".to_string(),
                        json!({ "spectrumHsv": { "hue": hue, "saturation": 1.0, "value": 1.0 } }),
                    );
                }
            }
            "colorTemperatureInKelvin" => {
                state.insert(
                    "color".to_string(),
                    json!({ "temperatureK": reading.value }),
                );
            }
            _ => {}
        }
    }
    state
}
