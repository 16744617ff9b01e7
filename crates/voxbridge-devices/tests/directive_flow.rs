//! End-to-end directive flows through the device manager: coupling rules,
//! discrete color temperature stepping, change-report fan-out and the
//! response envelopes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use voxbridge_alexa::CollectingProxy;
use voxbridge_core::{MemoryGateway, StateUpdate, StateValue};
use voxbridge_devices::{
    Control, ControlConfig, ControlKind, Device, DeviceManager, ModeState, RateLimiter, ValueRange,
};

fn dimmer() -> Device {
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
    )
}

fn rgb_light() -> Device {
    Device::new("rgb.desk", "Desk Light").with_control(
        Control::new(
            ControlKind::RgbSingle,
            ControlConfig {
                set_id: Some("rgb.hue".into()),
                power_set_id: Some("rgb.on".into()),
                ct_id: Some("rgb.ct".into()),
                ct_steps: vec![2200.0, 2700.0, 4000.0, 6500.0],
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

fn air_condition() -> Device {
    Device::new("ac.bedroom", "Bedroom AC").with_control(
        Control::new(
            ControlKind::AirCondition,
            ControlConfig {
                set_id: Some("ac.setpoint".into()),
                power_set_id: Some("ac.on".into()),
                mode_id: Some("ac.mode".into()),
                setpoint_range: Some(ValueRange::new(16.0, 30.0)),
                mode_states: vec![
                    ModeState { value: 0.0, name: "AUTO".into() },
                    ModeState { value: 1.0, name: "COOL".into() },
                    ModeState { value: 2.0, name: "HEAT".into() },
                ],
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

fn front_door() -> Device {
    Device::new("lock.front", "Front Door").with_control(
        Control::new(
            ControlKind::Lock,
            ControlConfig {
                set_id: Some("door.lock".into()),
                open_id: Some("door.open".into()),
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

fn speaker() -> Device {
    Device::new("spk.living", "Living Room Speaker").with_control(
        Control::new(
            ControlKind::Volume,
            ControlConfig {
                set_id: Some("spk.volume".into()),
                mute_id: Some("spk.mute".into()),
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

async fn setup(devices: Vec<Device>) -> (Arc<MemoryGateway>, Arc<CollectingProxy>, DeviceManager) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let gateway = Arc::new(MemoryGateway::new());
    let proxy = Arc::new(CollectingProxy::new());
    let manager = DeviceManager::new(
        gateway.clone(),
        proxy.clone(),
        RateLimiter::new(60, Duration::from_secs(3600)),
    );
    for device in devices {
        manager.add_device(device).await;
    }
    (gateway, proxy, manager)
}

fn directive(namespace: &str, name: &str, endpoint: &str, payload: Value) -> Value {
    json!({
        "directive": {
            "header": {
                "namespace": namespace,
                "name": name,
                "payloadVersion": "3",
                "messageId": "m-1",
                "correlationToken": "tok-1"
            },
            "endpoint": { "endpointId": endpoint },
            "payload": payload
        }
    })
}

fn context_properties(reply: &Value) -> Vec<(String, Value)> {
    reply["context"]["properties"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["name"].as_str().unwrap().to_string(), p["value"].clone()))
        .collect()
}

#[tokio::test]
async fn test_set_brightness_writes_raw_and_couples_power() {
    let (gateway, _, manager) = setup(vec![dimmer()]).await;
    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.BrightnessController",
            "SetBrightness",
            "dim.hall",
            json!({ "brightness": 75 }),
        ))
        .await;

    assert_eq!(reply["event"]["header"]["name"], "Response");
    assert_eq!(reply["event"]["header"]["correlationToken"], "tok-1");
    let props = context_properties(&reply);
    assert_eq!(
        props,
        vec![
            ("powerState".to_string(), json!("ON")),
            ("brightness".to_string(), json!(75.0)),
        ]
    );
    assert_eq!(
        gateway.last_write("dim.level").await,
        Some(StateValue::Number(875.0))
    );
    assert_eq!(gateway.last_write("dim.on").await, Some(StateValue::Bool(true)));
}

#[tokio::test]
async fn test_turn_off_reports_only_power_and_keeps_level() {
    let (gateway, _, manager) = setup(vec![dimmer()]).await;
    manager
        .handle_alexa_event(&directive(
            "Alexa.BrightnessController",
            "SetBrightness",
            "dim.hall",
            json!({ "brightness": 75 }),
        ))
        .await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.PowerController",
            "TurnOff",
            "dim.hall",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("powerState".to_string(), json!("OFF"))]);
    // The stored raw level is untouched by the off command.
    assert_eq!(
        gateway.last_write("dim.level").await,
        Some(StateValue::Number(875.0))
    );
}

#[tokio::test]
async fn test_turn_on_restores_level_from_raw() {
    let (gateway, _, manager) = setup(vec![dimmer()]).await;
    gateway.seed("dim.level", 900.0).await;
    gateway.seed("dim.on", false).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.PowerController",
            "TurnOn",
            "dim.hall",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(
        props,
        vec![
            ("powerState".to_string(), json!("ON")),
            ("brightness".to_string(), json!(80.0)),
        ]
    );
}

#[tokio::test]
async fn test_ct_step_round_trip() {
    let (gateway, _, manager) = setup(vec![rgb_light()]).await;
    gateway.seed("rgb.ct", 2200.0).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.ColorTemperatureController",
            "IncreaseColorTemperature",
            "rgb.desk",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("colorTemperatureInKelvin".to_string(), json!(2700.0))]);
    assert_eq!(
        gateway.last_write("rgb.ct").await,
        Some(StateValue::Number(2700.0))
    );

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.ColorTemperatureController",
            "DecreaseColorTemperature",
            "rgb.desk",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("colorTemperatureInKelvin".to_string(), json!(2200.0))]);
}

#[tokio::test]
async fn test_color_then_state_report_skips_ct() {
    let (gateway, _, manager) = setup(vec![rgb_light()]).await;
    gateway.seed("rgb.on", true).await;
    gateway.seed("rgb.ct", 2700.0).await;

    manager
        .handle_alexa_event(&directive(
            "Alexa.ColorController",
            "SetColor",
            "rgb.desk",
            json!({ "color": { "hue": 120.0, "saturation": 0.8, "brightness": 0.5 } }),
        ))
        .await;

    let reply = manager
        .handle_alexa_event(&directive("Alexa", "ReportState", "rgb.desk", json!({})))
        .await;
    assert_eq!(reply["event"]["header"]["name"], "StateReport");
    let props = context_properties(&reply);
    assert!(props.iter().any(|(name, _)| name == "color"));
    // Color was written last; color temperature stays out of the snapshot.
    assert!(!props.iter().any(|(name, _)| name == "colorTemperatureInKelvin"));
    assert_eq!(props.last().unwrap().0, "connectivity");
}

#[tokio::test]
async fn test_ac_power_off_couples_mode() {
    let (gateway, _, manager) = setup(vec![air_condition()]).await;
    gateway.seed("ac.mode", 1.0).await;
    gateway.seed("ac.on", true).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.PowerController",
            "TurnOff",
            "ac.bedroom",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(
        props,
        vec![
            ("powerState".to_string(), json!("OFF")),
            ("thermostatMode".to_string(), json!("OFF")),
        ]
    );
    assert_eq!(gateway.last_write("ac.on").await, Some(StateValue::Bool(false)));
}

#[tokio::test]
async fn test_thermostat_setpoint_adjust() {
    let (gateway, _, manager) = setup(vec![air_condition()]).await;
    gateway.seed("ac.setpoint", 21.0).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.ThermostatController",
            "AdjustTargetTemperature",
            "ac.bedroom",
            json!({ "targetSetpointDelta": { "value": 2.0, "scale": "CELSIUS" } }),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(
        props,
        vec![(
            "targetSetpoint".to_string(),
            json!({ "value": 23.0, "scale": "CELSIUS" })
        )]
    );
    assert_eq!(
        gateway.last_write("ac.setpoint").await,
        Some(StateValue::Number(23.0))
    );
}

#[tokio::test]
async fn test_invalid_mode_rejected() {
    let (gateway, _, manager) = setup(vec![air_condition()]).await;
    gateway.seed("ac.on", true).await;
    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.ThermostatController",
            "SetThermostatMode",
            "ac.bedroom",
            json!({ "thermostatMode": { "value": "TURBO" } }),
        ))
        .await;
    assert_eq!(reply["event"]["header"]["name"], "ErrorResponse");
    assert_eq!(reply["event"]["payload"]["type"], "INVALID_VALUE");
}

#[tokio::test]
async fn test_unlock_pulses_open_id_and_keeps_lock_id() {
    let (gateway, _, manager) = setup(vec![front_door()]).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.LockController",
            "Unlock",
            "lock.front",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("lockState".to_string(), json!("UNLOCKED"))]);
    // Unlock goes out as a momentary pulse on the open id; the lock flag
    // itself is never written.
    assert_eq!(
        gateway.last_write("door.open").await,
        Some(StateValue::Bool(true))
    );
    assert_eq!(gateway.last_write("door.lock").await, None);

    // Locking still writes the lock flag directly.
    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.LockController",
            "Lock",
            "lock.front",
            json!({}),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("lockState".to_string(), json!("LOCKED"))]);
    assert_eq!(
        gateway.last_write("door.lock").await,
        Some(StateValue::Bool(true))
    );
}

#[tokio::test]
async fn test_set_volume_and_mute() {
    let (gateway, _, manager) = setup(vec![speaker()]).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.Speaker",
            "SetVolume",
            "spk.living",
            json!({ "volume": 40 }),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("volume".to_string(), json!(40.0))]);
    assert_eq!(
        gateway.last_write("spk.volume").await,
        Some(StateValue::Number(40.0))
    );

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.Speaker",
            "SetMute",
            "spk.living",
            json!({ "mute": true }),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("muted".to_string(), json!(true))]);
    assert_eq!(
        gateway.last_write("spk.mute").await,
        Some(StateValue::Bool(true))
    );
}

#[tokio::test]
async fn test_adjust_volume_clamps_to_percentage_bounds() {
    let (gateway, _, manager) = setup(vec![speaker()]).await;
    gateway.seed("spk.volume", 40.0).await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.Speaker",
            "AdjustVolume",
            "spk.living",
            json!({ "volume": -50 }),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("volume".to_string(), json!(0.0))]);
    assert_eq!(
        gateway.last_write("spk.volume").await,
        Some(StateValue::Number(0.0))
    );

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.Speaker",
            "AdjustVolume",
            "spk.living",
            json!({ "volume": 150 }),
        ))
        .await;
    let props = context_properties(&reply);
    assert_eq!(props, vec![("volume".to_string(), json!(100.0))]);
    assert_eq!(
        gateway.last_write("spk.volume").await,
        Some(StateValue::Number(100.0))
    );
}

#[tokio::test]
async fn test_scene_activation_has_no_context() {
    let (gateway, _, manager) = setup(vec![dimmer()]).await;
    manager
        .add_device(
            Device::new("scene.movie", "Movie Time").with_control(
                Control::new(ControlKind::Scene, ControlConfig::default().with_set_id("scene.go"))
                    .unwrap(),
            ),
        )
        .await;

    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.SceneController",
            "Activate",
            "scene.movie",
            json!({}),
        ))
        .await;
    assert!(reply.get("context").is_none());
    assert_eq!(reply["event"]["header"]["namespace"], "Alexa.SceneController");
    assert_eq!(reply["event"]["header"]["name"], "ActivationStarted");
    assert_eq!(
        reply["event"]["payload"]["cause"]["type"],
        "VOICE_INTERACTION"
    );
    assert_eq!(gateway.last_write("scene.go").await, Some(StateValue::Bool(true)));

    // Ordinary responses keep their context block.
    let reply = manager
        .handle_alexa_event(&directive(
            "Alexa.PowerController",
            "TurnOn",
            "dim.hall",
            json!({}),
        ))
        .await;
    assert!(reply.get("context").is_some());
}

#[tokio::test]
async fn test_discovery_counts_base_interface() {
    let (_, _, manager) = setup(vec![dimmer(), rgb_light()]).await;
    let reply = manager
        .handle_alexa_event(&json!({
            "directive": {
                "header": { "namespace": "Alexa.Discovery", "name": "Discover", "payloadVersion": "3" },
                "payload": {}
            }
        }))
        .await;
    let endpoints = reply["event"]["payload"]["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 2);
    for endpoint in endpoints {
        let caps = endpoint["capabilities"].as_array().unwrap();
        // The implicit base interface adds one to the capability count.
        assert_eq!(caps[0]["interface"], "Alexa");
        assert!(caps.len() >= 3);
        assert!(caps.iter().all(|c| c["type"] == "AlexaInterface" && c["version"] == "3"));
    }
}

#[tokio::test]
async fn test_backend_power_change_splits_report() {
    let (gateway, proxy, manager) = setup(vec![dimmer()]).await;
    gateway.seed("dim.level", 875.0).await;

    manager
        .handle_state_update("dim.on", &StateUpdate::acked(false))
        .await;
    let events = proxy.events().await;
    assert_eq!(events.len(), 1);
    let report = &events[0];
    assert_eq!(report["event"]["header"]["name"], "ChangeReport");
    assert_eq!(
        report["event"]["payload"]["change"]["cause"]["type"],
        "PHYSICAL_INTERACTION"
    );
    let changed = report["event"]["payload"]["change"]["properties"].as_array().unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0]["name"], "powerState");
    assert_eq!(changed[0]["value"], "OFF");
    // Brightness rides along unchanged in the context block.
    let unchanged = report["context"]["properties"].as_array().unwrap();
    assert!(unchanged.iter().any(|p| p["name"] == "brightness" && p["value"] == json!(75.0)));
}

#[tokio::test]
async fn test_rate_limited_change_is_dropped_silently() {
    let gateway = Arc::new(MemoryGateway::new());
    let proxy = Arc::new(CollectingProxy::new());
    let manager = DeviceManager::new(
        gateway.clone(),
        proxy.clone(),
        RateLimiter::new(2, Duration::from_secs(3600)),
    );
    manager.add_device(dimmer()).await;
    gateway.seed("dim.on", true).await;

    for raw in [600.0, 700.0, 800.0] {
        manager
            .handle_state_update("dim.level", &StateUpdate::acked(raw))
            .await;
    }
    assert_eq!(proxy.len().await, 2);
}
