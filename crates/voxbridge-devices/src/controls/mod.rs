//! Control catalog: concrete device archetypes.
//!
//! A control is built once from a declarative [`ControlConfig`] (backend id
//! per logical role, ranges, mode dictionaries) and is structurally
//! immutable afterwards; only property caches mutate. Archetypes form a
//! closed enumeration selected at construction time.

mod execute;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use voxbridge_alexa::{CapabilityDescriptor, PropertyReading};
use voxbridge_core::{StateGateway, StateValue};

use crate::capability::{iface, prop, Capability};
use crate::error::DeviceError;
use crate::property::{Property, Units, ValueRange};

pub use execute::Outcome;

/// Thermostat mode vocabulary accepted on the wire.
pub const THERMOSTAT_MODES: &[&str] = &["AUTO", "COOL", "HEAT", "ECO", "OFF"];

/// Device archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Socket,
    Light,
    Dimmer,
    RgbSingle,
    Thermostat,
    AirCondition,
    Lock,
    Blind,
    Gate,
    Scene,
    Volume,
    TemperatureSensor,
}

impl ControlKind {
    /// Default protocol display category for the archetype.
    pub fn display_category(&self) -> &'static str {
        match self {
            Self::Socket => "SMARTPLUG",
            Self::Light | Self::Dimmer | Self::RgbSingle => "LIGHT",
            Self::Thermostat | Self::AirCondition => "THERMOSTAT",
            Self::Lock => "SMARTLOCK",
            Self::Blind => "INTERIOR_BLIND",
            Self::Gate => "GARAGE_DOOR",
            Self::Scene => "SCENE_TRIGGER",
            Self::Volume => "SPEAKER",
            Self::TemperatureSensor => "TEMPERATURE_SENSOR",
        }
    }
}

/// Thermostat mode dictionary entry: backend value to mode name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub value: f64,
    pub name: String,
}

/// Declarative per-device configuration: backend id per logical role plus
/// ranges and vocabularies. Unused roles stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Primary SET id (level, setpoint, hue, lock flag, scene trigger, ...).
    pub set_id: Option<String>,
    /// Dedicated ACTUAL id read instead of the set id.
    pub get_id: Option<String>,
    /// Separate power SET id, when the device has one.
    pub power_set_id: Option<String>,
    /// Separate power ACTUAL id.
    pub power_get_id: Option<String>,
    /// Combined brightness id for color devices.
    pub brightness_id: Option<String>,
    /// Color temperature id for color devices.
    pub ct_id: Option<String>,
    /// Momentary open-pulse id for locks.
    pub open_id: Option<String>,
    /// Mute id for speakers.
    pub mute_id: Option<String>,
    /// Mode id for thermostats.
    pub mode_id: Option<String>,
    /// Raw backend range of the primary value (percentage scaling).
    pub range: Option<ValueRange>,
    /// Allowed setpoint range for thermostats (clamping, no scaling).
    pub setpoint_range: Option<ValueRange>,
    /// Discrete color temperature steps in Kelvin, ascending.
    pub ct_steps: Vec<f64>,
    /// Restore level used by TurnOn when no last non-zero level is known.
    pub by_on: Option<f64>,
    /// Gate mode vocabulary, first = open, last = closed.
    pub modes: Vec<String>,
    /// Thermostat mode dictionary.
    pub mode_states: Vec<ModeState>,
}

impl ControlConfig {
    pub fn with_set_id(mut self, id: impl Into<String>) -> Self {
        self.set_id = Some(id.into());
        self
    }

    pub fn with_get_id(mut self, id: impl Into<String>) -> Self {
        self.get_id = Some(id.into());
        self
    }

    pub fn with_power_ids(
        mut self,
        set: impl Into<String>,
        get: Option<String>,
    ) -> Self {
        self.power_set_id = Some(set.into());
        self.power_get_id = get;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    fn required_set_id(&self, kind: ControlKind) -> Result<String, DeviceError> {
        self.set_id
            .clone()
            .ok_or_else(|| DeviceError::InvalidConfig(format!("{kind:?} requires a set id")))
    }
}

/// Which color channel was written last on a color device. The protocol
/// treats color and color temperature as mutually exclusive per update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPriority {
    Rgb,
    Ct,
}

/// A concrete device archetype: a fixed capability set plus coupling rules.
#[derive(Debug, Clone)]
pub struct Control {
    kind: ControlKind,
    config: ControlConfig,
    capabilities: Vec<Capability>,
    color_priority: Option<ColorPriority>,
}

impl Control {
    pub fn new(kind: ControlKind, config: ControlConfig) -> Result<Self, DeviceError> {
        let capabilities = match kind {
            ControlKind::Socket | ControlKind::Light => build_switch(&config, kind)?,
            ControlKind::Dimmer => build_dimmer(&config)?,
            ControlKind::RgbSingle => build_rgb(&config)?,
            ControlKind::Thermostat => build_thermostat(&config, false)?,
            ControlKind::AirCondition => build_thermostat(&config, true)?,
            ControlKind::Lock => build_lock(&config)?,
            ControlKind::Blind => build_blind(&config)?,
            ControlKind::Gate => build_gate(&config)?,
            ControlKind::Scene => build_scene(&config)?,
            ControlKind::Volume => build_volume(&config)?,
            ControlKind::TemperatureSensor => build_temperature_sensor(&config)?,
        };
        Ok(Self {
            kind,
            config,
            capabilities,
            color_priority: None,
        })
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub(crate) fn capability(&self, namespace: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.namespace() == namespace)
    }

    pub(crate) fn capability_mut(&mut self, namespace: &str) -> Option<&mut Capability> {
        self.capabilities
            .iter_mut()
            .find(|c| c.namespace() == namespace)
    }

    /// Deterministic directive match over the capability set.
    pub fn supports(&self, namespace: &str, name: &str, instance: Option<&str>) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.supports(namespace, name, instance))
    }

    /// Backend ids this control reads or writes, for reverse indexing.
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for cap in &self.capabilities {
            for p in cap.properties() {
                for id in [p.read_id()] {
                    if let Some(id) = id {
                        if !ids.iter().any(|e| e == id) {
                            ids.push(id.to_string());
                        }
                    }
                }
            }
        }
        for extra in [&self.config.set_id, &self.config.power_set_id] {
            if let Some(id) = extra {
                if !ids.iter().any(|e| e == id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Apply a backend-initiated state change to every dependent property.
    ///
    /// Returns wire readings for the properties that changed.
    pub fn apply_backend(&mut self, id: &str, raw: &StateValue) -> Vec<PropertyReading> {
        let mut changed = Vec::new();
        for cap in &mut self.capabilities {
            let namespace = cap.namespace();
            let instance = cap.instance().map(String::from);
            for p in cap.properties_mut() {
                if !p.depends_on(id) {
                    continue;
                }
                if p.apply_backend(raw) {
                    if let Some(value) = p.current() {
                        let mut reading = PropertyReading::new(
                            namespace,
                            p.name(),
                            crate::capability::render_value(p.name(), value),
                        );
                        if let Some(instance) = &instance {
                            reading = reading.with_instance(instance.clone());
                        }
                        changed.push(reading);
                    }
                }
            }
        }
        changed
    }

    /// Discovery descriptors for every capability.
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities.iter().map(Capability::descriptor).collect()
    }

    /// Current readings across all retrievable capabilities, honoring the
    /// color / color-temperature exclusivity of the last update.
    pub async fn snapshot(&mut self, gateway: &dyn StateGateway) -> Vec<PropertyReading> {
        let skip = match self.color_priority {
            Some(ColorPriority::Rgb) => Some(iface::COLOR_TEMPERATURE),
            Some(ColorPriority::Ct) => Some(iface::COLOR),
            None => None,
        };
        let mut out = Vec::new();
        for cap in &mut self.capabilities {
            if Some(cap.namespace()) == skip {
                continue;
            }
            out.extend(cap.readings(gateway).await);
        }
        out
    }

    pub(crate) fn set_color_priority(&mut self, priority: ColorPriority) {
        self.color_priority = Some(priority);
    }

    /// Invalidate every property cache; the next reads hit the backend.
    pub fn invalidate(&mut self) {
        for cap in &mut self.capabilities {
            for p in cap.properties_mut() {
                p.invalidate();
            }
        }
    }
}

/// Ordering rank of an interface inside a state report.
pub fn interface_rank(namespace: &str) -> u8 {
    match namespace {
        iface::POWER => 0,
        iface::BRIGHTNESS => 1,
        iface::COLOR => 2,
        iface::COLOR_TEMPERATURE => 3,
        iface::THERMOSTAT => 4,
        iface::TEMPERATURE_SENSOR => 5,
        iface::LOCK => 6,
        iface::MODE => 7,
        iface::PERCENTAGE => 8,
        iface::SPEAKER => 9,
        iface::ENDPOINT_HEALTH => 99,
        _ => 50,
    }
}

fn power_property(config: &ControlConfig, piggyback_id: Option<&str>) -> Property {
    match (&config.power_set_id, piggyback_id) {
        (Some(set), _) => {
            let mut p = Property::new(iface::POWER, prop::POWER_STATE)
                .with_set_id(set.clone())
                .with_units(Units::Switch);
            if let Some(get) = &config.power_get_id {
                p = p.with_get_id(get.clone());
            }
            p
        }
        (None, Some(shared)) => {
            let mut p = Property::new(iface::POWER, prop::POWER_STATE)
                .with_set_id(shared)
                .with_units(Units::Switch);
            if let Some(range) = config.range {
                p = p.with_range(range);
            }
            if let Some(get) = &config.get_id {
                p = p.with_get_id(get.clone());
            }
            p
        }
        (None, None) => Property::new(iface::POWER, prop::POWER_STATE).with_units(Units::Switch),
    }
}

fn power_capability(config: &ControlConfig, piggyback_id: Option<&str>) -> Capability {
    Capability::new(iface::POWER)
        .with_directives(&["TurnOn", "TurnOff"])
        .with_property(power_property(config, piggyback_id))
}

fn level_property(
    namespace: &'static str,
    name: &'static str,
    config: &ControlConfig,
    set_id: &str,
) -> Property {
    let mut p = Property::new(namespace, name)
        .with_set_id(set_id)
        .with_units(Units::Percent);
    if let Some(range) = config.range {
        p = p.with_range(range);
    }
    if let Some(get) = &config.get_id {
        p = p.with_get_id(get.clone());
    }
    p
}

fn build_switch(config: &ControlConfig, kind: ControlKind) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(kind)?;
    let mut cfg = config.clone();
    if cfg.power_set_id.is_none() {
        cfg.power_set_id = Some(set_id);
        cfg.power_get_id = cfg.get_id.clone();
    }
    Ok(vec![power_capability(&cfg, None)])
}

fn build_dimmer(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Dimmer)?;
    Ok(vec![
        power_capability(config, Some(&set_id)),
        Capability::new(iface::BRIGHTNESS)
            .with_directives(&["SetBrightness", "AdjustBrightness"])
            .with_property(level_property(iface::BRIGHTNESS, prop::BRIGHTNESS, config, &set_id)),
    ])
}

fn build_rgb(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let hue_id = config.required_set_id(ControlKind::RgbSingle)?;
    let mut caps = Vec::new();

    let level_id = config.brightness_id.clone();
    caps.push(power_capability(config, level_id.as_deref()));

    if let Some(level_id) = &level_id {
        let mut p = Property::new(iface::BRIGHTNESS, prop::BRIGHTNESS)
            .with_set_id(level_id.clone())
            .with_units(Units::Percent);
        if let Some(range) = config.range {
            p = p.with_range(range);
        }
        caps.push(
            Capability::new(iface::BRIGHTNESS)
                .with_directives(&["SetBrightness", "AdjustBrightness"])
                .with_property(p),
        );
    }

    // Hue-only color backend: the color property reads/writes the hue
    // channel; saturation and brightness are reported as fixed defaults.
    caps.push(
        Capability::new(iface::COLOR)
            .with_directives(&["SetColor"])
            .with_property(
                Property::new(iface::COLOR, prop::COLOR)
                    .with_set_id(hue_id)
                    .with_range(ValueRange::new(0.0, 360.0)),
            ),
    );

    if let Some(ct_id) = &config.ct_id {
        caps.push(
            Capability::new(iface::COLOR_TEMPERATURE)
                .with_directives(&[
                    "SetColorTemperature",
                    "IncreaseColorTemperature",
                    "DecreaseColorTemperature",
                ])
                .with_property(
                    Property::new(iface::COLOR_TEMPERATURE, prop::COLOR_TEMPERATURE)
                        .with_set_id(ct_id.clone()),
                ),
        );
    }
    Ok(caps)
}

fn thermostat_mode_map(config: &ControlConfig) -> Vec<(f64, String)> {
    let mut map: Vec<(f64, String)> = config
        .mode_states
        .iter()
        .filter_map(|s| {
            let name = s.name.to_ascii_uppercase();
            THERMOSTAT_MODES
                .contains(&name.as_str())
                .then_some((s.value, name))
        })
        .collect();
    if map.is_empty() {
        // Without a states dictionary the mode capability still reports a
        // sane default set.
        map.push((0.0, "AUTO".to_string()));
    }
    map
}

fn build_thermostat(config: &ControlConfig, with_power: bool) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Thermostat)?;
    let mut caps = Vec::new();

    if with_power {
        if config.power_set_id.is_none() {
            return Err(DeviceError::InvalidConfig(
                "AirCondition requires a power set id".into(),
            ));
        }
        caps.push(power_capability(config, None));
    }

    let mut setpoint = Property::new(iface::THERMOSTAT, prop::TARGET_SETPOINT).with_set_id(set_id);
    if let Some(range) = config.setpoint_range {
        setpoint = setpoint.with_range(range);
    }
    let mut thermostat = Capability::new(iface::THERMOSTAT)
        .with_directives(&["SetTargetTemperature", "AdjustTargetTemperature"])
        .with_property(setpoint);

    // The mode directive and vocabulary are only advertised when a mode
    // property is actually wired; a setpoint-only thermostat must not match
    // SetThermostatMode.
    if let Some(mode_id) = &config.mode_id {
        let mode_map = thermostat_mode_map(config);
        let supported: Vec<&str> = mode_map.iter().map(|(_, n)| n.as_str()).collect();
        let configuration = json!({ "supportedModes": supported });
        thermostat = thermostat
            .with_directives(&["SetThermostatMode"])
            .with_configuration(configuration)
            .with_property(
                Property::new(iface::THERMOSTAT, prop::THERMOSTAT_MODE)
                    .with_set_id(mode_id.clone())
                    .with_units(Units::Mode)
                    .with_mode_map(mode_map),
            );
    }
    caps.push(thermostat);

    if let Some(actual) = &config.get_id {
        caps.push(
            Capability::new(iface::TEMPERATURE_SENSOR).with_property(
                Property::new(iface::TEMPERATURE_SENSOR, prop::TEMPERATURE)
                    .with_get_id(actual.clone()),
            ),
        );
    }
    Ok(caps)
}

fn build_lock(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Lock)?;
    let mut p = Property::new(iface::LOCK, prop::LOCK_STATE)
        .with_set_id(set_id)
        .with_units(Units::Switch);
    if let Some(get) = &config.get_id {
        p = p.with_get_id(get.clone());
    }
    Ok(vec![Capability::new(iface::LOCK)
        .with_directives(&["Lock", "Unlock"])
        .with_property(p)])
}

fn build_blind(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Blind)?;
    Ok(vec![
        power_capability(config, Some(&set_id)),
        Capability::new(iface::PERCENTAGE)
            .with_directives(&["SetPercentage", "AdjustPercentage"])
            .with_property(level_property(iface::PERCENTAGE, prop::PERCENTAGE, config, &set_id)),
    ])
}

fn gate_semantics(open_mode: &str, closed_mode: &str) -> Value {
    json!({
        "actionMappings": [
            {
                "@type": "ActionsToDirective",
                "actions": ["Alexa.Actions.Open", "Alexa.Actions.Raise"],
                "directive": { "name": "SetMode", "payload": { "mode": open_mode } }
            },
            {
                "@type": "ActionsToDirective",
                "actions": ["Alexa.Actions.Close", "Alexa.Actions.Lower"],
                "directive": { "name": "SetMode", "payload": { "mode": closed_mode } }
            }
        ],
        "stateMappings": [
            { "@type": "StatesToValue", "states": ["Alexa.States.Open"], "value": open_mode },
            { "@type": "StatesToValue", "states": ["Alexa.States.Closed"], "value": closed_mode }
        ]
    })
}

fn build_gate(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Gate)?;
    let modes: Vec<String> = if config.modes.is_empty() {
        vec!["Position.Up".to_string(), "Position.Down".to_string()]
    } else {
        config.modes.clone()
    };
    let mode_map: Vec<(f64, String)> = modes
        .iter()
        .enumerate()
        .map(|(i, m)| (i as f64, m.clone()))
        .collect();

    let supported: Vec<Value> = modes
        .iter()
        .map(|m| {
            json!({
                "value": m,
                "modeResources": {
                    "friendlyNames": [
                        { "@type": "text", "value": { "text": m.rsplit('.').next().unwrap_or(m), "locale": "en-US" } }
                    ]
                }
            })
        })
        .collect();
    let open_mode = modes.first().cloned().unwrap_or_default();
    let closed_mode = modes.last().cloned().unwrap_or_default();

    let mut p = Property::new(iface::MODE, prop::MODE)
        .with_set_id(set_id)
        .with_units(Units::Mode)
        .with_mode_map(mode_map)
        .with_instance("Gate.Position");
    if let Some(get) = &config.get_id {
        p = p.with_get_id(get.clone());
    }

    Ok(vec![Capability::new(iface::MODE)
        .with_instance("Gate.Position")
        .with_directives(&["SetMode"])
        .with_property(p)
        .with_configuration(json!({ "ordered": false, "supportedModes": supported }))
        .with_semantics(gate_semantics(&open_mode, &closed_mode))
        .with_resources(json!({
            "friendlyNames": [
                { "@type": "asset", "value": { "assetId": "Alexa.Setting.Mode" } }
            ]
        }))])
}

fn build_scene(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    config.required_set_id(ControlKind::Scene)?;
    Ok(vec![Capability::new(iface::SCENE)
        .with_flags(false, false)
        .with_supports_deactivation(false)
        .with_directives(&["Activate"])])
}

fn build_volume(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let set_id = config.required_set_id(ControlKind::Volume)?;
    let mut volume = Property::new(iface::SPEAKER, prop::VOLUME)
        .with_set_id(set_id)
        .with_units(Units::Percent);
    if let Some(range) = config.range {
        volume = volume.with_range(range);
    }
    if let Some(get) = &config.get_id {
        volume = volume.with_get_id(get.clone());
    }
    let mut cap = Capability::new(iface::SPEAKER)
        .with_directives(&["SetVolume", "AdjustVolume", "SetMute"])
        .with_property(volume);
    if let Some(mute_id) = &config.mute_id {
        cap = cap.with_property(
            Property::new(iface::SPEAKER, prop::MUTED)
                .with_set_id(mute_id.clone())
                .with_units(Units::Switch),
        );
    }
    Ok(vec![cap])
}

fn build_temperature_sensor(config: &ControlConfig) -> Result<Vec<Capability>, DeviceError> {
    let id = config
        .get_id
        .clone()
        .or_else(|| config.set_id.clone())
        .ok_or_else(|| {
            DeviceError::InvalidConfig("TemperatureSensor requires a state id".into())
        })?;
    Ok(vec![Capability::new(iface::TEMPERATURE_SENSOR).with_property(
        Property::new(iface::TEMPERATURE_SENSOR, prop::TEMPERATURE).with_get_id(id),
    )])
}
