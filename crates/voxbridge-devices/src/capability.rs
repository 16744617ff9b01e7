//! Capabilities: named bundles of properties plus the directives they
//! understand.
//!
//! A capability instance is never shared between two controls; each control
//! constructs its own from configuration.

use serde_json::{json, Value};

use voxbridge_alexa::{CapabilityDescriptor, PropertyReading};
use voxbridge_core::{StateGateway, StateValue};

use crate::property::Property;

/// Protocol interface names.
pub mod iface {
    pub const ALEXA: &str = "Alexa";
    pub const POWER: &str = "Alexa.PowerController";
    pub const BRIGHTNESS: &str = "Alexa.BrightnessController";
    pub const COLOR: &str = "Alexa.ColorController";
    pub const COLOR_TEMPERATURE: &str = "Alexa.ColorTemperatureController";
    pub const THERMOSTAT: &str = "Alexa.ThermostatController";
    pub const TEMPERATURE_SENSOR: &str = "Alexa.TemperatureSensor";
    pub const LOCK: &str = "Alexa.LockController";
    pub const PERCENTAGE: &str = "Alexa.PercentageController";
    pub const MODE: &str = "Alexa.ModeController";
    pub const SCENE: &str = "Alexa.SceneController";
    pub const SPEAKER: &str = "Alexa.Speaker";
    pub const ENDPOINT_HEALTH: &str = "Alexa.EndpointHealth";
}

/// Protocol property names.
pub mod prop {
    pub const POWER_STATE: &str = "powerState";
    pub const BRIGHTNESS: &str = "brightness";
    pub const COLOR: &str = "color";
    pub const COLOR_TEMPERATURE: &str = "colorTemperatureInKelvin";
    pub const TARGET_SETPOINT: &str = "targetSetpoint";
    pub const THERMOSTAT_MODE: &str = "thermostatMode";
    pub const TEMPERATURE: &str = "temperature";
    pub const LOCK_STATE: &str = "lockState";
    pub const PERCENTAGE: &str = "percentage";
    pub const MODE: &str = "mode";
    pub const VOLUME: &str = "volume";
    pub const MUTED: &str = "muted";
    pub const CONNECTIVITY: &str = "connectivity";
}

/// Render a cached protocol-unit value into its wire shape.
///
/// Most properties are plain scalars; temperatures wrap into a Celsius
/// object, power/lock map booleans onto their enum strings, and the color
/// composite carries fixed saturation/brightness for hue-only backends.
pub fn render_value(name: &str, value: &StateValue) -> Value {
    match name {
        prop::POWER_STATE => match value.as_bool() {
            Some(true) => json!("ON"),
            Some(false) => json!("OFF"),
            None => Value::Null,
        },
        prop::LOCK_STATE => match value.as_bool() {
            Some(true) => json!("LOCKED"),
            Some(false) => json!("UNLOCKED"),
            None => Value::Null,
        },
        prop::TARGET_SETPOINT | prop::TEMPERATURE => match value.as_f64() {
            Some(v) => json!({ "value": v, "scale": "CELSIUS" }),
            None => Value::Null,
        },
        prop::COLOR => match value.as_f64() {
            Some(hue) => json!({ "hue": hue, "saturation": 1.0, "brightness": 1.0 }),
            None => Value::Null,
        },
        prop::CONNECTIVITY => json!({ "value": "OK" }),
        _ => value.to_json(),
    }
}

/// A capability: protocol namespace, owned properties, directive table.
#[derive(Debug, Clone)]
pub struct Capability {
    namespace: &'static str,
    instance: Option<String>,
    retrievable: bool,
    proactively_reported: bool,
    properties: Vec<Property>,
    directives: Vec<&'static str>,
    configuration: Option<Value>,
    semantics: Option<Value>,
    resources: Option<Value>,
    supports_deactivation: Option<bool>,
}

impl Capability {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            instance: None,
            retrievable: true,
            proactively_reported: true,
            properties: Vec::new(),
            directives: Vec::new(),
            configuration: None,
            semantics: None,
            resources: None,
            supports_deactivation: None,
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_directives(mut self, directives: &[&'static str]) -> Self {
        self.directives.extend_from_slice(directives);
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_flags(mut self, retrievable: bool, proactively_reported: bool) -> Self {
        self.retrievable = retrievable;
        self.proactively_reported = proactively_reported;
        self
    }

    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_semantics(mut self, semantics: Value) -> Self {
        self.semantics = Some(semantics);
        self
    }

    pub fn with_resources(mut self, resources: Value) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_supports_deactivation(mut self, supported: bool) -> Self {
        self.supports_deactivation = Some(supported);
        self
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn retrievable(&self) -> bool {
        self.retrievable
    }

    /// Exact match against the declared directive table. Multi-instance
    /// capabilities must also match the instance string.
    pub fn supports(&self, namespace: &str, name: &str, instance: Option<&str>) -> bool {
        if self.namespace != namespace || !self.directives.contains(&name) {
            return false;
        }
        match (&self.instance, instance) {
            (Some(own), Some(asked)) => own == asked,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut [Property] {
        &mut self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    /// Render the discovery descriptor for this capability.
    pub fn descriptor(&self) -> CapabilityDescriptor {
        let mut names: Vec<&str> = Vec::new();
        for p in &self.properties {
            if !names.contains(&p.name()) {
                names.push(p.name());
            }
        }
        let mut desc = CapabilityDescriptor::new(self.namespace);
        // Property-less capabilities (SceneController) omit the block
        // entirely instead of advertising an empty supported list.
        if !names.is_empty() {
            desc = desc.with_properties(names, self.proactively_reported, self.retrievable);
        }
        if let Some(supported) = self.supports_deactivation {
            desc = desc.with_supports_deactivation(supported);
        }
        if let Some(instance) = &self.instance {
            desc = desc.with_instance(instance.clone());
        }
        if let Some(configuration) = &self.configuration {
            desc = desc.with_configuration(configuration.clone());
        }
        if let Some(semantics) = &self.semantics {
            desc = desc.with_semantics(semantics.clone());
        }
        if let Some(resources) = &self.resources {
            desc = desc.with_capability_resources(resources.clone());
        }
        desc
    }

    /// Wire reading for a single owned property from its cached/current value.
    pub fn reading_of(&self, property: &Property, value: &StateValue) -> PropertyReading {
        let mut reading = PropertyReading::new(
            self.namespace,
            property.name(),
            render_value(property.name(), value),
        );
        if let Some(instance) = &self.instance {
            reading = reading.with_instance(instance.clone());
        }
        reading
    }

    /// Readings for every retrievable property, skipping unavailable values.
    pub async fn readings(&mut self, gateway: &dyn StateGateway) -> Vec<PropertyReading> {
        if !self.retrievable {
            return Vec::new();
        }
        let namespace = self.namespace;
        let instance = self.instance.clone();
        let mut out = Vec::new();
        for property in &mut self.properties {
            let Some(value) = property.value(gateway).await else {
                continue;
            };
            let mut reading =
                PropertyReading::new(namespace, property.name(), render_value(property.name(), &value));
            if let Some(instance) = &instance {
                reading = reading.with_instance(instance.clone());
            }
            out.push(reading);
        }
        out
    }
}
