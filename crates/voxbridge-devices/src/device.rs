//! A device: one protocol endpoint wrapping one or more controls.

use serde_json::json;

use voxbridge_alexa::{Directive, DiscoveredEndpoint, PropertyReading};
use voxbridge_core::{StateGateway, StateValue};

use crate::capability::{iface, prop};
use crate::controls::{interface_rank, Control, ControlConfig, ControlKind, Outcome};
use crate::error::DeviceError;

/// Flat description of a device for the simpler protocol front-ends:
/// identity plus the archetype and backend-id layout of each control.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub id: String,
    pub friendly_name: String,
    pub controls: Vec<(ControlKind, ControlConfig)>,
}

/// One endpoint: identity, display metadata and its control set.
#[derive(Debug, Clone)]
pub struct Device {
    id: String,
    friendly_name: String,
    description: Option<String>,
    categories: Vec<String>,
    controls: Vec<Control>,
}

impl Device {
    pub fn new(id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            friendly_name: friendly_name.into(),
            description: None,
            categories: Vec::new(),
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    /// Override the display categories derived from the control kinds.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Display categories: explicit overrides, otherwise derived from the
    /// control kinds, deduplicated in order.
    pub fn display_categories(&self) -> Vec<String> {
        if !self.categories.is_empty() {
            return self.categories.clone();
        }
        let mut out: Vec<String> = Vec::new();
        for control in &self.controls {
            let category = control.kind().display_category().to_string();
            if !out.contains(&category) {
                out.push(category);
            }
        }
        out
    }

    /// Every backend id any control reads or writes, deduplicated.
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for control in &self.controls {
            for id in control.backend_ids() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    pub fn supports(&self, namespace: &str, name: &str, instance: Option<&str>) -> bool {
        self.controls
            .iter()
            .any(|c| c.supports(namespace, name, instance))
    }

    /// Route a directive to the first control whose capability set matches.
    pub async fn execute(
        &mut self,
        gateway: &dyn StateGateway,
        directive: &Directive,
    ) -> Result<Outcome, DeviceError> {
        let namespace = directive.header.namespace.as_str();
        let name = directive.header.name.as_str();
        let instance = directive.instance();
        let control = self
            .controls
            .iter_mut()
            .find(|c| c.supports(namespace, name, instance))
            .ok_or_else(|| {
                DeviceError::UnsupportedDirective(format!("{namespace}/{name}"))
            })?;
        control.execute(gateway, directive).await
    }

    /// Discovery entry for this endpoint. The implicit base interface plus
    /// one descriptor per capability.
    pub fn discovery_endpoint(&self) -> DiscoveredEndpoint {
        let mut endpoint = DiscoveredEndpoint::new(&self.id, &self.friendly_name);
        if let Some(description) = &self.description {
            endpoint.description = description.clone();
        }
        for category in self.display_categories() {
            endpoint = endpoint.with_category(category);
        }
        for control in &self.controls {
            for descriptor in control.descriptors() {
                endpoint = endpoint.with_capability(descriptor);
            }
        }
        endpoint
    }

    /// Full state snapshot in canonical interface order, with endpoint
    /// health appended last.
    pub async fn snapshot(&mut self, gateway: &dyn StateGateway) -> Vec<PropertyReading> {
        let mut readings = Vec::new();
        for control in &mut self.controls {
            readings.extend(control.snapshot(gateway).await);
        }
        readings.sort_by_key(|r| interface_rank(&r.namespace));
        if self
            .controls
            .iter()
            .any(|c| c.capabilities().iter().any(|cap| cap.retrievable()))
        {
            readings.push(PropertyReading::new(
                iface::ENDPOINT_HEALTH,
                prop::CONNECTIVITY,
                json!({ "value": "OK" }),
            ));
        }
        readings
    }

    /// Feed a backend-initiated state change to every dependent control.
    ///
    /// Returns the wire readings of the properties that changed.
    pub fn apply_backend(&mut self, id: &str, raw: &StateValue) -> Vec<PropertyReading> {
        let mut changed = Vec::new();
        for control in &mut self.controls {
            changed.extend(control.apply_backend(id, raw));
        }
        changed
    }

    /// Flat description for the simpler protocol front-ends.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            friendly_name: self.friendly_name.clone(),
            controls: self
                .controls
                .iter()
                .map(|c| (c.kind(), c.config().clone()))
                .collect(),
        }
    }

    /// Whether any control depends on the given backend id.
    pub fn depends_on(&self, id: &str) -> bool {
        self.controls
            .iter()
            .any(|c| c.backend_ids().iter().any(|e| e == id))
    }
}
