//! Discovery payload shapes.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// One supported property name inside a capability descriptor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SupportedProperty {
    pub name: String,
}

/// The `properties` block of a capability descriptor.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProperties {
    pub supported: Vec<SupportedProperty>,
    pub proactively_reported: bool,
    pub retrievable: bool,
}

/// A discovery capability descriptor.
///
/// Mode/Range controllers additionally carry `configuration` (allowed
/// values), `semantics` (action/state mappings) and `capabilityResources`
/// (friendly names); plain controllers leave those off.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<CapabilityProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantics: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "supportsDeactivation")]
    pub supports_deactivation: Option<bool>,
}

impl CapabilityDescriptor {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            kind: "AlexaInterface".to_string(),
            interface: interface.into(),
            instance: None,
            version: crate::PAYLOAD_VERSION.to_string(),
            properties: None,
            configuration: None,
            semantics: None,
            capability_resources: None,
            supports_deactivation: None,
        }
    }

    pub fn with_properties(
        mut self,
        supported: Vec<&str>,
        proactively_reported: bool,
        retrievable: bool,
    ) -> Self {
        self.properties = Some(CapabilityProperties {
            supported: supported
                .into_iter()
                .map(|name| SupportedProperty {
                    name: name.to_string(),
                })
                .collect(),
            proactively_reported,
            retrievable,
        });
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
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

    pub fn with_capability_resources(mut self, resources: Value) -> Self {
        self.capability_resources = Some(resources);
        self
    }

    pub fn with_supports_deactivation(mut self, supported: bool) -> Self {
        self.supports_deactivation = Some(supported);
        self
    }
}

/// The implicit base interface every endpoint declares.
pub fn base_capability() -> CapabilityDescriptor {
    CapabilityDescriptor::new("Alexa")
}

/// One endpoint in a discovery response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredEndpoint {
    pub endpoint_id: String,
    pub manufacturer_name: String,
    pub description: String,
    pub friendly_name: String,
    pub display_categories: Vec<String>,
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl DiscoveredEndpoint {
    pub fn new(endpoint_id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        let friendly_name = friendly_name.into();
        Self {
            endpoint_id: endpoint_id.into(),
            manufacturer_name: "voxbridge".to_string(),
            description: friendly_name.clone(),
            friendly_name,
            display_categories: Vec::new(),
            capabilities: vec![base_capability()],
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.display_categories.push(category.into());
        self
    }

    pub fn with_capability(mut self, capability: CapabilityDescriptor) -> Self {
        self.capabilities.push(capability);
        self
    }
}

/// Assemble the `Discover.Response` envelope.
pub fn discover_response(endpoints: &[DiscoveredEndpoint]) -> Value {
    json!({
        "event": {
            "header": {
                "namespace": "Alexa.Discovery",
                "name": "Discover.Response",
                "payloadVersion": crate::PAYLOAD_VERSION,
                "messageId": Uuid::new_v4().to_string(),
            },
            "payload": { "endpoints": endpoints }
        }
    })
}
