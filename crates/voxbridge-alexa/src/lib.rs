//! Wire model for the discovery/directive/state-report smart-home protocol.
//!
//! Everything here is a stateless translator between the wire JSON shape and
//! internal message objects. No device knowledge lives in this crate; the
//! device core builds its payloads through these types.
//!
//! Message families:
//! - [`Directive`]: inbound (Discovery, ReportState, capability directives)
//! - [`Message`]: outbound Response / StateReport / ErrorResponse /
//!   ActivationStarted / ChangeReport envelopes
//! - [`DiscoveredEndpoint`] / [`CapabilityDescriptor`]: discovery payloads
//! - [`EventProxy`]: the narrow publish contract for proactive events

pub mod directive;
pub mod discovery;
pub mod proxy;
pub mod report;

pub use directive::{Directive, DirectiveHeader};
pub use discovery::{
    base_capability, discover_response, CapabilityDescriptor, CapabilityProperties,
    DiscoveredEndpoint, SupportedProperty,
};
pub use proxy::{CollectingProxy, EventProxy, ProxyError, SharedProxy};
pub use report::{ChangeCause, ErrorType, Message, PropertyReading};

/// Payload version spoken by this adapter.
pub const PAYLOAD_VERSION: &str = "3";
