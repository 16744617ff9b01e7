//! Capability-based device core.
//!
//! This crate decomposes physical devices into orthogonal capabilities and
//! dispatches protocol directives against them:
//!
//! - **Property**: a typed, named, boundable quantity backed by backend
//!   state ids, with a cached protocol-unit value
//! - **Capability**: a named bundle of properties plus the directives it
//!   understands (PowerController owns `powerState` and TurnOn/TurnOff)
//! - **Control**: a device archetype (Dimmer, Thermostat, Lock, ...) built
//!   from a declarative [`ControlConfig`], encoding the cross-property
//!   coupling rules
//! - **Device**: an addressable endpoint owning one or more controls
//! - **DeviceManager**: the aggregate root; resolves directives, assembles
//!   discovery and state reports, fans out backend state updates and emits
//!   rate-limited change reports

pub mod capability;
pub mod controls;
pub mod coupling;
pub mod device;
pub mod error;
pub mod manager;
pub mod property;
pub mod ratelimit;

pub use capability::{iface, prop, Capability};
pub use controls::{Control, ControlConfig, ControlKind, ModeState, Outcome};
pub use device::{Device, DeviceSummary};
pub use error::DeviceError;
pub use manager::DeviceManager;
pub use property::{Property, Units, ValueRange};
pub use ratelimit::RateLimiter;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
