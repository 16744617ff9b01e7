//! Simpler protocol front-ends over the device core.
//!
//! Two webhook dialects live here, both translating onto the shared
//! [`DeviceManager`](voxbridge_devices::DeviceManager):
//!
//! - [`GhomeBridge`]: SYNC/QUERY/EXECUTE with `customData` backend ids
//! - [`AlisaBridge`]: `devices.types.*` / `devices.capabilities.*` listings
//!   with per-capability `action_result` statuses
//!
//! Neither front-end touches the backend directly; every write becomes a
//! directive so the range scaling and power/level coupling rules apply
//! uniformly across all three protocols.

pub mod alisa;
pub mod ghome;

pub use alisa::AlisaBridge;
pub use ghome::GhomeBridge;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
