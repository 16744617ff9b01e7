//! Core primitives for the voxbridge smart-home adapter.
//!
//! This crate is the leaf of the workspace. It defines:
//! - **StateValue**: the value model for backend state (number/bool/text/null)
//! - **StateGateway**: the narrow async interface to the external state store
//! - **convert**: range/percentage conversion used at every read/write boundary
//!
//! Everything above (devices, protocol front-ends) depends on the backend
//! exclusively through [`StateGateway`]; backend ids are opaque strings.

pub mod convert;
pub mod error;
pub mod gateway;
pub mod value;

pub use convert::{clamp_percent, denormalize, nearest_step, nearest_step_index, normalize};
pub use error::GatewayError;
pub use gateway::{MemoryGateway, SharedGateway, StateGateway, StateUpdate};
pub use value::StateValue;

/// Maximum proactive change notifications per tracked key per rolling hour.
pub const MAX_CHANGES_PER_HOUR: usize = 60;

/// Rolling window used by the notification rate limiter.
pub const RATE_WINDOW: std::time::Duration = std::time::Duration::from_secs(3600);

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
