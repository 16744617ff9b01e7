//! Device-layer error taxonomy.

use voxbridge_core::GatewayError;

/// Errors that can occur during directive handling and state fan-out.
///
/// All directive-level errors are rendered as protocol error envelopes by
/// the manager; nothing here crosses the manager boundary as a panic.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Unknown endpoint id in a directive.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// No control/capability on the endpoint matches the directive.
    #[error("Unsupported directive: {0}")]
    UnsupportedDirective(String),

    /// Directive payload value outside the declared range/enum.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Backend read/write failed.
    #[error("Backend error: {0}")]
    Backend(#[from] GatewayError),

    /// A control was constructed from a configuration missing required ids.
    #[error("Invalid control configuration: {0}")]
    InvalidConfig(String),
}
