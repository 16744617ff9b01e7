//! Outbound event delivery contract.
//!
//! The device core hands fully rendered ChangeReport payloads to an
//! [`EventProxy`]; actual transport (HTTP, queue, ...) lives behind it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Errors raised by event delivery.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Narrow publish contract for proactive events.
#[async_trait]
pub trait EventProxy: Send + Sync {
    /// Deliver one event payload. Delivery is fire-and-forget from the
    /// core's point of view; failures are logged by the caller, not retried.
    async fn publish(&self, event: Value) -> Result<(), ProxyError>;
}

/// Shared proxy handle.
pub type SharedProxy = Arc<dyn EventProxy>;

/// Proxy that collects published events in memory. Used by tests.
#[derive(Default)]
pub struct CollectingProxy {
    events: Mutex<Vec<Value>>,
}

impl CollectingProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Value> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl EventProxy for CollectingProxy {
    async fn publish(&self, event: Value) -> Result<(), ProxyError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
