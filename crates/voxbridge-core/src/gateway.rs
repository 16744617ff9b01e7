//! Backend state gateway.
//!
//! The external home-automation store is reached exclusively through
//! [`StateGateway`]: async get/set of a single named value. Retry and
//! timeout policy live behind this trait, not in front of it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::GatewayError;
use crate::value::StateValue;

/// A state change as delivered by the backend (value plus acknowledgement
/// flag; unacknowledged changes have not been confirmed by the device).
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub val: StateValue,
    pub ack: bool,
}

impl StateUpdate {
    pub fn acked(val: impl Into<StateValue>) -> Self {
        Self {
            val: val.into(),
            ack: true,
        }
    }

    pub fn pending(val: impl Into<StateValue>) -> Self {
        Self {
            val: val.into(),
            ack: false,
        }
    }
}

/// Narrow async interface to the backend state store.
///
/// Ids are opaque strings owned by the backend. The core performs no
/// retries; a failed read degrades to "value unknown" where the protocol
/// allows it, a failed write surfaces as an execution error.
#[async_trait]
pub trait StateGateway: Send + Sync {
    /// Read the current value of a state id.
    async fn get_state(&self, id: &str) -> Result<StateValue, GatewayError>;

    /// Write a value to a state id. `ack` mirrors the backend convention:
    /// commands are written unacknowledged and confirmed by the device.
    async fn set_state(&self, id: &str, value: StateValue, ack: bool) -> Result<(), GatewayError>;
}

/// Shared gateway handle.
pub type SharedGateway = Arc<dyn StateGateway>;

/// In-memory gateway used by tests.
///
/// Writes are recorded in order so tests can assert on the exact raw values
/// sent to the backend.
#[derive(Default)]
pub struct MemoryGateway {
    states: RwLock<HashMap<String, StateValue>>,
    writes: RwLock<Vec<(String, StateValue)>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state value without recording a write.
    pub async fn seed(&self, id: impl Into<String>, value: impl Into<StateValue>) {
        self.states.write().await.insert(id.into(), value.into());
    }

    /// All writes performed so far, oldest first.
    pub async fn writes(&self) -> Vec<(String, StateValue)> {
        self.writes.read().await.clone()
    }

    /// Last write to a specific id, if any.
    pub async fn last_write(&self, id: &str) -> Option<StateValue> {
        self.writes
            .read()
            .await
            .iter()
            .rev()
            .find(|(wid, _)| wid == id)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl StateGateway for MemoryGateway {
    async fn get_state(&self, id: &str) -> Result<StateValue, GatewayError> {
        self.states
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    async fn set_state(&self, id: &str, value: StateValue, _ack: bool) -> Result<(), GatewayError> {
        self.states
            .write()
            .await
            .insert(id.to_string(), value.clone());
        self.writes.write().await.push((id.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_gateway_round_trip() {
        let gw = MemoryGateway::new();
        gw.seed("light.level", 875.0).await;

        let v = gw.get_state("light.level").await.unwrap();
        assert_eq!(v, StateValue::Number(875.0));

        gw.set_state("light.level", StateValue::Number(500.0), false)
            .await
            .unwrap();
        assert_eq!(
            gw.last_write("light.level").await,
            Some(StateValue::Number(500.0))
        );
    }

    #[tokio::test]
    async fn test_memory_gateway_missing_id() {
        let gw = MemoryGateway::new();
        let err = gw.get_state("nope").await.unwrap_err();
        assert!(err.is_soft());
    }
}
