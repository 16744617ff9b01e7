//! Properties: typed, named, boundable quantities backed by backend ids.
//!
//! A property always holds protocol units (0-100 percentage, Kelvin,
//! boolean) in its cache; raw backend units exist only at the read/write
//! boundary. Only backend state-change notifications and explicit
//! [`invalidate`](Property::invalidate) calls may drop the cache; directive
//! execution writes through and updates it transactionally.

use serde::{Deserialize, Serialize};
use tracing::debug;

use voxbridge_core::{clamp_percent, denormalize, normalize, StateGateway, StateValue};

use crate::error::DeviceError;

/// Raw backend range used for percentage scaling and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// How protocol units relate to backend units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Value passes through unchanged; a range, when present, clamps writes.
    #[default]
    Passthrough,
    /// Protocol side is a 0-100 percentage scaled over the backend range.
    Percent,
    /// Boolean protocol value piggybacked on the backend id; with a range,
    /// min/max act as the off/on sentinels, otherwise numeric truthiness.
    Switch,
    /// Finite enumerated modes, each mapped 1:1 to a backend value through
    /// the property's mode map. Lookup by name is case-insensitive.
    Mode,
}

/// A single protocol-facing property wired to backend state.
#[derive(Debug, Clone)]
pub struct Property {
    namespace: &'static str,
    name: &'static str,
    instance: Option<String>,
    get_id: Option<String>,
    set_id: Option<String>,
    range: Option<ValueRange>,
    units: Units,
    mode_map: Vec<(f64, String)>,
    current: Option<StateValue>,
    last_nonzero: Option<f64>,
}

impl Property {
    pub fn new(namespace: &'static str, name: &'static str) -> Self {
        Self {
            namespace,
            name,
            instance: None,
            get_id: None,
            set_id: None,
            range: None,
            units: Units::Passthrough,
            mode_map: Vec::new(),
            current: None,
            last_nonzero: None,
        }
    }

    pub fn with_set_id(mut self, id: impl Into<String>) -> Self {
        self.set_id = Some(id.into());
        self
    }

    pub fn with_get_id(mut self, id: impl Into<String>) -> Self {
        self.get_id = Some(id.into());
        self
    }

    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Mode vocabulary: backend value to protocol mode name, in order.
    pub fn with_mode_map(mut self, map: Vec<(f64, String)>) -> Self {
        self.mode_map = map;
        self
    }

    pub fn mode_map(&self) -> &[(f64, String)] {
        &self.mode_map
    }

    /// Canonical mode name for a requested name, case-insensitively.
    pub fn canonical_mode(&self, name: &str) -> Option<&str> {
        self.mode_map
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(_, n)| n.as_str())
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn range(&self) -> Option<ValueRange> {
        self.range
    }

    /// Id used for reads: the dedicated get id, falling back to the set id.
    pub fn read_id(&self) -> Option<&str> {
        self.get_id.as_deref().or(self.set_id.as_deref())
    }

    /// Whether a backend state change on `id` feeds this property.
    pub fn depends_on(&self, id: &str) -> bool {
        self.get_id.as_deref() == Some(id) || self.set_id.as_deref() == Some(id)
    }

    /// Cached protocol-unit value, if known.
    pub fn current(&self) -> Option<&StateValue> {
        self.current.as_ref()
    }

    /// Last non-zero percentage seen on a level-type property.
    pub fn last_nonzero(&self) -> Option<f64> {
        self.last_nonzero
    }

    /// Drop the cached value; the next read goes to the backend.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Convert a raw backend value into protocol units.
    ///
    /// `None` means "value unavailable" (degenerate range, raw outside its
    /// domain, wrong type), never zero.
    pub fn from_backend(&self, raw: &StateValue) -> Option<StateValue> {
        match self.units {
            Units::Switch => match self.range {
                Some(r) => {
                    let v = raw.as_f64()?;
                    if v == r.min {
                        Some(StateValue::Bool(false))
                    } else if v == r.max {
                        Some(StateValue::Bool(true))
                    } else {
                        Some(StateValue::Bool(v != 0.0))
                    }
                }
                None => raw.as_bool().map(StateValue::Bool),
            },
            Units::Percent => match self.range {
                Some(r) => normalize(raw.as_f64()?, r.min, r.max).map(StateValue::Number),
                None => {
                    let v = raw.as_f64()?;
                    (0.0..=100.0).contains(&v).then_some(StateValue::Number(v))
                }
            },
            Units::Mode => {
                if let Some(v) = raw.as_f64() {
                    return self
                        .mode_map
                        .iter()
                        .find(|(value, _)| *value == v)
                        .map(|(_, name)| StateValue::Text(name.clone()));
                }
                let name = raw.as_str()?;
                self.canonical_mode(name)
                    .map(|n| StateValue::Text(n.to_string()))
            }
            Units::Passthrough => match raw {
                StateValue::Null => None,
                other => Some(other.clone()),
            },
        }
    }

    /// Convert a protocol-unit value into the raw backend representation.
    fn to_backend(&self, value: &StateValue) -> Option<StateValue> {
        match self.units {
            Units::Switch => {
                let b = value.as_bool()?;
                match self.range {
                    Some(r) => Some(StateValue::Number(if b { r.max } else { r.min })),
                    None => Some(StateValue::Bool(b)),
                }
            }
            Units::Percent => {
                let pct = value.as_f64()?;
                match self.range {
                    Some(r) => denormalize(pct, r.min, r.max).map(StateValue::Number),
                    None => Some(StateValue::Number(pct)),
                }
            }
            Units::Mode => {
                let name = value.as_str()?;
                self.mode_map
                    .iter()
                    .find(|(_, n)| n.eq_ignore_ascii_case(name))
                    .map(|(v, _)| StateValue::Number(*v))
            }
            Units::Passthrough => Some(value.clone()),
        }
    }

    /// Read the current value, lazily populating the cache from the backend.
    ///
    /// A failed or unconvertible read reports "unknown" instead of failing
    /// the surrounding directive.
    pub async fn value(&mut self, gateway: &dyn StateGateway) -> Option<StateValue> {
        if self.current.is_some() {
            return self.current.clone();
        }
        let id = self.read_id()?.to_string();
        let raw = match gateway.get_state(&id).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(id, %err, "backend read failed, reporting unknown");
                return None;
            }
        };
        let converted = self.from_backend(&raw)?;
        self.remember(&converted);
        self.current = Some(converted.clone());
        Some(converted)
    }

    /// Validate, clamp, convert and write a protocol-unit value.
    ///
    /// Returns the accepted value, which may differ from the request after
    /// clamping (101% becomes 100%). The cache is updated optimistically.
    pub async fn set(
        &mut self,
        gateway: &dyn StateGateway,
        value: StateValue,
    ) -> Result<StateValue, DeviceError> {
        let accepted = self.validate(value)?;
        let raw = self.to_backend(&accepted).ok_or_else(|| {
            DeviceError::InvalidValue(format!("{} cannot encode {:?}", self.name, accepted))
        })?;
        let id = self
            .set_id
            .as_deref()
            .or(self.get_id.as_deref())
            .ok_or_else(|| {
                DeviceError::InvalidValue(format!("{} is not writable", self.name))
            })?
            .to_string();
        gateway.set_state(&id, raw, false).await?;
        self.remember(&accepted);
        self.current = Some(accepted.clone());
        Ok(accepted)
    }

    /// Apply a backend-initiated state change to the cache.
    ///
    /// Returns `true` when the property could convert the raw value.
    pub fn apply_backend(&mut self, raw: &StateValue) -> bool {
        match self.from_backend(raw) {
            Some(converted) => {
                self.remember(&converted);
                self.current = Some(converted);
                true
            }
            None => {
                self.current = None;
                false
            }
        }
    }

    /// Force the cached value without touching the backend. Used by the
    /// coupling rules when one directive implies another property's state.
    pub fn cache(&mut self, value: StateValue) {
        self.remember(&value);
        self.current = Some(value);
    }

    fn remember(&mut self, value: &StateValue) {
        if self.units == Units::Percent {
            if let Some(v) = value.as_f64() {
                if v > 0.0 {
                    self.last_nonzero = Some(v);
                }
            }
        }
    }

    fn validate(&self, value: StateValue) -> Result<StateValue, DeviceError> {
        match self.units {
            Units::Switch => value
                .as_bool()
                .map(StateValue::Bool)
                .ok_or_else(|| DeviceError::InvalidValue(format!("{} expects a boolean", self.name))),
            Units::Percent => {
                let pct = value.as_f64().ok_or_else(|| {
                    DeviceError::InvalidValue(format!("{} expects a number", self.name))
                })?;
                Ok(StateValue::Number(clamp_percent(pct)))
            }
            Units::Mode => {
                let name = value.as_str().ok_or_else(|| {
                    DeviceError::InvalidValue(format!("{} expects a mode name", self.name))
                })?;
                let canonical = self.canonical_mode(name).ok_or_else(|| {
                    DeviceError::InvalidValue(format!("{}: unknown mode {name:?}", self.name))
                })?;
                Ok(StateValue::Text(canonical.to_string()))
            }
            Units::Passthrough => match (self.range, value.as_f64()) {
                (Some(r), Some(v)) => Ok(StateValue::Number(v.clamp(r.min, r.max))),
                _ => Ok(value),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_core::MemoryGateway;

    fn level_property() -> Property {
        Property::new("Alexa.BrightnessController", "brightness")
            .with_set_id("dim.level")
            .with_range(ValueRange::new(500.0, 1000.0))
            .with_units(Units::Percent)
    }

    #[tokio::test]
    async fn test_percent_read_denormalizes() {
        let gw = MemoryGateway::new();
        gw.seed("dim.level", 875.0).await;
        let mut p = level_property();
        assert_eq!(p.value(&gw).await, Some(StateValue::Number(75.0)));
        // Second read comes from the cache.
        gw.seed("dim.level", 500.0).await;
        assert_eq!(p.value(&gw).await, Some(StateValue::Number(75.0)));
    }

    #[tokio::test]
    async fn test_percent_write_scales_and_clamps() {
        let gw = MemoryGateway::new();
        let mut p = level_property();
        let accepted = p.set(&gw, StateValue::Number(75.0)).await.unwrap();
        assert_eq!(accepted, StateValue::Number(75.0));
        assert_eq!(gw.last_write("dim.level").await, Some(StateValue::Number(875.0)));

        let accepted = p.set(&gw, StateValue::Number(101.0)).await.unwrap();
        assert_eq!(accepted, StateValue::Number(100.0));
        assert_eq!(gw.last_write("dim.level").await, Some(StateValue::Number(1000.0)));
        assert_eq!(p.last_nonzero(), Some(100.0));
    }

    #[tokio::test]
    async fn test_switch_sentinels_on_numeric_id() {
        let mut p = Property::new("Alexa.PowerController", "powerState")
            .with_set_id("dim.level")
            .with_range(ValueRange::new(500.0, 1000.0))
            .with_units(Units::Switch);
        assert_eq!(
            p.from_backend(&StateValue::Number(500.0)),
            Some(StateValue::Bool(false))
        );
        assert_eq!(
            p.from_backend(&StateValue::Number(1000.0)),
            Some(StateValue::Bool(true))
        );
        // Mid-range counts as truthy-for-number.
        assert_eq!(
            p.from_backend(&StateValue::Number(750.0)),
            Some(StateValue::Bool(true))
        );

        let gw = MemoryGateway::new();
        p.set(&gw, StateValue::Bool(true)).await.unwrap();
        assert_eq!(gw.last_write("dim.level").await, Some(StateValue::Number(1000.0)));
    }

    #[tokio::test]
    async fn test_failed_read_reports_unknown() {
        let gw = MemoryGateway::new();
        let mut p = level_property();
        assert_eq!(p.value(&gw).await, None);
    }

    #[tokio::test]
    async fn test_get_id_fallback_and_invalidate() {
        let gw = MemoryGateway::new();
        gw.seed("dim.actual", 750.0).await;
        let mut p = level_property().with_get_id("dim.actual");
        assert_eq!(p.value(&gw).await, Some(StateValue::Number(50.0)));

        gw.seed("dim.actual", 1000.0).await;
        p.invalidate();
        assert_eq!(p.value(&gw).await, Some(StateValue::Number(100.0)));
    }

    #[test]
    fn test_degenerate_range_is_unavailable() {
        let p = Property::new("Alexa.BrightnessController", "brightness")
            .with_set_id("x")
            .with_range(ValueRange::new(100.0, 100.0))
            .with_units(Units::Percent);
        assert_eq!(p.from_backend(&StateValue::Number(100.0)), None);
    }

    #[tokio::test]
    async fn test_mode_map_round_trip() {
        let gw = MemoryGateway::new();
        gw.seed("th.mode", 1.0).await;
        let mut p = Property::new("Alexa.ThermostatController", "thermostatMode")
            .with_set_id("th.mode")
            .with_units(Units::Mode)
            .with_mode_map(vec![(0.0, "AUTO".into()), (1.0, "HEAT".into()), (2.0, "OFF".into())]);

        assert_eq!(p.value(&gw).await, Some(StateValue::Text("HEAT".into())));

        // Case-insensitive set, canonical name cached, numeric value written.
        let accepted = p.set(&gw, StateValue::Text("off".into())).await.unwrap();
        assert_eq!(accepted, StateValue::Text("OFF".into()));
        assert_eq!(gw.last_write("th.mode").await, Some(StateValue::Number(2.0)));

        let err = p.set(&gw, StateValue::Text("TURBO".into())).await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidValue(_)));
    }

    #[test]
    fn test_apply_backend_updates_cache() {
        let mut p = level_property();
        assert!(p.apply_backend(&StateValue::Number(900.0)));
        assert_eq!(p.current(), Some(&StateValue::Number(80.0)));
        assert_eq!(p.last_nonzero(), Some(80.0));
        // Unconvertible raw drops the cache instead of guessing.
        assert!(!p.apply_backend(&StateValue::Text("garbage".into())));
        assert_eq!(p.current(), None);
    }
}
