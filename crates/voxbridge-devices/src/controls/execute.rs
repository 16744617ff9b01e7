//! Directive execution against a control's capability set.
//!
//! Execution translates the directive payload into property writes, runs
//! the control's coupling rules, and collects the wire readings for the
//! changed plus coupled properties.

use serde_json::Value;
use tracing::debug;

use voxbridge_alexa::{Directive, PropertyReading};
use voxbridge_core::{nearest_step, nearest_step_index, StateGateway, StateValue};

use crate::capability::{iface, prop};
use crate::coupling::{self, LevelChange, LevelSnapshot, SEPARATE_POWER_RULES, SHARED_ID_RULES};
use crate::error::DeviceError;

use super::{ColorPriority, Control, ControlKind};

/// Result of executing one directive.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Changed plus coupled properties, in report order.
    pub reported: Vec<PropertyReading>,
    /// Scene activations respond with ActivationStarted and no context.
    pub scene: bool,
}

impl Outcome {
    fn of(reported: Vec<PropertyReading>) -> Self {
        Self {
            reported,
            scene: false,
        }
    }
}

fn number(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key)?.as_f64()
}

/// Accepts both `{ "key": 21.5 }` and `{ "key": { "value": 21.5 } }`.
fn scaled_number(payload: &Value, key: &str) -> Option<f64> {
    let field = payload.get(key)?;
    field.as_f64().or_else(|| field.get("value")?.as_f64())
}

/// Accepts both `{ "key": "OFF" }` and `{ "key": { "value": "OFF" } }`.
fn enum_string(payload: &Value, key: &str) -> Option<String> {
    let field = payload.get(key)?;
    field
        .as_str()
        .map(String::from)
        .or_else(|| field.get("value")?.as_str().map(String::from))
}

impl Control {
    /// Execute a matched directive.
    pub async fn execute(
        &mut self,
        gateway: &dyn StateGateway,
        directive: &Directive,
    ) -> Result<Outcome, DeviceError> {
        let namespace = directive.header.namespace.as_str();
        let name = directive.header.name.as_str();
        debug!(kind = ?self.kind(), namespace, name, "executing directive");

        match (namespace, name) {
            (iface::POWER, "TurnOn") => self.execute_power(gateway, true).await,
            (iface::POWER, "TurnOff") => self.execute_power(gateway, false).await,
            (iface::BRIGHTNESS, "SetBrightness") => {
                let level = number(&directive.payload, "brightness").ok_or_else(|| {
                    DeviceError::InvalidValue("SetBrightness requires brightness".into())
                })?;
                self.execute_level(gateway, iface::BRIGHTNESS, prop::BRIGHTNESS, level)
                    .await
            }
            (iface::BRIGHTNESS, "AdjustBrightness") => {
                let delta = number(&directive.payload, "brightnessDelta").ok_or_else(|| {
                    DeviceError::InvalidValue("AdjustBrightness requires brightnessDelta".into())
                })?;
                self.execute_level_adjust(gateway, iface::BRIGHTNESS, prop::BRIGHTNESS, delta)
                    .await
            }
            (iface::PERCENTAGE, "SetPercentage") => {
                let level = number(&directive.payload, "percentage").ok_or_else(|| {
                    DeviceError::InvalidValue("SetPercentage requires percentage".into())
                })?;
                self.execute_level(gateway, iface::PERCENTAGE, prop::PERCENTAGE, level)
                    .await
            }
            (iface::PERCENTAGE, "AdjustPercentage") => {
                let delta = number(&directive.payload, "percentageDelta").ok_or_else(|| {
                    DeviceError::InvalidValue("AdjustPercentage requires percentageDelta".into())
                })?;
                self.execute_level_adjust(gateway, iface::PERCENTAGE, prop::PERCENTAGE, delta)
                    .await
            }
            (iface::COLOR, "SetColor") => self.execute_color(gateway, &directive.payload).await,
            (iface::COLOR_TEMPERATURE, "SetColorTemperature") => {
                let kelvin =
                    number(&directive.payload, "colorTemperatureInKelvin").ok_or_else(|| {
                        DeviceError::InvalidValue(
                            "SetColorTemperature requires colorTemperatureInKelvin".into(),
                        )
                    })?;
                self.execute_ct_set(gateway, kelvin).await
            }
            (iface::COLOR_TEMPERATURE, "IncreaseColorTemperature") => {
                self.execute_ct_step(gateway, 1).await
            }
            (iface::COLOR_TEMPERATURE, "DecreaseColorTemperature") => {
                self.execute_ct_step(gateway, -1).await
            }
            (iface::THERMOSTAT, "SetTargetTemperature") => {
                let target = scaled_number(&directive.payload, "targetSetpoint").ok_or_else(|| {
                    DeviceError::InvalidValue("SetTargetTemperature requires targetSetpoint".into())
                })?;
                self.execute_setpoint(gateway, target).await
            }
            (iface::THERMOSTAT, "AdjustTargetTemperature") => {
                let delta =
                    scaled_number(&directive.payload, "targetSetpointDelta").ok_or_else(|| {
                        DeviceError::InvalidValue(
                            "AdjustTargetTemperature requires targetSetpointDelta".into(),
                        )
                    })?;
                let current = self
                    .property_number(gateway, iface::THERMOSTAT, prop::TARGET_SETPOINT)
                    .await
                    .ok_or_else(|| {
                        DeviceError::InvalidValue("current setpoint unavailable".into())
                    })?;
                self.execute_setpoint(gateway, current + delta).await
            }
            (iface::THERMOSTAT, "SetThermostatMode") => {
                let mode = enum_string(&directive.payload, "thermostatMode").ok_or_else(|| {
                    DeviceError::InvalidValue("SetThermostatMode requires thermostatMode".into())
                })?;
                self.execute_thermostat_mode(gateway, &mode).await
            }
            (iface::LOCK, "Lock") => self.execute_lock(gateway, true).await,
            (iface::LOCK, "Unlock") => self.execute_lock(gateway, false).await,
            (iface::MODE, "SetMode") => {
                let mode = enum_string(&directive.payload, "mode").ok_or_else(|| {
                    DeviceError::InvalidValue("SetMode requires mode".into())
                })?;
                self.execute_mode(gateway, &mode).await
            }
            (iface::SCENE, "Activate") => self.execute_scene(gateway).await,
            (iface::SPEAKER, "SetVolume") => {
                let volume = number(&directive.payload, "volume").ok_or_else(|| {
                    DeviceError::InvalidValue("SetVolume requires volume".into())
                })?;
                self.execute_volume(gateway, volume).await
            }
            (iface::SPEAKER, "AdjustVolume") => {
                let delta = number(&directive.payload, "volume").ok_or_else(|| {
                    DeviceError::InvalidValue("AdjustVolume requires volume".into())
                })?;
                let current = self
                    .property_number(gateway, iface::SPEAKER, prop::VOLUME)
                    .await
                    .unwrap_or(0.0);
                self.execute_volume(gateway, (current + delta).clamp(0.0, 100.0))
                    .await
            }
            (iface::SPEAKER, "SetMute") => {
                let mute = directive
                    .payload
                    .get("mute")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| DeviceError::InvalidValue("SetMute requires mute".into()))?;
                self.execute_mute(gateway, mute).await
            }
            _ => Err(DeviceError::UnsupportedDirective(format!(
                "{namespace}/{name}"
            ))),
        }
    }

    /// Current wire reading of one property from its cache.
    fn reading(&self, namespace: &str, name: &str) -> Option<PropertyReading> {
        let cap = self.capability(namespace)?;
        let p = cap.property(name)?;
        let value = p.current()?;
        Some(cap.reading_of(p, value))
    }

    async fn property_number(
        &mut self,
        gateway: &dyn StateGateway,
        namespace: &str,
        name: &str,
    ) -> Option<f64> {
        let p = self.capability_mut(namespace)?.property_mut(name)?;
        p.value(gateway).await.and_then(|v| v.as_f64())
    }

    async fn set_property(
        &mut self,
        gateway: &dyn StateGateway,
        namespace: &str,
        name: &str,
        value: StateValue,
    ) -> Result<StateValue, DeviceError> {
        let p = self
            .capability_mut(namespace)
            .and_then(|c| c.property_mut(name))
            .ok_or_else(|| DeviceError::UnsupportedDirective(format!("{namespace}/{name}")))?;
        p.set(gateway, value).await
    }

    /// Level namespace coupled with power on this control, if any.
    fn level_target(&self) -> Option<(&'static str, &'static str)> {
        if self.capability(iface::BRIGHTNESS).is_some() {
            Some((iface::BRIGHTNESS, prop::BRIGHTNESS))
        } else if self.capability(iface::PERCENTAGE).is_some() {
            Some((iface::PERCENTAGE, prop::PERCENTAGE))
        } else {
            None
        }
    }

    async fn execute_power(
        &mut self,
        gateway: &dyn StateGateway,
        on: bool,
    ) -> Result<Outcome, DeviceError> {
        if self.kind() == ControlKind::AirCondition {
            return self.execute_ac_power(gateway, on).await;
        }
        match self.level_target() {
            Some((level_ns, level_name)) => {
                let reported = self
                    .run_level_coupled(gateway, LevelChange::set_power(on), level_ns, level_name)
                    .await?;
                Ok(Outcome::of(reported))
            }
            None => {
                self.set_property(gateway, iface::POWER, prop::POWER_STATE, StateValue::Bool(on))
                    .await?;
                Ok(Outcome::of(
                    self.reading(iface::POWER, prop::POWER_STATE).into_iter().collect(),
                ))
            }
        }
    }

    async fn execute_level(
        &mut self,
        gateway: &dyn StateGateway,
        level_ns: &'static str,
        level_name: &'static str,
        level: f64,
    ) -> Result<Outcome, DeviceError> {
        let reported = self
            .run_level_coupled(gateway, LevelChange::set_level(level), level_ns, level_name)
            .await?;
        Ok(Outcome::of(reported))
    }

    async fn execute_level_adjust(
        &mut self,
        gateway: &dyn StateGateway,
        level_ns: &'static str,
        level_name: &'static str,
        delta: f64,
    ) -> Result<Outcome, DeviceError> {
        let current = self
            .property_number(gateway, level_ns, level_name)
            .await
            .unwrap_or(0.0);
        self.execute_level(gateway, level_ns, level_name, (current + delta).clamp(0.0, 100.0))
            .await
    }

    /// The power/level coupling path shared by dimmers, color
    /// lights and blinds: build the prior snapshot, run the rule list for
    /// the id layout, perform the resulting writes, report what the rules
    /// marked reportable.
    async fn run_level_coupled(
        &mut self,
        gateway: &dyn StateGateway,
        initial: LevelChange,
        level_ns: &'static str,
        level_name: &'static str,
    ) -> Result<Vec<PropertyReading>, DeviceError> {
        let separate = self.config.power_set_id.is_some();
        let rules = if separate {
            SEPARATE_POWER_RULES
        } else {
            SHARED_ID_RULES
        };

        let mut snapshot = LevelSnapshot {
            by_on: self.config.by_on,
            ..LevelSnapshot::default()
        };
        if let Some(p) = self
            .capability_mut(level_ns)
            .and_then(|c| c.property_mut(level_name))
        {
            snapshot.level = p.value(gateway).await.and_then(|v| v.as_f64());
            snapshot.last_nonzero = p.last_nonzero();
        }
        if let Some(p) = self
            .capability_mut(iface::POWER)
            .and_then(|c| c.property_mut(prop::POWER_STATE))
        {
            snapshot.power = p.value(gateway).await.and_then(|v| v.as_bool());
        }

        let mut change = initial;
        coupling::apply(rules, &snapshot, &mut change);

        if separate {
            let power_first = initial.power.is_some();
            if power_first {
                if let Some(on) = change.power {
                    self.set_property(gateway, iface::POWER, prop::POWER_STATE, StateValue::Bool(on))
                        .await?;
                }
            }
            if let Some(level) = change.level {
                self.set_property(gateway, level_ns, level_name, StateValue::Number(level))
                    .await?;
            }
            if !power_first {
                if let Some(on) = change.power {
                    self.set_property(gateway, iface::POWER, prop::POWER_STATE, StateValue::Bool(on))
                        .await?;
                }
            }
        } else {
            // Single shared id: all writes go through the level property,
            // the power cache follows without its own backend write.
            if let Some(level) = change.level {
                self.set_property(gateway, level_ns, level_name, StateValue::Number(level))
                    .await?;
            }
            if let Some(on) = change.power {
                if let Some(p) = self
                    .capability_mut(iface::POWER)
                    .and_then(|c| c.property_mut(prop::POWER_STATE))
                {
                    p.cache(StateValue::Bool(on));
                }
            }
        }

        let mut reported = Vec::new();
        if change.report_power {
            reported.extend(self.reading(iface::POWER, prop::POWER_STATE));
        }
        if change.report_level {
            reported.extend(self.reading(level_ns, level_name));
        }
        Ok(reported)
    }

    async fn execute_color(
        &mut self,
        gateway: &dyn StateGateway,
        payload: &Value,
    ) -> Result<Outcome, DeviceError> {
        let hue = payload
            .get("color")
            .and_then(|c| c.get("hue"))
            .and_then(Value::as_f64)
            .ok_or_else(|| DeviceError::InvalidValue("SetColor requires color.hue".into()))?;
        self.set_property(gateway, iface::COLOR, prop::COLOR, StateValue::Number(hue))
            .await?;
        self.set_color_priority(ColorPriority::Rgb);
        Ok(Outcome::of(
            self.reading(iface::COLOR, prop::COLOR).into_iter().collect(),
        ))
    }

    async fn execute_ct_set(
        &mut self,
        gateway: &dyn StateGateway,
        kelvin: f64,
    ) -> Result<Outcome, DeviceError> {
        let target = if self.config.ct_steps.is_empty() {
            kelvin
        } else {
            nearest_step(kelvin, &self.config.ct_steps).ok_or_else(|| {
                DeviceError::InvalidValue("no color temperature steps configured".into())
            })?
        };
        self.set_property(
            gateway,
            iface::COLOR_TEMPERATURE,
            prop::COLOR_TEMPERATURE,
            StateValue::Number(target),
        )
        .await?;
        self.set_color_priority(ColorPriority::Ct);
        Ok(Outcome::of(
            self.reading(iface::COLOR_TEMPERATURE, prop::COLOR_TEMPERATURE)
                .into_iter()
                .collect(),
        ))
    }

    /// Step along the discrete Kelvin list, clamping at both ends.
    async fn execute_ct_step(
        &mut self,
        gateway: &dyn StateGateway,
        direction: i32,
    ) -> Result<Outcome, DeviceError> {
        let steps = self.config.ct_steps.clone();
        if steps.is_empty() {
            return Err(DeviceError::InvalidValue(
                "no color temperature steps configured".into(),
            ));
        }
        let current = self
            .property_number(gateway, iface::COLOR_TEMPERATURE, prop::COLOR_TEMPERATURE)
            .await
            .ok_or_else(|| DeviceError::InvalidValue("color temperature unknown".into()))?;
        let index = nearest_step_index(current, &steps)
            .ok_or_else(|| DeviceError::InvalidValue("color temperature unknown".into()))?;
        let next = index
            .saturating_add_signed(direction as isize)
            .min(steps.len() - 1);
        self.execute_ct_set(gateway, steps[next]).await
    }

    async fn execute_setpoint(
        &mut self,
        gateway: &dyn StateGateway,
        target: f64,
    ) -> Result<Outcome, DeviceError> {
        self.set_property(
            gateway,
            iface::THERMOSTAT,
            prop::TARGET_SETPOINT,
            StateValue::Number(target),
        )
        .await?;
        Ok(Outcome::of(
            self.reading(iface::THERMOSTAT, prop::TARGET_SETPOINT)
                .into_iter()
                .collect(),
        ))
    }

    async fn execute_thermostat_mode(
        &mut self,
        gateway: &dyn StateGateway,
        mode: &str,
    ) -> Result<Outcome, DeviceError> {
        let accepted = self
            .set_property(
                gateway,
                iface::THERMOSTAT,
                prop::THERMOSTAT_MODE,
                StateValue::Text(mode.to_string()),
            )
            .await?;
        let mut reported: Vec<PropertyReading> = self
            .reading(iface::THERMOSTAT, prop::THERMOSTAT_MODE)
            .into_iter()
            .collect();

        // AirCondition couples mode OFF with its power id.
        if self.kind() == ControlKind::AirCondition {
            let off = accepted.as_str() == Some("OFF");
            self.set_property(gateway, iface::POWER, prop::POWER_STATE, StateValue::Bool(!off))
                .await?;
            reported.extend(self.reading(iface::POWER, prop::POWER_STATE));
        }
        Ok(Outcome::of(reported))
    }

    async fn execute_ac_power(
        &mut self,
        gateway: &dyn StateGateway,
        on: bool,
    ) -> Result<Outcome, DeviceError> {
        self.set_property(gateway, iface::POWER, prop::POWER_STATE, StateValue::Bool(on))
            .await?;
        let mut reported: Vec<PropertyReading> = self
            .reading(iface::POWER, prop::POWER_STATE)
            .into_iter()
            .collect();

        if let Some(p) = self
            .capability_mut(iface::THERMOSTAT)
            .and_then(|c| c.property_mut(prop::THERMOSTAT_MODE))
        {
            if on {
                // Mode becomes whatever the backend reports again.
                p.invalidate();
                if p.value(gateway).await.is_some() {
                    reported.extend(self.reading(iface::THERMOSTAT, prop::THERMOSTAT_MODE));
                }
            } else {
                p.cache(StateValue::Text("OFF".to_string()));
                reported.extend(self.reading(iface::THERMOSTAT, prop::THERMOSTAT_MODE));
            }
        }
        Ok(Outcome::of(reported))
    }

    async fn execute_lock(
        &mut self,
        gateway: &dyn StateGateway,
        lock: bool,
    ) -> Result<Outcome, DeviceError> {
        if !lock {
            if let Some(open_id) = self.config.open_id.clone() {
                // Momentary open pulse instead of clearing the lock flag.
                gateway
                    .set_state(&open_id, StateValue::Bool(true), false)
                    .await?;
                if let Some(p) = self
                    .capability_mut(iface::LOCK)
                    .and_then(|c| c.property_mut(prop::LOCK_STATE))
                {
                    p.cache(StateValue::Bool(false));
                }
                return Ok(Outcome::of(
                    self.reading(iface::LOCK, prop::LOCK_STATE).into_iter().collect(),
                ));
            }
        }
        self.set_property(gateway, iface::LOCK, prop::LOCK_STATE, StateValue::Bool(lock))
            .await?;
        Ok(Outcome::of(
            self.reading(iface::LOCK, prop::LOCK_STATE).into_iter().collect(),
        ))
    }

    async fn execute_mode(
        &mut self,
        gateway: &dyn StateGateway,
        mode: &str,
    ) -> Result<Outcome, DeviceError> {
        self.set_property(gateway, iface::MODE, prop::MODE, StateValue::Text(mode.to_string()))
            .await?;
        Ok(Outcome::of(
            self.reading(iface::MODE, prop::MODE).into_iter().collect(),
        ))
    }

    async fn execute_scene(&mut self, gateway: &dyn StateGateway) -> Result<Outcome, DeviceError> {
        let set_id = self
            .config
            .set_id
            .clone()
            .ok_or_else(|| DeviceError::InvalidConfig("scene without a set id".into()))?;
        gateway
            .set_state(&set_id, StateValue::Bool(true), false)
            .await?;
        Ok(Outcome {
            reported: Vec::new(),
            scene: true,
        })
    }

    async fn execute_volume(
        &mut self,
        gateway: &dyn StateGateway,
        volume: f64,
    ) -> Result<Outcome, DeviceError> {
        self.set_property(gateway, iface::SPEAKER, prop::VOLUME, StateValue::Number(volume))
            .await?;
        Ok(Outcome::of(
            self.reading(iface::SPEAKER, prop::VOLUME).into_iter().collect(),
        ))
    }

    async fn execute_mute(
        &mut self,
        gateway: &dyn StateGateway,
        mute: bool,
    ) -> Result<Outcome, DeviceError> {
        self.set_property(gateway, iface::SPEAKER, prop::MUTED, StateValue::Bool(mute))
            .await?;
        Ok(Outcome::of(
            self.reading(iface::SPEAKER, prop::MUTED).into_iter().collect(),
        ))
    }
}
