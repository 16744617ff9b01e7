//! Cross-property coupling rules.
//!
//! Device archetypes couple power and level state (a dimmer turned on must
//! restore its last brightness, setting brightness must not spuriously
//! report power off, ...). Each rule is a pure function over the prior
//! property values and the requested change set, applied in a fixed order
//! per control type, so the rules are testable without backend I/O.

/// Prior state of a power+level pair, in protocol units.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelSnapshot {
    /// Current power state, if known.
    pub power: Option<bool>,
    /// Current brightness/percentage, if known.
    pub level: Option<f64>,
    /// Last non-zero level seen on the level property.
    pub last_nonzero: Option<f64>,
    /// Configured restore level for TurnOn.
    pub by_on: Option<f64>,
}

/// Requested (and, after rule application, resulting) changes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelChange {
    /// Power value to write, if any.
    pub power: Option<bool>,
    /// Level percentage to write, if any.
    pub level: Option<f64>,
    /// Whether the response reports powerState.
    pub report_power: bool,
    /// Whether the response reports brightness/percentage.
    pub report_level: bool,
}

impl LevelChange {
    pub fn set_level(level: f64) -> Self {
        Self {
            level: Some(level),
            report_level: true,
            ..Self::default()
        }
    }

    pub fn set_power(on: bool) -> Self {
        Self {
            power: Some(on),
            report_power: true,
            ..Self::default()
        }
    }
}

/// One coupling rule.
pub type CouplingRule = fn(&LevelSnapshot, &mut LevelChange);

/// Apply an ordered rule list.
pub fn apply(rules: &[CouplingRule], prior: &LevelSnapshot, change: &mut LevelChange) {
    for rule in rules {
        rule(prior, change);
    }
}

/// Level to restore when the device turns on.
fn restore_level(prior: &LevelSnapshot) -> f64 {
    prior
        .level
        .filter(|v| *v > 0.0)
        .or(prior.last_nonzero)
        .or(prior.by_on)
        .unwrap_or(100.0)
}

/// Separate power id: setting a level above zero implicitly powers on.
pub fn level_powers_on(_prior: &LevelSnapshot, change: &mut LevelChange) {
    if change.power.is_none() && matches!(change.level, Some(v) if v > 0.0) {
        change.power = Some(true);
        change.report_power = true;
    }
}

/// Separate power id: level zero leaves power alone and reports level only.
pub fn level_zero_keeps_power(_prior: &LevelSnapshot, change: &mut LevelChange) {
    if matches!(change.level, Some(v) if v == 0.0) && change.power != Some(false) {
        change.power = None;
        change.report_power = false;
    }
}

/// Turning on restores the last non-zero level (or the configured default)
/// and reports both properties.
pub fn power_on_restores_level(prior: &LevelSnapshot, change: &mut LevelChange) {
    if change.power == Some(true) && change.level.is_none() {
        change.level = Some(restore_level(prior));
        change.report_level = true;
    }
}

/// Separate power id: turning off reports only powerState and leaves the
/// stored level untouched.
pub fn power_off_keeps_level(_prior: &LevelSnapshot, change: &mut LevelChange) {
    if change.power == Some(false) {
        change.level = None;
        change.report_level = false;
    }
}

/// Single shared id: turning off forces the level to zero and reports it.
pub fn power_off_forces_zero(_prior: &LevelSnapshot, change: &mut LevelChange) {
    if change.power == Some(false) {
        change.level = Some(0.0);
        change.report_level = true;
    }
}

/// Rule order for a device with separate power and level ids.
pub const SEPARATE_POWER_RULES: &[CouplingRule] = &[
    level_powers_on,
    level_zero_keeps_power,
    power_on_restores_level,
    power_off_keeps_level,
];

/// Rule order for a device with a single numeric id for both concerns.
pub const SHARED_ID_RULES: &[CouplingRule] =
    &[power_on_restores_level, power_off_forces_zero];

#[cfg(test)]
mod tests {
    use super::*;

    fn prior(power: Option<bool>, level: Option<f64>) -> LevelSnapshot {
        LevelSnapshot {
            power,
            level,
            last_nonzero: None,
            by_on: None,
        }
    }

    #[test]
    fn test_brightness_implies_power_on() {
        let mut change = LevelChange::set_level(75.0);
        apply(SEPARATE_POWER_RULES, &prior(Some(false), Some(0.0)), &mut change);
        assert_eq!(change.power, Some(true));
        assert!(change.report_power);
        assert!(change.report_level);
    }

    #[test]
    fn test_brightness_zero_leaves_power() {
        let mut change = LevelChange::set_level(0.0);
        apply(SEPARATE_POWER_RULES, &prior(Some(true), Some(60.0)), &mut change);
        assert_eq!(change.power, None);
        assert!(!change.report_power);
        assert_eq!(change.level, Some(0.0));
        assert!(change.report_level);
    }

    #[test]
    fn test_turn_on_restores_last_level() {
        let mut change = LevelChange::set_power(true);
        apply(SEPARATE_POWER_RULES, &prior(Some(false), Some(80.0)), &mut change);
        assert_eq!(change.level, Some(80.0));
        assert!(change.report_level);
    }

    #[test]
    fn test_turn_on_falls_back_to_by_on_then_full() {
        let mut change = LevelChange::set_power(true);
        let mut snap = prior(Some(false), Some(0.0));
        snap.by_on = Some(40.0);
        apply(SEPARATE_POWER_RULES, &snap, &mut change);
        assert_eq!(change.level, Some(40.0));

        let mut change = LevelChange::set_power(true);
        apply(SEPARATE_POWER_RULES, &prior(None, None), &mut change);
        assert_eq!(change.level, Some(100.0));
    }

    #[test]
    fn test_turn_off_reports_only_power() {
        let mut change = LevelChange::set_power(false);
        apply(SEPARATE_POWER_RULES, &prior(Some(true), Some(75.0)), &mut change);
        assert_eq!(change.level, None);
        assert!(!change.report_level);
        assert!(change.report_power);
    }

    #[test]
    fn test_shared_id_off_forces_zero() {
        let mut change = LevelChange::set_power(false);
        apply(SHARED_ID_RULES, &prior(Some(true), Some(75.0)), &mut change);
        assert_eq!(change.level, Some(0.0));
        assert!(change.report_level);
    }

    #[test]
    fn test_shared_id_level_set_stays_local() {
        // Setting brightness to zero on a shared id must not report off.
        let mut change = LevelChange::set_level(0.0);
        apply(SHARED_ID_RULES, &prior(Some(true), Some(75.0)), &mut change);
        assert_eq!(change.power, None);
        assert!(!change.report_power);
    }
}
