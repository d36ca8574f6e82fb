//! The three control rules, as pure functions.
//!
//! A rule returns `None` when an input is missing or the reading sits inside
//! a dead band; either way the actuator keeps whatever it was last told.

use super::actuator::{Actuator, Command};
use crate::settings::ControlSetting;
use crate::telemetry::{Channel, SensorSnapshot};

/// Feed pump thresholds: on at or below `on_at`, off at or above `off_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedBand {
    pub on_at: f64,
    pub off_at: f64,
}

impl Default for FeedBand {
    fn default() -> Self {
        Self { on_at: 20.0, off_at: 25.0 }
    }
}

/// Both heaters: on below setpoint, off otherwise.
#[must_use]
pub fn heater_command(cstr_temp: Option<f64>, set_cstr_temp: Option<f64>) -> Option<Command> {
    let (temp, set) = (cstr_temp?, set_cstr_temp?);
    Some(if temp < set { Command::On } else { Command::Off })
}

#[must_use]
pub fn feed_pump_command(feed_level: Option<f64>, band: FeedBand) -> Option<Command> {
    let level = feed_level?;
    if level <= band.on_at {
        Some(Command::On)
    } else if level >= band.off_at {
        Some(Command::Off)
    } else {
        None
    }
}

/// Opens the DS outlet above `set + hyst` and closes it below `set - hyst`.
#[must_use]
pub fn ds_outlet_command(ds_tds: Option<f64>, set_tds: Option<f64>, hyst_tds: Option<f64>) -> Option<Command> {
    let (tds, set, hyst) = (ds_tds?, set_tds?, hyst_tds?);
    if tds >= set + hyst {
        Some(Command::On)
    } else if tds < set - hyst {
        Some(Command::Off)
    } else {
        None
    }
}

/// Desired commands for every actuator whose rule currently decides.
#[must_use]
pub fn evaluate(snapshot: &SensorSnapshot, settings: Option<&ControlSetting>, band: FeedBand) -> Vec<(Actuator, Command)> {
    let mut desired = Vec::with_capacity(Actuator::ALL.len());

    if let Some(cmd) = feed_pump_command(snapshot.value(Channel::FeedLevel), band) {
        desired.push((Actuator::FeedPump, cmd));
    }

    let set = settings.cloned().unwrap_or_default();
    if let Some(cmd) = heater_command(snapshot.value(Channel::CstrTemp), set.set_cstr_temp) {
        desired.push((Actuator::Heater1, cmd));
        desired.push((Actuator::Heater2, cmd));
    }
    if let Some(cmd) = ds_outlet_command(snapshot.value(Channel::DsTds), set.set_tds, set.hyst_tds) {
        desired.push((Actuator::DsOutlet, cmd));
    }

    desired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heater() {
        assert_eq!(heater_command(Some(29.0), Some(30.0)), Some(Command::On));
        assert_eq!(heater_command(Some(30.0), Some(30.0)), Some(Command::Off));
        assert_eq!(heater_command(None, Some(30.0)), None);
        assert_eq!(heater_command(Some(29.0), None), None);
    }

    #[test]
    fn test_feed_band_edges_are_inclusive() {
        let band = FeedBand::default();
        assert_eq!(feed_pump_command(Some(20.0), band), Some(Command::On));
        assert_eq!(feed_pump_command(Some(20.1), band), None);
        assert_eq!(feed_pump_command(Some(24.9), band), None);
        assert_eq!(feed_pump_command(Some(25.0), band), Some(Command::Off));
        assert_eq!(feed_pump_command(None, band), None);
    }

    #[test]
    fn test_ds_outlet_band() {
        let cmd = |tds| ds_outlet_command(Some(tds), Some(40.0), Some(2.0));
        assert_eq!(cmd(42.0), Some(Command::On));
        assert_eq!(cmd(41.9), None);
        assert_eq!(cmd(38.0), None);
        assert_eq!(cmd(37.9), Some(Command::Off));
        assert_eq!(ds_outlet_command(Some(50.0), Some(40.0), None), None);
    }

    #[test]
    fn test_evaluate_without_settings_only_drives_feed_pump() {
        let mut snapshot = SensorSnapshot::default();
        snapshot.set(Channel::FeedLevel, crate::telemetry::Reading { value: 10.0, updated_at: 0 });
        snapshot.set(Channel::CstrTemp, crate::telemetry::Reading { value: 10.0, updated_at: 0 });

        let desired = evaluate(&snapshot, None, FeedBand::default());
        assert_eq!(desired, vec![(Actuator::FeedPump, Command::On)]);
    }

    #[test]
    fn test_evaluate_drives_both_heaters_identically() {
        let mut snapshot = SensorSnapshot::default();
        snapshot.set(Channel::CstrTemp, crate::telemetry::Reading { value: 35.0, updated_at: 0 });
        let settings = ControlSetting { set_cstr_temp: Some(30.0), ..Default::default() };

        let desired = evaluate(&snapshot, Some(&settings), FeedBand::default());
        assert_eq!(desired, vec![(Actuator::Heater1, Command::Off), (Actuator::Heater2, Command::Off)]);
    }
}
