use crate::core::{ConfigKey, ProgressState, SpeedMode, TipIndex, TIP_COUNT};

pub const DEFAULT_BANNER: &str = "System Is Ready";
pub const DEFAULT_PROCESSING: &str = "Processing...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemConfig {
    pub baud_rate: u16,
    pub parity: u16,
    pub stop_bits: u16,
    pub byte_size: u16,
    pub slave_id: u16,
    pub update_rate: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TipReading {
    pub active: bool,
    /// Percent, 0..=100
    pub progress: u16,
    pub joules: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneralUi {
    pub minutes: u16,
    pub seconds: u16,
    pub slider: u16,
}

impl Default for GeneralUi {
    fn default() -> Self {
        Self {
            minutes: 1,
            seconds: 46,
            slider: 0,
        }
    }
}

impl GeneralUi {
    pub fn time_text(&self) -> String {
        format!("∼{}m {:02}sec", self.minutes, self.seconds)
    }

    pub fn percent_text(&self) -> String {
        format!("{}%", self.slider)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkPosition {
    pub current: f64,
    pub setpoint: f64,
    pub speed_mode: SpeedMode,
    pub up: bool,
    pub down: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeatingSetpoint {
    pub energy: f64,
    pub distance: f64,
    pub heat_start_delay: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Monitor {
    pub pressure_psi: u16,
    pub left_start: bool,
    pub right_start: bool,
    pub estop_active: bool,
    pub home_switch: bool,
    pub pressure_ok: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualControls {
    pub heating_buttons: [bool; TIP_COUNT],
    pub cooling: bool,
    /// Mirror of the work-position current value
    pub platen_mm: f64,
}

/// Configuration counters in [`ConfigKey::ALL`] order
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Configuration {
    values: [f64; 6],
}

impl Configuration {
    pub fn get(&self, key: ConfigKey) -> f64 {
        self.values[Self::slot(key)]
    }

    pub fn set(&mut self, key: ConfigKey, value: f64) {
        self.values[Self::slot(key)] = value;
    }

    fn slot(key: ConfigKey) -> usize {
        key as usize
    }
}

/// Decoded state of the controller after one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub system: SystemConfig,
    pub tips: [TipReading; TIP_COUNT],
    pub progress: [ProgressState; 6],
    pub ui: GeneralUi,
    pub monitor: Monitor,
    pub banner: String,
    pub processing: String,
    pub work_position: WorkPosition,
    pub tip_distances: [f64; TIP_COUNT],
    pub heating: [HeatingSetpoint; TIP_COUNT],
    pub configuration: Configuration,
    pub manual: ManualControls,
}

impl Default for Snapshot {
    /// The controller's power-on screen
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            tips: [TipReading::default(); TIP_COUNT],
            progress: [ProgressState::Inactive; 6],
            ui: GeneralUi::default(),
            monitor: Monitor::default(),
            banner: DEFAULT_BANNER.to_string(),
            processing: DEFAULT_PROCESSING.to_string(),
            work_position: WorkPosition::default(),
            tip_distances: [0.0; TIP_COUNT],
            heating: [HeatingSetpoint::default(); TIP_COUNT],
            configuration: Configuration::default(),
            manual: ManualControls::default(),
        }
    }
}

impl Snapshot {
    pub fn tip(&self, tip: TipIndex) -> &TipReading {
        &self.tips[tip.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_defaults() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.ui.time_text(), "∼1m 46sec");
        assert_eq!(snapshot.ui.percent_text(), "0%");
        assert_eq!(snapshot.banner, "System Is Ready");
        assert_eq!(snapshot.processing, "Processing...");
        assert!(snapshot.tips.iter().all(|tip| !tip.active));
    }

    #[test]
    fn test_configuration_by_key() {
        let mut configuration = Configuration::default();
        configuration.set(ConfigKey::CoolTime, 2.5);
        assert_eq!(configuration.get(ConfigKey::CoolTime), 2.5);
        assert_eq!(configuration.get(ConfigKey::WeldTime), 0.0);
    }
}
