use serde::{Deserialize, Serialize};

/// Jog speed of the platen, register value 0 (rapid) or 1 (fine)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMode {
    #[default]
    Rapid,
    Fine,
}

impl SpeedMode {
    pub fn from_register(value: u16) -> Self {
        if value == 0 {
            SpeedMode::Rapid
        } else {
            SpeedMode::Fine
        }
    }

    pub fn to_register(self) -> u16 {
        match self {
            SpeedMode::Rapid => 0,
            SpeedMode::Fine => 1,
        }
    }
}

/// Step of the machine cycle as shown on the progress strip.
///
/// Serialized as the raw register code (0, 1, 2) which is what the console
/// keys its styling on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum ProgressState {
    #[default]
    Inactive,
    Active,
    Done,
}

impl From<u16> for ProgressState {
    /// Codes outside 0..=2 are treated as inactive
    fn from(value: u16) -> Self {
        match value {
            1 => ProgressState::Active,
            2 => ProgressState::Done,
            _ => ProgressState::Inactive,
        }
    }
}

impl From<ProgressState> for u16 {
    fn from(state: ProgressState) -> Self {
        match state {
            ProgressState::Inactive => 0,
            ProgressState::Active => 1,
            ProgressState::Done => 2,
        }
    }
}

/// Jog buttons on the work-position screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JogButton {
    Up,
    Down,
}

impl JogButton {
    pub fn field(self) -> &'static str {
        match self {
            JogButton::Up => "work_position.up",
            JogButton::Down => "work_position.down",
        }
    }
}

/// Per-tip heating setpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatingParam {
    Energy,
    Distance,
    HeatStartDelay,
}

impl HeatingParam {
    pub fn name(self) -> &'static str {
        match self {
            HeatingParam::Energy => "energy",
            HeatingParam::Distance => "distance",
            HeatingParam::HeatStartDelay => "heat_start_delay",
        }
    }
}

/// Machine configuration counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    WeldTime,
    PulseEnergy,
    CoolTime,
    PresenceHeight,
    BossToleranceMinus,
    BossTolerancePlus,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::WeldTime,
        ConfigKey::PulseEnergy,
        ConfigKey::CoolTime,
        ConfigKey::PresenceHeight,
        ConfigKey::BossToleranceMinus,
        ConfigKey::BossTolerancePlus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::WeldTime => "weld_time",
            ConfigKey::PulseEnergy => "pulse_energy",
            ConfigKey::CoolTime => "cool_time",
            ConfigKey::PresenceHeight => "presence_height",
            ConfigKey::BossToleranceMinus => "boss_tolerance_minus",
            ConfigKey::BossTolerancePlus => "boss_tolerance_plus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::register_map::CONFIGURATION_KEYS;

    #[test]
    fn test_unknown_progress_code_is_inactive() {
        assert_eq!(ProgressState::from(2), ProgressState::Done);
        assert_eq!(ProgressState::from(7), ProgressState::Inactive);
        assert_eq!(serde_json::to_string(&ProgressState::Active).unwrap(), "1");
    }

    #[test]
    fn test_config_keys_follow_register_order() {
        let names: Vec<_> = ConfigKey::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, CONFIGURATION_KEYS);
    }

    #[test]
    fn test_speed_mode_wire_names() {
        assert_eq!(serde_json::to_string(&SpeedMode::Fine).unwrap(), "\"fine\"");
        assert_eq!(SpeedMode::from_register(0), SpeedMode::Rapid);
        assert_eq!(SpeedMode::Fine.to_register(), 1);
    }
}
