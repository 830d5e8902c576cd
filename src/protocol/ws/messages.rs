//! JSON messages exchanged with the operator console.
//!
//! Every message is an object tagged by its `type` field. Outbound payloads
//! keyed by tip use the tip number as a string key ("1".."8").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    core::{ConfigKey, JogButton, ProgressState, SpeedMode, TipIndex},
    error::{BridgeError, Result},
};

/// Map keyed by tip number as a string
pub type PerTip<T> = BTreeMap<String, T>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    UpdateElement {
        element_id: String,
        property: String,
        value: String,
    },
    UpdateTipState {
        tip_number: u8,
        is_active: bool,
    },
    UpdateProgressBar {
        element_id: String,
        progress: u16,
    },
    UpdateProgressStates {
        states: BTreeMap<String, ProgressState>,
    },
    UpdateSlider {
        position: u16,
    },
    WorkPositionUpdate {
        data: WorkPositionPayload,
    },
    ModbusUpdate {
        payload: TipsPayload,
    },
    HeatingUpdate {
        payload: PerTip<HeatingTipPayload>,
    },
    MonitorUpdate {
        payload: MonitorPayload,
    },
    ManualControlsUpdate {
        payload: ManualControlsPayload,
    },
    ConfigurationUpdate {
        payload: ConfigurationPayload,
    },
}

impl Outbound {
    /// `update_element` setting the text content of a console element
    pub fn text(element_id: impl Into<String>, value: impl Into<String>) -> Self {
        Outbound::UpdateElement {
            element_id: element_id.into(),
            property: "textContent".to_string(),
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message type as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::UpdateElement { .. } => "update_element",
            Outbound::UpdateTipState { .. } => "update_tip_state",
            Outbound::UpdateProgressBar { .. } => "update_progress_bar",
            Outbound::UpdateProgressStates { .. } => "update_progress_states",
            Outbound::UpdateSlider { .. } => "update_slider",
            Outbound::WorkPositionUpdate { .. } => "work_position_update",
            Outbound::ModbusUpdate { .. } => "modbus_update",
            Outbound::HeatingUpdate { .. } => "heating_update",
            Outbound::MonitorUpdate { .. } => "monitor_update",
            Outbound::ManualControlsUpdate { .. } => "manual_controls_update",
            Outbound::ConfigurationUpdate { .. } => "configuration_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkPositionPayload {
    pub current_position: f64,
    pub setpoint: f64,
    pub speed_mode: SpeedMode,
    pub up_button: bool,
    pub down_button: bool,
    pub tip_distances: PerTip<f64>,
    pub tip_states: PerTip<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipsPayload {
    pub tips: PerTip<TipPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipPayload {
    pub active: bool,
    pub progress: u16,
    pub joules: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatingTipPayload {
    pub active: bool,
    pub energy: f64,
    pub distance: f64,
    pub heat_start_delay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorPayload {
    pub pressure_psi: u16,
    pub left_start: bool,
    pub right_start: bool,
    pub estop_active: bool,
    pub home_switch: bool,
    pub pressure_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualControlsPayload {
    pub heating_buttons: PerTip<bool>,
    pub cooling: bool,
    pub platen_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationPayload {
    pub weld_time: f64,
    pub pulse_energy: f64,
    pub cool_time: f64,
    pub presence_height: f64,
    pub boss_tolerance_minus: f64,
    pub boss_tolerance_plus: f64,
}

/// Messages the console sends to the bridge.
///
/// Tip numbers are validated while deserializing, so a message that parses
/// is safe to turn into register writes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    RequestAllValues,
    RequestWorkPositionState,
    RequestHeatingValues,
    ButtonPress {
        button: JogButton,
        #[serde(default)]
        state: bool,
    },
    SetSpeedMode {
        mode: SpeedMode,
    },
    SetWorkPosition,
    UpdateTipActive {
        #[serde(rename = "tipNumber")]
        tip: TipIndex,
        active: bool,
    },
    UpdateHeatingEnergy {
        #[serde(rename = "tipNumber")]
        tip: TipIndex,
        value: f64,
    },
    UpdateHeatingDistance {
        #[serde(rename = "tipNumber")]
        tip: TipIndex,
        value: f64,
    },
    #[serde(alias = "update_heating_heat_start_delay")]
    UpdateHeatStartDelay {
        #[serde(rename = "tipNumber")]
        tip: TipIndex,
        value: f64,
    },
    UpdateConfiguration {
        key: ConfigKey,
        value: f64,
    },
    ManualHeatButton {
        tip: TipIndex,
        state: bool,
    },
    ManualCooling {
        state: bool,
    },
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| BridgeError::InvalidMessage(format!("{err}: {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_shapes() {
        let message = Outbound::text("home-text-percent", "42%");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "update_element",
                "element_id": "home-text-percent",
                "property": "textContent",
                "value": "42%"
            })
        );

        let message = Outbound::UpdateTipState {
            tip_number: 3,
            is_active: true,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "update_tip_state", "tip_number": 3, "is_active": true})
        );
        assert_eq!(message.kind(), "update_tip_state");
    }

    #[test]
    fn test_inbound_parses_known_messages() {
        assert_eq!(
            Inbound::parse(r#"{"type":"request_all_values"}"#).unwrap(),
            Inbound::RequestAllValues
        );
        assert_eq!(
            Inbound::parse(r#"{"type":"button_press","button":"up","state":true}"#).unwrap(),
            Inbound::ButtonPress {
                button: JogButton::Up,
                state: true
            }
        );
        assert_eq!(
            Inbound::parse(r#"{"type":"set_speed_mode","mode":"fine"}"#).unwrap(),
            Inbound::SetSpeedMode {
                mode: SpeedMode::Fine
            }
        );
        assert_eq!(
            Inbound::parse(r#"{"type":"update_tip_active","tipNumber":4,"active":true}"#)
                .unwrap(),
            Inbound::UpdateTipActive {
                tip: TipIndex::new(4).unwrap(),
                active: true
            }
        );
        assert_eq!(
            Inbound::parse(r#"{"type":"update_configuration","key":"weld_time","value":1.25}"#)
                .unwrap(),
            Inbound::UpdateConfiguration {
                key: ConfigKey::WeldTime,
                value: 1.25
            }
        );
    }

    #[test]
    fn test_inbound_rejects_invalid_messages() {
        for text in [
            r#"{"type":"update_tip_active","tipNumber":9,"active":true}"#,
            r#"{"type":"manual_heat_button","tip":0,"state":true}"#,
            r#"{"type":"set_speed_mode","mode":"turbo"}"#,
            r#"{"type":"button_press","button":"left","state":true}"#,
            r#"{"type":"update_configuration","key":"nozzle","value":1}"#,
            r#"{"type":"launch_rockets"}"#,
            "not json",
        ] {
            assert!(
                matches!(Inbound::parse(text), Err(BridgeError::InvalidMessage(_))),
                "{text} should be rejected"
            );
        }
    }
}
