use flume::{Sender, TrySendError};
use std::collections::BTreeMap;

use super::{differ::FieldKey, snapshot::Snapshot, state::Lifecycle};
use crate::{
    core::{ConfigKey, ProgressState, TipIndex},
    error::{BridgeError, Result},
    protocol::{
        register_map::PROGRESS_STATE_NAMES,
        ws::{
            ConfigurationPayload, HeatingTipPayload, ManualControlsPayload, MonitorPayload,
            Outbound, PerTip, TipPayload, TipsPayload, WorkPositionPayload,
        },
    },
};

pub const ELEMENT_PROCESSING: &str = "home-cycle-progress-text";
pub const ELEMENT_PERCENT: &str = "home-text-percent";
pub const ELEMENT_TIME: &str = "home-text-time";
pub const ELEMENT_BANNER: &str = "home-banner-text";

/// Where rendered messages go. The production sink is the outbound queue
/// drained by the console link thread.
pub trait OutboundSink {
    fn deliver(&mut self, message: Outbound) -> Result<()>;
}

/// Never blocks. A full queue means the console stopped draining it and is
/// treated like a lost connection.
impl OutboundSink for Sender<Outbound> {
    fn deliver(&mut self, message: Outbound) -> Result<()> {
        self.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => BridgeError::Disconnected(format!(
                "console stalled with {} messages queued",
                self.len()
            )),
            TrySendError::Disconnected(_) => {
                BridgeError::Disconnected("console link has stopped".to_string())
            }
        })
    }
}

impl OutboundSink for Vec<Outbound> {
    fn deliver(&mut self, message: Outbound) -> Result<()> {
        self.push(message);
        Ok(())
    }
}

/// Renders changed keys into console messages and hands them to the sink.
///
/// Delivery is fire-and-forget. The first failed delivery marks the bridge
/// disconnected, after which every publish fails fast.
pub struct Publisher<S> {
    sink: S,
    lifecycle: Lifecycle,
}

impl<S: OutboundSink> Publisher<S> {
    pub fn new(sink: S, lifecycle: Lifecycle) -> Self {
        Self { sink, lifecycle }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// One message per key, in the order given
    pub fn publish_changes(&mut self, keys: &[FieldKey], snapshot: &Snapshot) -> Result<usize> {
        for key in keys {
            self.send(render(*key, snapshot))?;
        }
        Ok(keys.len())
    }

    /// Full dump for a console that just (re)loaded, independent of the diff cache
    pub fn publish_all(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.send(Outbound::UpdateProgressStates {
            states: progress_states(snapshot),
        })?;
        for key in [
            FieldKey::Processing,
            FieldKey::Percent,
            FieldKey::Time,
            FieldKey::Banner,
        ] {
            self.send(render(key, snapshot))?;
        }
        for tip in TipIndex::all() {
            for key in [
                FieldKey::TipActive(tip),
                FieldKey::TipProgress(tip),
                FieldKey::TipJoules(tip),
                FieldKey::TipDistance(tip),
            ] {
                self.send(render(key, snapshot))?;
            }
        }
        Ok(())
    }

    pub fn publish_work_position(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.send(render(FieldKey::WorkPosition, snapshot))
    }

    pub fn publish_heating(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.send(render(FieldKey::Heating, snapshot))
    }

    fn send(&mut self, message: Outbound) -> Result<()> {
        if self.lifecycle.is_disconnected() {
            return Err(BridgeError::Disconnected(
                "publishing stopped after a failed send".to_string(),
            ));
        }
        self.sink.deliver(message).inspect_err(|_| {
            self.lifecycle.mark_disconnected();
        })
    }
}

/// The console message for one key
pub fn render(key: FieldKey, snapshot: &Snapshot) -> Outbound {
    match key {
        FieldKey::TipActive(tip) => Outbound::UpdateTipState {
            tip_number: tip.number(),
            is_active: snapshot.tip(tip).active,
        },
        FieldKey::TipProgress(tip) => {
            let reading = snapshot.tip(tip);
            let state = if tip.has_front_panel() && reading.active {
                "active"
            } else {
                "in-active"
            };
            Outbound::UpdateProgressBar {
                element_id: format!("tip-{tip}-progress-{state}"),
                progress: reading.progress,
            }
        }
        FieldKey::TipJoules(tip) => Outbound::text(
            format!("tip-{tip}-joules-{}", panel_suffix(tip)),
            format!("{:.1} J", snapshot.tip(tip).joules),
        ),
        FieldKey::TipDistance(tip) => Outbound::text(
            format!("tip-{tip}-distance-{}", panel_suffix(tip)),
            format!("{:.1} mm", snapshot.tip(tip).distance),
        ),
        FieldKey::TipsData => Outbound::ModbusUpdate {
            payload: tips_payload(snapshot),
        },
        FieldKey::ProgressStates => Outbound::UpdateProgressStates {
            states: progress_states(snapshot),
        },
        FieldKey::Time => Outbound::text(ELEMENT_TIME, snapshot.ui.time_text()),
        FieldKey::Slider => Outbound::UpdateSlider {
            position: snapshot.ui.slider,
        },
        FieldKey::Percent => Outbound::text(ELEMENT_PERCENT, snapshot.ui.percent_text()),
        FieldKey::Banner => Outbound::text(ELEMENT_BANNER, snapshot.banner.clone()),
        FieldKey::Processing => Outbound::text(ELEMENT_PROCESSING, snapshot.processing.clone()),
        FieldKey::WorkPosition => Outbound::WorkPositionUpdate {
            data: work_position_payload(snapshot),
        },
        FieldKey::Heating => Outbound::HeatingUpdate {
            payload: heating_payload(snapshot),
        },
        FieldKey::Monitor => Outbound::MonitorUpdate {
            payload: monitor_payload(snapshot),
        },
        FieldKey::Configuration => Outbound::ConfigurationUpdate {
            payload: configuration_payload(snapshot),
        },
        FieldKey::ManualControls => Outbound::ManualControlsUpdate {
            payload: manual_controls_payload(snapshot),
        },
    }
}

/// Joules and distance labels of the front-panel tips are always the `-active` variant
fn panel_suffix(tip: TipIndex) -> &'static str {
    if tip.has_front_panel() {
        "active"
    } else {
        "in-active"
    }
}

fn per_tip<T>(value: impl Fn(TipIndex) -> T) -> PerTip<T> {
    TipIndex::all()
        .map(|tip| (tip.to_string(), value(tip)))
        .collect()
}

pub fn progress_states(snapshot: &Snapshot) -> BTreeMap<String, ProgressState> {
    PROGRESS_STATE_NAMES
        .iter()
        .zip(snapshot.progress)
        .map(|(name, state)| (name.to_string(), state))
        .collect()
}

pub fn tips_payload(snapshot: &Snapshot) -> TipsPayload {
    TipsPayload {
        tips: per_tip(|tip| {
            let reading = snapshot.tip(tip);
            TipPayload {
                active: reading.active,
                progress: reading.progress,
                joules: reading.joules,
                distance: reading.distance,
            }
        }),
    }
}

pub fn work_position_payload(snapshot: &Snapshot) -> WorkPositionPayload {
    let position = &snapshot.work_position;
    WorkPositionPayload {
        current_position: position.current,
        setpoint: position.setpoint,
        speed_mode: position.speed_mode,
        up_button: position.up,
        down_button: position.down,
        tip_distances: per_tip(|tip| snapshot.tip_distances[tip.slot()]),
        tip_states: per_tip(|tip| snapshot.tip(tip).active),
    }
}

pub fn heating_payload(snapshot: &Snapshot) -> PerTip<HeatingTipPayload> {
    per_tip(|tip| {
        let setpoint = &snapshot.heating[tip.slot()];
        HeatingTipPayload {
            active: snapshot.tip(tip).active,
            energy: setpoint.energy,
            distance: setpoint.distance,
            heat_start_delay: setpoint.heat_start_delay,
        }
    })
}

pub fn monitor_payload(snapshot: &Snapshot) -> MonitorPayload {
    let monitor = &snapshot.monitor;
    MonitorPayload {
        pressure_psi: monitor.pressure_psi,
        left_start: monitor.left_start,
        right_start: monitor.right_start,
        estop_active: monitor.estop_active,
        home_switch: monitor.home_switch,
        pressure_ok: monitor.pressure_ok,
    }
}

pub fn configuration_payload(snapshot: &Snapshot) -> ConfigurationPayload {
    let configuration = &snapshot.configuration;
    ConfigurationPayload {
        weld_time: configuration.get(ConfigKey::WeldTime),
        pulse_energy: configuration.get(ConfigKey::PulseEnergy),
        cool_time: configuration.get(ConfigKey::CoolTime),
        presence_height: configuration.get(ConfigKey::PresenceHeight),
        boss_tolerance_minus: configuration.get(ConfigKey::BossToleranceMinus),
        boss_tolerance_plus: configuration.get(ConfigKey::BossTolerancePlus),
    }
}

pub fn manual_controls_payload(snapshot: &Snapshot) -> ManualControlsPayload {
    let manual = &snapshot.manual;
    ManualControlsPayload {
        heating_buttons: per_tip(|tip| manual.heating_buttons[tip.slot()]),
        cooling: manual.cooling,
        platen_mm: manual.platen_mm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingSink;

    impl OutboundSink for FailingSink {
        fn deliver(&mut self, _message: Outbound) -> Result<()> {
            Err(BridgeError::Disconnected("socket closed".to_string()))
        }
    }

    fn kinds_and_ids(messages: &[Outbound]) -> Vec<String> {
        messages
            .iter()
            .map(|message| match message {
                Outbound::UpdateElement { element_id, .. }
                | Outbound::UpdateProgressBar { element_id, .. } => element_id.clone(),
                Outbound::UpdateTipState { tip_number, .. } => format!("tip-state-{tip_number}"),
                other => other.kind().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_full_dump_order() {
        let mut publisher = Publisher::new(Vec::new(), Lifecycle::new());
        publisher.publish_all(&Snapshot::default()).unwrap();
        let sent = kinds_and_ids(publisher.sink());

        assert_eq!(sent.len(), 5 + 4 * 8);
        assert_eq!(
            &sent[..9],
            &[
                "update_progress_states",
                ELEMENT_PROCESSING,
                ELEMENT_PERCENT,
                ELEMENT_TIME,
                ELEMENT_BANNER,
                "tip-state-1",
                "tip-1-progress-in-active",
                "tip-1-joules-active",
                "tip-1-distance-active",
            ]
        );
        assert_eq!(
            &sent[sent.len() - 4..],
            &[
                "tip-state-8",
                "tip-8-progress-in-active",
                "tip-8-joules-in-active",
                "tip-8-distance-in-active",
            ]
        );
    }

    #[test]
    fn test_element_ids_follow_tip_panel() {
        let mut snapshot = Snapshot::default();
        snapshot.tips[0].active = true;
        snapshot.tips[0].joules = 12.345;
        snapshot.tips[5].active = true;
        snapshot.tips[5].distance = 1.26;

        let tip1 = TipIndex::new(1).unwrap();
        let tip6 = TipIndex::new(6).unwrap();
        assert_eq!(
            serde_json::to_value(render(FieldKey::TipProgress(tip1), &snapshot)).unwrap()
                ["element_id"],
            "tip-1-progress-active"
        );
        assert_eq!(
            serde_json::to_value(render(FieldKey::TipProgress(tip6), &snapshot)).unwrap()
                ["element_id"],
            "tip-6-progress-in-active"
        );
        assert_eq!(
            render(FieldKey::TipJoules(tip1), &snapshot),
            Outbound::text("tip-1-joules-active", "12.3 J")
        );
        assert_eq!(
            render(FieldKey::TipDistance(tip6), &snapshot),
            Outbound::text("tip-6-distance-in-active", "1.3 mm")
        );
    }

    #[test]
    fn test_payload_shapes() {
        let mut snapshot = Snapshot::default();
        snapshot.progress[0] = ProgressState::Done;
        snapshot.tip_distances[2] = 4.5;
        snapshot.manual.cooling = true;

        let states = serde_json::to_value(render(FieldKey::ProgressStates, &snapshot)).unwrap();
        assert_eq!(states["states"]["home"], 2);
        assert_eq!(states["states"]["cycle_complete"], 0);

        let position = serde_json::to_value(render(FieldKey::WorkPosition, &snapshot)).unwrap();
        assert_eq!(position["type"], "work_position_update");
        assert_eq!(position["data"]["speed_mode"], "rapid");
        assert_eq!(position["data"]["tip_distances"]["3"], 4.5);
        assert_eq!(position["data"]["tip_states"]["8"], false);

        let manual = serde_json::to_value(render(FieldKey::ManualControls, &snapshot)).unwrap();
        assert_eq!(manual["payload"]["cooling"], true);
        assert_eq!(manual["payload"]["heating_buttons"]["1"], false);

        let tips = serde_json::to_value(render(FieldKey::TipsData, &snapshot)).unwrap();
        assert_eq!(tips["type"], "modbus_update");
        assert_eq!(
            tips["payload"]["tips"]["4"],
            json!({"active": false, "progress": 0, "joules": 0.0, "distance": 0.0})
        );
    }

    #[test]
    fn test_failed_send_disconnects_and_stops_publishing() {
        let lifecycle = Lifecycle::new();
        let mut publisher = Publisher::new(FailingSink, lifecycle.clone());
        assert!(publisher.publish_heating(&Snapshot::default()).is_err());
        assert!(lifecycle.is_disconnected());

        let mut other = Publisher::new(Vec::new(), lifecycle);
        assert!(other.publish_all(&Snapshot::default()).is_err());
        assert!(other.sink().is_empty());
    }

    #[test]
    fn test_full_outbound_queue_disconnects() {
        let (tx, rx) = flume::bounded(4);
        let lifecycle = Lifecycle::new();
        let mut publisher = Publisher::new(tx, lifecycle.clone());

        // a full dump is far more than four messages
        let err = publisher.publish_all(&Snapshot::default()).unwrap_err();
        assert!(matches!(err, BridgeError::Disconnected(_)));
        assert!(lifecycle.is_disconnected());
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_closed_outbound_queue_disconnects() {
        let (tx, rx) = flume::bounded::<Outbound>(4);
        drop(rx);
        let lifecycle = Lifecycle::new();
        let mut publisher = Publisher::new(tx, lifecycle.clone());
        assert!(publisher.publish_heating(&Snapshot::default()).is_err());
        assert!(lifecycle.is_disconnected());
    }
}
