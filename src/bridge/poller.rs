use std::sync::Arc;

use super::{
    snapshot::{HeatingSetpoint, Monitor, Snapshot, SystemConfig, TipReading, WorkPosition},
    state::{IntentTracker, ReadToken},
};
use crate::{
    core::{ConfigKey, HeatingParam, ProgressState, SpeedMode, TipIndex, TIP_COUNT},
    error::Result,
    protocol::{
        modbus::ModbusTransport,
        register_map::{BlockData, BlockKind, ReadBlock, RegisterMap, PROGRESS_STATE_NAMES},
    },
};

/// Result of one poll cycle
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub snapshot: Snapshot,
    /// Names of blocks whose previous values were carried over
    pub failed_blocks: Vec<String>,
    /// Taken just before the work-position read; `None` if that read failed
    pub work_position_token: Option<ReadToken>,
}

impl PollOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.failed_blocks.is_empty()
    }
}

/// Reads every block of the register map in order and assembles a snapshot.
pub struct Poller<T> {
    transport: T,
    slave_id: u8,
    map: &'static RegisterMap,
    intent: Option<Arc<IntentTracker>>,
}

impl<T: ModbusTransport> Poller<T> {
    pub fn new(transport: T, slave_id: u8) -> Self {
        Self {
            transport,
            slave_id,
            map: RegisterMap::global(),
            intent: None,
        }
    }

    /// Take a [`ReadToken`] before each work-position read
    pub fn with_intent(mut self, intent: Arc<IntentTracker>) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Run one cycle. A block that fails to read or decode keeps its values
    /// from `previous`; the other blocks are still refreshed.
    pub fn poll(&mut self, previous: &Snapshot) -> PollOutcome {
        let mut snapshot = previous.clone();
        let mut failed_blocks = Vec::new();
        let mut work_position_token = None;
        let map = self.map;

        for block in map.blocks() {
            let token = match (&self.intent, block.kind) {
                (Some(intent), BlockKind::WorkPosition) => Some(intent.read_token()),
                _ => None,
            };

            let result = self
                .transport
                .read_holding_registers(block.start, block.count, self.slave_id)
                .and_then(|registers| {
                    let data = BlockData::new(block.start, &registers);
                    apply_block(&mut snapshot, block, data, map)
                });

            match result {
                Ok(()) => {
                    if token.is_some() {
                        work_position_token = token;
                    }
                }
                Err(err) => {
                    log::warn!(
                        "Block {} ({}+{}) failed: {err}",
                        block.name,
                        block.start,
                        block.count
                    );
                    failed_blocks.push(block.name.clone());
                }
            }
        }

        snapshot.manual.platen_mm = snapshot.work_position.current;

        PollOutcome {
            snapshot,
            failed_blocks,
            work_position_token,
        }
    }
}

/// Decode one block into `snapshot`. Nothing is written unless every field
/// of the block decodes.
fn apply_block(
    snapshot: &mut Snapshot,
    block: &ReadBlock,
    data: BlockData<'_>,
    map: &RegisterMap,
) -> Result<()> {
    let field = |name: &str| map.field(name);

    match block.kind {
        BlockKind::SystemConfig => {
            let system = SystemConfig {
                baud_rate: data.raw(&field("system.baud_rate")?)?,
                parity: data.raw(&field("system.parity")?)?,
                stop_bits: data.raw(&field("system.stop_bits")?)?,
                byte_size: data.raw(&field("system.byte_size")?)?,
                slave_id: data.raw(&field("system.slave_id")?)?,
                update_rate: data.raw(&field("system.update_rate")?)?,
            };
            snapshot.system = system;
        }
        BlockKind::Tip(tip) => {
            let reading = TipReading {
                active: data.flag(&field(&format!("tip{tip}.active"))?)?,
                progress: data.raw(&field(&format!("tip{tip}.progress"))?)?.min(100),
                joules: data.number(&field(&format!("tip{tip}.joules"))?)?,
                distance: data.number(&field(&format!("tip{tip}.distance"))?)?,
            };
            snapshot.tips[tip.slot()] = reading;
        }
        BlockKind::ProgressStates => {
            let mut states = [ProgressState::Inactive; 6];
            for (state, name) in states.iter_mut().zip(PROGRESS_STATE_NAMES) {
                *state = ProgressState::from(data.raw(&field(&format!("progress.{name}"))?)?);
            }
            snapshot.progress = states;
        }
        BlockKind::GeneralUi => {
            let minutes = data.raw(&field("ui.time_minutes")?)?;
            let seconds = data.raw(&field("ui.time_seconds")?)?;
            let slider = data.raw(&field("ui.slider")?)?;
            snapshot.ui.minutes = minutes;
            snapshot.ui.seconds = seconds;
            snapshot.ui.slider = slider.min(100);
        }
        BlockKind::Monitor => {
            let monitor = Monitor {
                pressure_psi: data.raw(&field("monitor.pressure_psi")?)?,
                left_start: data.flag(&field("monitor.left_start")?)?,
                right_start: data.flag(&field("monitor.right_start")?)?,
                estop_active: data.flag(&field("monitor.estop_active")?)?,
                home_switch: data.flag(&field("monitor.home_switch")?)?,
                pressure_ok: data.flag(&field("monitor.pressure_ok")?)?,
            };
            snapshot.monitor = monitor;
        }
        BlockKind::BannerText => {
            let text = data.text(&field("text.banner")?)?;
            if !text.trim().is_empty() {
                snapshot.banner = text;
            }
        }
        BlockKind::ProcessingText => {
            let text = data.text(&field("text.processing")?)?;
            if !text.trim().is_empty() {
                snapshot.processing = text;
            }
        }
        BlockKind::WorkPosition => {
            let position = WorkPosition {
                current: data.number(&field("work_position.current")?)?,
                setpoint: data.number(&field("work_position.setpoint")?)?,
                speed_mode: SpeedMode::from_register(
                    data.raw(&field("work_position.speed_mode")?)?,
                ),
                up: data.flag(&field("work_position.up")?)?,
                down: data.flag(&field("work_position.down")?)?,
            };
            snapshot.work_position = position;
        }
        BlockKind::WorkPositionTips => {
            let mut distances = snapshot.tip_distances;
            for tip in TipIndex::all() {
                distances[tip.slot()] =
                    data.number(&field(&format!("work_position.tip_distance.{tip}"))?)?;
            }
            snapshot.tip_distances = distances;
        }
        BlockKind::HeatingEnergy => {
            apply_heating(snapshot, data, map, HeatingParam::Energy)?;
        }
        BlockKind::HeatingDistance => {
            apply_heating(snapshot, data, map, HeatingParam::Distance)?;
        }
        BlockKind::HeatingDelay => {
            apply_heating(snapshot, data, map, HeatingParam::HeatStartDelay)?;
        }
        BlockKind::Configuration => {
            let mut configuration = snapshot.configuration;
            for key in ConfigKey::ALL {
                configuration.set(
                    key,
                    data.number(&field(&format!("configuration.{}", key.name()))?)?,
                );
            }
            snapshot.configuration = configuration;
        }
        BlockKind::ManualControls => {
            let mut buttons = snapshot.manual.heating_buttons;
            for tip in TipIndex::all() {
                buttons[tip.slot()] =
                    data.flag(&field(&format!("manual.heating_button.{tip}"))?)?;
            }
            let cooling = data.flag(&field("manual.cooling")?)?;
            snapshot.manual.heating_buttons = buttons;
            snapshot.manual.cooling = cooling;
        }
    }
    Ok(())
}

fn apply_heating(
    snapshot: &mut Snapshot,
    data: BlockData<'_>,
    map: &RegisterMap,
    param: HeatingParam,
) -> Result<()> {
    let mut heating: [HeatingSetpoint; TIP_COUNT] = snapshot.heating;
    for tip in TipIndex::all() {
        let value = data.number(&map.field(&format!("heating.{}.{tip}", param.name()))?)?;
        let setpoint = &mut heating[tip.slot()];
        match param {
            HeatingParam::Energy => setpoint.energy = value,
            HeatingParam::Distance => setpoint.distance = value,
            HeatingParam::HeatStartDelay => setpoint.heat_start_delay = value,
        }
    }
    snapshot.heating = heating;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        codec::{encode_scaled, encode_text},
        modbus::MemoryTransport,
    };

    #[test]
    fn test_poll_decodes_all_blocks() {
        let device = MemoryTransport::new();
        device.set(300, &[1, 64, 125]);
        device.set(303, &encode_scaled(2.345, 1000));
        device.set(1000, &[2, 1, 0, 0, 0, 9]);
        device.set(1100, &[3, 7, 55]);
        device.set(1110, &[87, 1, 0, 1, 0, 1]);
        device.set(1200, &encode_text("Load Part", 40));
        device.set(1300, &encode_scaled(12.5, 100));
        device.set(1304, &[1, 1, 0]);
        device.set(1506, &encode_scaled(42.5, 10));
        device.set(1802, &encode_scaled(-0.5, 10));
        device.set(1901, &[1]);
        device.set(1908, &[1]);

        let mut poller = Poller::new(device, 1);
        let outcome = poller.poll(&Snapshot::default());
        assert!(!outcome.is_degraded());

        let snapshot = outcome.snapshot;
        let tip3 = snapshot.tip(TipIndex::new(3).unwrap());
        assert!(tip3.active);
        assert_eq!(tip3.progress, 64);
        assert_eq!(tip3.joules, 12.5);
        assert_eq!(tip3.distance, 2.345);
        assert_eq!(
            snapshot.progress,
            [
                ProgressState::Done,
                ProgressState::Active,
                ProgressState::Inactive,
                ProgressState::Inactive,
                ProgressState::Inactive,
                ProgressState::Inactive,
            ]
        );
        assert_eq!(snapshot.ui.time_text(), "∼3m 07sec");
        assert_eq!(snapshot.ui.slider, 55);
        assert_eq!(snapshot.monitor.pressure_psi, 87);
        assert!(snapshot.monitor.estop_active);
        assert_eq!(snapshot.banner, "Load Part");
        assert_eq!(snapshot.processing, "Processing...");
        assert_eq!(snapshot.work_position.current, 12.5);
        assert_eq!(snapshot.work_position.speed_mode, SpeedMode::Fine);
        assert!(snapshot.work_position.up);
        assert_eq!(snapshot.heating[3].energy, 42.5);
        assert_eq!(snapshot.configuration.get(ConfigKey::PulseEnergy), -0.5);
        assert!(snapshot.manual.heating_buttons[1]);
        assert!(snapshot.manual.cooling);
        assert_eq!(snapshot.manual.platen_mm, 12.5);
    }

    #[test]
    fn test_failed_block_keeps_previous_values() {
        let device = MemoryTransport::new();
        device.set(200, &[1, 30, 50]);
        device.set(1102, &[10]);
        let mut poller = Poller::new(device.clone(), 1);
        let first = poller.poll(&Snapshot::default()).snapshot;
        assert_eq!(first.tips[1].progress, 30);

        device.set(200, &[0, 90, 0]);
        device.set(1102, &[20]);
        device.fail_reads_at(200);
        let outcome = poller.poll(&first);

        assert!(outcome.is_degraded());
        assert_eq!(outcome.failed_blocks, vec!["tip2".to_string()]);
        assert_eq!(outcome.snapshot.tips[1], first.tips[1]);
        assert_eq!(outcome.snapshot.ui.slider, 20);
    }

    #[test]
    fn test_undecodable_block_is_not_half_applied() {
        let device = MemoryTransport::new();
        // second register of the processing block is not ASCII
        device.set(1220, &[0x4F4B, 0xC3A9]);
        let mut poller = Poller::new(device, 1);
        let outcome = poller.poll(&Snapshot::default());
        assert_eq!(outcome.failed_blocks, vec!["processing_text".to_string()]);
        assert_eq!(outcome.snapshot.processing, "Processing...");
    }

    #[test]
    fn test_blank_text_keeps_previous() {
        let device = MemoryTransport::new();
        device.set(1200, &encode_text("Cycle Done", 40));
        let mut poller = Poller::new(device.clone(), 1);
        let first = poller.poll(&Snapshot::default()).snapshot;
        assert_eq!(first.banner, "Cycle Done");

        device.set(1200, &[0; 20]);
        let second = poller.poll(&first).snapshot;
        assert_eq!(second.banner, "Cycle Done");
    }

    #[test]
    fn test_work_position_token_only_on_success() {
        let device = MemoryTransport::new();
        let intent = Arc::new(IntentTracker::new());
        let mut poller = Poller::new(device.clone(), 1).with_intent(intent);
        assert!(poller.poll(&Snapshot::default()).work_position_token.is_some());

        device.fail_reads_at(1300);
        assert!(poller.poll(&Snapshot::default()).work_position_token.is_none());
    }
}
