//! Static holding-register layout of the heat-staking controller.
//!
//! Every field is addressed by a dotted name (`tip3.joules`,
//! `heating.energy.5`, `work_position.speed_mode`, ...). The same table lists
//! the contiguous blocks the poller reads each cycle.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::{
    core::tip::{TipIndex, TIP_COUNT},
    error::{BridgeError, Result},
    protocol::codec::{decode_scaled, decode_text, encode_scaled},
};

/// Length in bytes of the banner and processing text fields
pub const TEXT_MAX_LEN: usize = 40;

pub const TIP_STRIDE: u16 = 100;
pub const PROGRESS_STATES_BASE: u16 = 1000;
pub const GENERAL_UI_BASE: u16 = 1100;
pub const MONITOR_BASE: u16 = 1110;
pub const BANNER_TEXT_BASE: u16 = 1200;
pub const PROCESSING_TEXT_BASE: u16 = 1220;
pub const WORK_POSITION_BASE: u16 = 1300;
pub const WORK_POSITION_TIPS_BASE: u16 = 1400;
pub const HEATING_ENERGY_BASE: u16 = 1500;
pub const HEATING_DISTANCE_BASE: u16 = 1600;
pub const HEATING_DELAY_BASE: u16 = 1700;
pub const CONFIGURATION_BASE: u16 = 1800;
pub const MANUAL_CONTROLS_BASE: u16 = 1900;

/// Progress state names in register order
pub const PROGRESS_STATE_NAMES: [&str; 6] = [
    "home",
    "work_position",
    "encoder_zero",
    "heat",
    "cool",
    "cycle_complete",
];

/// Configuration counter names in register order
pub const CONFIGURATION_KEYS: [&str; 6] = [
    "weld_time",
    "pulse_energy",
    "cool_time",
    "presence_height",
    "boss_tolerance_minus",
    "boss_tolerance_plus",
];

const CONFIGURATION_SCALES: [u32; 6] = [100, 10, 100, 1000, 1000, 1000];

const MONITOR_NAMES: [&str; 6] = [
    "pressure_psi",
    "left_start",
    "right_start",
    "estop_active",
    "home_switch",
    "pressure_ok",
];

const SYSTEM_NAMES: [&str; 6] = [
    "baud_rate",
    "parity",
    "stop_bits",
    "byte_size",
    "slave_id",
    "update_rate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One register, optionally divided by the scale
    Uint16,
    /// Two registers, high word first, two's-complement
    ScaledInt32,
    /// Two ASCII bytes per register
    AsciiPacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub address: u16,
    pub count: u16,
    pub scale: u32,
    pub encoding: Encoding,
}

impl FieldSpec {
    const fn uint16(address: u16) -> Self {
        Self::uint16_scaled(address, 1)
    }

    const fn uint16_scaled(address: u16, scale: u32) -> Self {
        Self {
            address,
            count: 1,
            scale,
            encoding: Encoding::Uint16,
        }
    }

    const fn scaled(address: u16, scale: u32) -> Self {
        Self {
            address,
            count: 2,
            scale,
            encoding: Encoding::ScaledInt32,
        }
    }

    const fn text(address: u16) -> Self {
        Self {
            address,
            count: (TEXT_MAX_LEN / 2) as u16,
            scale: 1,
            encoding: Encoding::AsciiPacked,
        }
    }

    /// Encode an engineering value into the registers of this field.
    pub fn encode_number(&self, value: f64) -> Result<Vec<u16>> {
        match self.encoding {
            Encoding::Uint16 => {
                let raw = (value * f64::from(self.scale)).round();
                let raw = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 65535.0) };
                Ok(vec![raw as u16])
            }
            Encoding::ScaledInt32 => Ok(encode_scaled(value, self.scale).to_vec()),
            Encoding::AsciiPacked => Err(BridgeError::Decode(format!(
                "text field at {} cannot hold a number",
                self.address
            ))),
        }
    }
}

/// What a read block carries, so decoding can `match` instead of comparing names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    SystemConfig,
    Tip(TipIndex),
    ProgressStates,
    GeneralUi,
    Monitor,
    BannerText,
    ProcessingText,
    WorkPosition,
    WorkPositionTips,
    HeatingEnergy,
    HeatingDistance,
    HeatingDelay,
    Configuration,
    ManualControls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlock {
    pub kind: BlockKind,
    pub name: String,
    pub start: u16,
    pub count: u16,
}

#[derive(Debug)]
pub struct RegisterMap {
    fields: HashMap<String, FieldSpec>,
    blocks: Vec<ReadBlock>,
}

static REGISTER_MAP: Lazy<RegisterMap> = Lazy::new(RegisterMap::build);

impl RegisterMap {
    /// The controller's register table
    pub fn global() -> &'static RegisterMap {
        &REGISTER_MAP
    }

    pub fn field(&self, name: &str) -> Result<FieldSpec> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::UnknownField(name.to_string()))
    }

    /// `(address, register count)` of a named field
    pub fn address_of(&self, name: &str) -> Result<(u16, u16)> {
        self.field(name).map(|spec| (spec.address, spec.count))
    }

    /// Blocks read by the poller, in bus order
    pub fn blocks(&self) -> &[ReadBlock] {
        &self.blocks
    }

    fn build() -> Self {
        let mut fields = HashMap::new();
        let mut blocks = Vec::new();
        let mut block = |kind, name: String, start, count| {
            blocks.push(ReadBlock {
                kind,
                name,
                start,
                count,
            })
        };

        for (offset, name) in SYSTEM_NAMES.iter().enumerate() {
            fields.insert(format!("system.{name}"), FieldSpec::uint16(offset as u16));
        }
        block(BlockKind::SystemConfig, "system_config".into(), 0, 6);

        for tip in TipIndex::all() {
            let base = u16::from(tip.number()) * TIP_STRIDE;
            fields.insert(format!("tip{tip}.active"), FieldSpec::uint16(base));
            fields.insert(format!("tip{tip}.progress"), FieldSpec::uint16(base + 1));
            fields.insert(
                format!("tip{tip}.joules"),
                FieldSpec::uint16_scaled(base + 2, 10),
            );
            fields.insert(format!("tip{tip}.distance"), FieldSpec::scaled(base + 3, 1000));
            block(BlockKind::Tip(tip), format!("tip{tip}"), base, 5);
        }

        for (offset, name) in PROGRESS_STATE_NAMES.iter().enumerate() {
            fields.insert(
                format!("progress.{name}"),
                FieldSpec::uint16(PROGRESS_STATES_BASE + offset as u16),
            );
        }
        block(
            BlockKind::ProgressStates,
            "progress_states".into(),
            PROGRESS_STATES_BASE,
            6,
        );

        fields.insert("ui.time_minutes".into(), FieldSpec::uint16(GENERAL_UI_BASE));
        fields.insert("ui.time_seconds".into(), FieldSpec::uint16(GENERAL_UI_BASE + 1));
        fields.insert("ui.slider".into(), FieldSpec::uint16(GENERAL_UI_BASE + 2));
        block(BlockKind::GeneralUi, "general_ui".into(), GENERAL_UI_BASE, 3);

        for (offset, name) in MONITOR_NAMES.iter().enumerate() {
            fields.insert(
                format!("monitor.{name}"),
                FieldSpec::uint16(MONITOR_BASE + offset as u16),
            );
        }
        block(BlockKind::Monitor, "monitor".into(), MONITOR_BASE, 6);

        fields.insert("text.banner".into(), FieldSpec::text(BANNER_TEXT_BASE));
        fields.insert("text.processing".into(), FieldSpec::text(PROCESSING_TEXT_BASE));
        block(BlockKind::BannerText, "banner_text".into(), BANNER_TEXT_BASE, 20);
        block(
            BlockKind::ProcessingText,
            "processing_text".into(),
            PROCESSING_TEXT_BASE,
            20,
        );

        fields.insert(
            "work_position.current".into(),
            FieldSpec::scaled(WORK_POSITION_BASE, 100),
        );
        fields.insert(
            "work_position.setpoint".into(),
            FieldSpec::scaled(WORK_POSITION_BASE + 2, 100),
        );
        fields.insert(
            "work_position.speed_mode".into(),
            FieldSpec::uint16(WORK_POSITION_BASE + 4),
        );
        fields.insert("work_position.up".into(), FieldSpec::uint16(WORK_POSITION_BASE + 5));
        fields.insert(
            "work_position.down".into(),
            FieldSpec::uint16(WORK_POSITION_BASE + 6),
        );
        fields.insert(
            "work_position.set_cmd".into(),
            FieldSpec::uint16(WORK_POSITION_BASE + 7),
        );
        block(
            BlockKind::WorkPosition,
            "work_position".into(),
            WORK_POSITION_BASE,
            8,
        );

        for tip in TipIndex::all() {
            let pair = 2 * tip.slot() as u16;
            fields.insert(
                format!("work_position.tip_distance.{tip}"),
                FieldSpec::scaled(WORK_POSITION_TIPS_BASE + pair, 100),
            );
            fields.insert(
                format!("heating.energy.{tip}"),
                FieldSpec::scaled(HEATING_ENERGY_BASE + pair, 10),
            );
            fields.insert(
                format!("heating.distance.{tip}"),
                FieldSpec::scaled(HEATING_DISTANCE_BASE + pair, 1000),
            );
            fields.insert(
                format!("heating.heat_start_delay.{tip}"),
                FieldSpec::scaled(HEATING_DELAY_BASE + pair, 1000),
            );
            fields.insert(
                format!("manual.heating_button.{tip}"),
                FieldSpec::uint16(MANUAL_CONTROLS_BASE + tip.slot() as u16),
            );
        }
        let per_tip_pairs = (2 * TIP_COUNT) as u16;
        block(
            BlockKind::WorkPositionTips,
            "work_position_tips".into(),
            WORK_POSITION_TIPS_BASE,
            per_tip_pairs,
        );
        block(
            BlockKind::HeatingEnergy,
            "heating_energy".into(),
            HEATING_ENERGY_BASE,
            per_tip_pairs,
        );
        block(
            BlockKind::HeatingDistance,
            "heating_distance".into(),
            HEATING_DISTANCE_BASE,
            per_tip_pairs,
        );
        block(
            BlockKind::HeatingDelay,
            "heating_delay".into(),
            HEATING_DELAY_BASE,
            per_tip_pairs,
        );

        for (index, (name, scale)) in CONFIGURATION_KEYS
            .iter()
            .zip(CONFIGURATION_SCALES)
            .enumerate()
        {
            fields.insert(
                format!("configuration.{name}"),
                FieldSpec::scaled(CONFIGURATION_BASE + 2 * index as u16, scale),
            );
        }
        block(
            BlockKind::Configuration,
            "configuration".into(),
            CONFIGURATION_BASE,
            12,
        );

        fields.insert(
            "manual.cooling".into(),
            FieldSpec::uint16(MANUAL_CONTROLS_BASE + TIP_COUNT as u16),
        );
        block(
            BlockKind::ManualControls,
            "manual_controls".into(),
            MANUAL_CONTROLS_BASE,
            9,
        );

        Self { fields, blocks }
    }
}

/// Registers returned for one [`ReadBlock`], decoded field by field.
#[derive(Debug, Clone, Copy)]
pub struct BlockData<'a> {
    start: u16,
    registers: &'a [u16],
}

impl<'a> BlockData<'a> {
    pub fn new(start: u16, registers: &'a [u16]) -> Self {
        Self { start, registers }
    }

    fn slice(&self, spec: &FieldSpec) -> Result<&'a [u16]> {
        let offset = usize::from(spec.address.checked_sub(self.start).ok_or_else(|| {
            BridgeError::Decode(format!(
                "field at {} precedes block start {}",
                spec.address, self.start
            ))
        })?);
        let end = offset + usize::from(spec.count);
        self.registers.get(offset..end).ok_or_else(|| {
            BridgeError::Decode(format!(
                "field at {} (+{}) outside {} register block at {}",
                spec.address,
                spec.count,
                self.registers.len(),
                self.start
            ))
        })
    }

    /// Raw value of a single-register field
    pub fn raw(&self, spec: &FieldSpec) -> Result<u16> {
        Ok(self.slice(spec)?[0])
    }

    pub fn flag(&self, spec: &FieldSpec) -> Result<bool> {
        Ok(self.raw(spec)? != 0)
    }

    /// Numeric value with the field's scale applied
    pub fn number(&self, spec: &FieldSpec) -> Result<f64> {
        let registers = self.slice(spec)?;
        match spec.encoding {
            Encoding::Uint16 => Ok(f64::from(registers[0]) / f64::from(spec.scale.max(1))),
            Encoding::ScaledInt32 => decode_scaled(registers, spec.scale),
            Encoding::AsciiPacked => Err(BridgeError::Decode(format!(
                "text field at {} read as a number",
                spec.address
            ))),
        }
    }

    pub fn text(&self, spec: &FieldSpec) -> Result<String> {
        decode_text(self.slice(spec)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_of_known_fields() {
        let map = RegisterMap::global();
        assert_eq!(map.address_of("tip3.active").unwrap(), (300, 1));
        assert_eq!(map.address_of("tip8.distance").unwrap(), (803, 2));
        assert_eq!(map.address_of("work_position.speed_mode").unwrap(), (1304, 1));
        assert_eq!(map.address_of("heating.energy.5").unwrap(), (1508, 2));
        assert_eq!(map.address_of("configuration.boss_tolerance_plus").unwrap(), (1810, 2));
        assert_eq!(map.address_of("manual.cooling").unwrap(), (1908, 1));
        assert_eq!(map.address_of("text.processing").unwrap(), (1220, 20));
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            RegisterMap::global().address_of("tip9.active"),
            Err(BridgeError::UnknownField(name)) if name == "tip9.active"
        ));
    }

    #[test]
    fn test_blocks_are_disjoint_and_cover_fields() {
        let map = RegisterMap::global();
        let blocks = map.blocks();
        assert_eq!(blocks.len(), 21);
        assert_eq!(blocks[0].name, "system_config");
        assert_eq!(blocks.last().unwrap().name, "manual_controls");

        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                let overlap = a.start < b.start + b.count && b.start < a.start + a.count;
                assert!(!overlap, "{} overlaps {}", a.name, b.name);
            }
        }

        for (name, spec) in &map.fields {
            let covered = blocks.iter().any(|b| {
                spec.address >= b.start && spec.address + spec.count <= b.start + b.count
            });
            assert!(covered, "{name} is not read by any block");
        }
    }

    #[test]
    fn test_block_data_decodes_relative_to_start() {
        let map = RegisterMap::global();
        // tip 2 block: active, progress 55, joules 12.3, distance 1.5 mm
        let registers = [1, 55, 123, 0, 1500];
        let data = BlockData::new(200, &registers);
        assert!(data.flag(&map.field("tip2.active").unwrap()).unwrap());
        assert_eq!(data.raw(&map.field("tip2.progress").unwrap()).unwrap(), 55);
        assert_eq!(data.number(&map.field("tip2.joules").unwrap()).unwrap(), 12.3);
        assert_eq!(data.number(&map.field("tip2.distance").unwrap()).unwrap(), 1.5);
        assert!(data.raw(&map.field("tip3.active").unwrap()).is_err());
    }

    #[test]
    fn test_encode_number_by_encoding() {
        let map = RegisterMap::global();
        let joules = map.field("tip1.joules").unwrap();
        assert_eq!(joules.encode_number(12.34).unwrap(), vec![123]);
        let energy = map.field("heating.energy.1").unwrap();
        assert_eq!(energy.encode_number(42.5).unwrap(), vec![0, 425]);
        assert!(map.field("text.banner").unwrap().encode_number(1.0).is_err());
    }
}
