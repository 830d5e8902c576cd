//! Change detection between consecutive snapshots.
//!
//! The cache maps each [`FieldKey`] to the JSON value last reported for it.
//! Bundles are compared as a whole, so one changed member republishes the
//! entire bundle once.

use serde_json::{json, Value};
use std::collections::HashMap;

use super::{publisher, snapshot::Snapshot};
use crate::core::TipIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    TipActive(TipIndex),
    TipProgress(TipIndex),
    TipJoules(TipIndex),
    TipDistance(TipIndex),
    /// All tip readings as one `modbus_update`
    TipsData,
    ProgressStates,
    Time,
    Slider,
    Percent,
    Banner,
    Processing,
    WorkPosition,
    Heating,
    Monitor,
    Configuration,
    ManualControls,
}

impl FieldKey {
    /// Every key in emission order
    pub fn ordered() -> Vec<FieldKey> {
        let mut keys = Vec::with_capacity(4 * 8 + 12);
        for tip in TipIndex::all() {
            keys.extend([
                FieldKey::TipActive(tip),
                FieldKey::TipProgress(tip),
                FieldKey::TipJoules(tip),
                FieldKey::TipDistance(tip),
            ]);
        }
        keys.extend([
            FieldKey::TipsData,
            FieldKey::ProgressStates,
            FieldKey::Time,
            FieldKey::Slider,
            FieldKey::Percent,
            FieldKey::Banner,
            FieldKey::Processing,
            FieldKey::WorkPosition,
            FieldKey::Heating,
            FieldKey::Monitor,
            FieldKey::Configuration,
            FieldKey::ManualControls,
        ]);
        keys
    }

    /// The decoded value compared between cycles
    fn observe(self, snapshot: &Snapshot) -> Value {
        match self {
            FieldKey::TipActive(tip) => json!(snapshot.tip(tip).active),
            FieldKey::TipProgress(tip) => json!(snapshot.tip(tip).progress),
            FieldKey::TipJoules(tip) => json!(snapshot.tip(tip).joules),
            FieldKey::TipDistance(tip) => json!(snapshot.tip(tip).distance),
            FieldKey::TipsData => json!(publisher::tips_payload(snapshot)),
            FieldKey::ProgressStates => json!(publisher::progress_states(snapshot)),
            FieldKey::Time => json!(snapshot.ui.time_text()),
            FieldKey::Slider | FieldKey::Percent => json!(snapshot.ui.slider),
            FieldKey::Banner => json!(snapshot.banner),
            FieldKey::Processing => json!(snapshot.processing),
            FieldKey::WorkPosition => json!(publisher::work_position_payload(snapshot)),
            FieldKey::Heating => json!(publisher::heating_payload(snapshot)),
            FieldKey::Monitor => json!(publisher::monitor_payload(snapshot)),
            FieldKey::Configuration => json!(publisher::configuration_payload(snapshot)),
            FieldKey::ManualControls => json!(publisher::manual_controls_payload(snapshot)),
        }
    }
}

/// Per-key cache of published values, owned by the poll loop.
#[derive(Debug)]
pub struct Differ {
    cache: HashMap<FieldKey, Value>,
    keys: Vec<FieldKey>,
    manual_interval: u64,
    cycle: u64,
}

impl Differ {
    /// `manual_interval`: the manual-controls bundle is also republished on
    /// every cycle divisible by it (0 disables the periodic refresh)
    pub fn new(manual_interval: u64) -> Self {
        Self {
            cache: HashMap::new(),
            keys: FieldKey::ordered(),
            manual_interval,
            cycle: 0,
        }
    }

    /// Keys whose value differs from the last call, in emission order.
    ///
    /// A key seen for the first time always counts as changed.
    pub fn diff(&mut self, snapshot: &Snapshot) -> Vec<FieldKey> {
        self.cycle += 1;
        let manual_due = self.manual_interval > 0 && self.cycle % self.manual_interval == 0;

        let mut changed = Vec::new();
        for key in &self.keys {
            let value = key.observe(snapshot);
            let differs = self.cache.get(key) != Some(&value);
            if differs {
                self.cache.insert(*key, value);
            }
            if differs || (manual_due && *key == FieldKey::ManualControls) {
                changed.push(*key);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProgressState;

    fn tip(n: u8) -> TipIndex {
        TipIndex::new(n).unwrap()
    }

    #[test]
    fn test_identical_snapshots_produce_no_changes() {
        let mut differ = Differ::new(0);
        let snapshot = Snapshot::default();
        assert_eq!(differ.diff(&snapshot).len(), FieldKey::ordered().len());
        assert!(differ.diff(&snapshot).is_empty());
        assert!(differ.diff(&snapshot.clone()).is_empty());
    }

    #[test]
    fn test_publish_count_is_changes_plus_one() {
        let mut differ = Differ::new(0);
        let mut snapshot = Snapshot::default();
        let mut published = 0;
        // progress goes 0, 0, 10, 10, 20, 20, 30 => three differing cycles
        for value in [0, 0, 10, 10, 20, 20, 30] {
            snapshot.tips[0].progress = value;
            published += differ
                .diff(&snapshot)
                .iter()
                .filter(|key| **key == FieldKey::TipProgress(tip(1)))
                .count();
        }
        assert_eq!(published, 3 + 1);
    }

    #[test]
    fn test_one_progress_state_change_republishes_bundle_once() {
        let mut differ = Differ::new(0);
        let mut snapshot = Snapshot::default();
        differ.diff(&snapshot);

        snapshot.progress[3] = ProgressState::Active;
        let changed = differ.diff(&snapshot);
        assert_eq!(changed, vec![FieldKey::ProgressStates]);
    }

    #[test]
    fn test_tip_change_also_marks_tips_bundle_and_work_position() {
        let mut differ = Differ::new(0);
        let mut snapshot = Snapshot::default();
        differ.diff(&snapshot);

        snapshot.tips[1].active = true;
        let changed = differ.diff(&snapshot);
        assert_eq!(
            changed,
            vec![
                FieldKey::TipActive(tip(2)),
                FieldKey::TipsData,
                FieldKey::WorkPosition,
                FieldKey::Heating,
            ]
        );
    }

    #[test]
    fn test_manual_controls_refresh_every_nth_cycle() {
        let mut differ = Differ::new(5);
        let snapshot = Snapshot::default();
        let mut manual_cycles = Vec::new();
        for cycle in 1..=12 {
            if differ.diff(&snapshot).contains(&FieldKey::ManualControls) {
                manual_cycles.push(cycle);
            }
        }
        assert_eq!(manual_cycles, vec![1, 5, 10]);
    }

    #[test]
    fn test_slider_change_emits_slider_and_percent() {
        let mut differ = Differ::new(0);
        let mut snapshot = Snapshot::default();
        differ.diff(&snapshot);
        snapshot.ui.slider = 40;
        assert_eq!(
            differ.diff(&snapshot),
            vec![FieldKey::Slider, FieldKey::Percent]
        );
    }
}
