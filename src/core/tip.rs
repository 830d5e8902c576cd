use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BridgeError;

/// Number of heat-staking tips on the controller
pub const TIP_COUNT: usize = 8;

/// A validated tip number in `1..=8`.
///
/// Per-tip attributes live in fixed `[T; TIP_COUNT]` arrays indexed by
/// [`TipIndex::slot`], so an out-of-range tip can never reach a register
/// address calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TipIndex(u8);

impl TipIndex {
    pub fn new(number: u8) -> Result<Self, BridgeError> {
        if (1..=TIP_COUNT as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(BridgeError::InvalidMessage(format!(
                "tip number {number} outside 1..={TIP_COUNT}"
            )))
        }
    }

    /// Tip number as shown to the operator (1-based)
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based array slot
    pub fn slot(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// All tips in ascending order
    pub fn all() -> impl Iterator<Item = TipIndex> {
        (1..=TIP_COUNT as u8).map(TipIndex)
    }

    /// Tips 1-4 are wired to the front panel; 5-8 are always shown as inactive
    pub fn has_front_panel(self) -> bool {
        self.0 <= 4
    }
}

impl TryFrom<u8> for TipIndex {
    type Error = BridgeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TipIndex> for u8 {
    fn from(tip: TipIndex) -> Self {
        tip.0
    }
}

impl fmt::Display for TipIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
