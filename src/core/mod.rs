//! Domain types shared by the protocol and bridge layers: validated tip
//! numbers, register-level enums, the persisted tip-state file and the
//! shutdown flag.
pub mod model;
pub mod persistence;
pub mod shutdown;
pub mod tip;

pub use model::{ConfigKey, HeatingParam, JogButton, ProgressState, SpeedMode};
pub use shutdown::Shutdown;
pub use tip::{TipIndex, TIP_COUNT};
