//! Tip-active flags persisted by the operator console.
//!
//! The file is a JSON object keyed by tip number:
//!
//! ```json
//! { "1": { "active": true }, "2": { "active": false } }
//! ```
//!
//! It is read once at startup. Missing tips, or a missing file, count as
//! inactive.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, io, path::Path};

use crate::{
    core::tip::{TipIndex, TIP_COUNT},
    error::{BridgeError, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTip {
    #[serde(default)]
    pub active: bool,
}

/// Load the persisted flags, indexed by [`TipIndex::slot`].
pub fn load_tip_states(path: &Path) -> Result<[bool; TIP_COUNT]> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("No tip state file at {path:?}, all tips start inactive");
            return Ok([false; TIP_COUNT]);
        }
        Err(err) => return Err(err.into()),
    };
    parse_tip_states(&json)
}

pub fn parse_tip_states(json: &str) -> Result<[bool; TIP_COUNT]> {
    let persisted: HashMap<String, PersistedTip> = serde_json::from_str(json)?;

    let mut flags = [false; TIP_COUNT];
    for (key, tip) in persisted {
        let index = key
            .trim()
            .parse::<u8>()
            .map_err(|_| BridgeError::Config(format!("tip state key {key:?} is not a number")))
            .and_then(TipIndex::new);
        match index {
            Ok(index) => flags[index.slot()] = tip.active,
            Err(err) => log::warn!("Ignoring tip state entry {key:?}: {err}"),
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tip_states() {
        let flags = parse_tip_states(
            r#"{"1": {"active": true}, "3": {"active": true}, "4": {"active": false}, "9": {"active": true}}"#,
        )
        .unwrap();
        assert_eq!(flags, [true, false, true, false, false, false, false, false]);
    }

    #[test]
    fn test_missing_file_means_all_inactive() {
        let path = std::env::temp_dir().join(format!("tip_states_{}.json", uuid::Uuid::new_v4()));
        assert_eq!(load_tip_states(&path).unwrap(), [false; TIP_COUNT]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(matches!(
            parse_tip_states("[1, 2]"),
            Err(BridgeError::Json(_))
        ));
    }
}
