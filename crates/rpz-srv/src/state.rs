//! Serial persistence: the output zone serial survives restarts.
//!
//! Secondaries refuse to transfer a zone whose serial went backwards, so the
//! last published serial is written on shutdown and read back at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Serial used when no state file exists yet.
pub const INITIAL_SERIAL: u32 = 1;

/// On-disk serial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SerialFile {
    serial: u32,
    /// Unix time the serial was written.
    #[serde(default)]
    saved_at: i64,
}

/// Default serial state path: `<data dir>/rpzd/serial.json`.
pub fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("rpzd").join("serial.json"))
}

/// Load the persisted serial.
///
/// A missing or unreadable file is not an error: the zone starts over at
/// [`INITIAL_SERIAL`].
pub fn load_serial(path: &Path) -> u32 {
    if !path.exists() {
        return INITIAL_SERIAL;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<SerialFile>(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(file) => file.serial,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable serial file, starting at 1");
            INITIAL_SERIAL
        }
    }
}

/// Serial to start serving at.
///
/// Feed-backed lists are rebuilt from scratch on restart, so the content
/// published under the persisted serial may not come back. Starting one past
/// it makes secondaries pull instead of trusting a stale copy.
pub fn startup_serial(path: &Path) -> u32 {
    if path.exists() {
        load_serial(path).wrapping_add(1)
    } else {
        INITIAL_SERIAL
    }
}

/// Persist the serial, creating parent directories as needed.
pub fn save_serial(path: &Path, serial: u32) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::SrvError::State(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let record = SerialFile {
        serial,
        saved_at: chrono::Utc::now().timestamp(),
    };
    let content = serde_json::to_string_pretty(&record)?;
    std::fs::write(path, content)
        .map_err(|e| crate::SrvError::State(format!("failed to write {}: {e}", path.display())))
}
