//! Best-effort record of an interrupted session.
//!
//! A snapshot is written on exit while a round is live and read back once on
//! the next start. It is advisory: the server remains authoritative, so the
//! only effects of loading one are restored bet settings and a notice.

use crate::seat::BetMode;
use serde::{Deserialize, Serialize};
use skyrocket_types::{BetScope, RoundPhase, DEFAULT_BET_AMOUNT};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Snapshots older than this are discarded unread.
pub const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    /// 1-based seat number.
    pub seat: u8,
    pub amount: f64,
    pub placed: bool,
    pub scope: Option<BetScope>,
    pub mode: BetMode,
    pub auto_cashout_threshold: f64,
    pub auto_cashout_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Wall-clock milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
    pub phase: RoundPhase,
    pub multiplier: f64,
    pub seats: Vec<SeatSnapshot>,
    pub round_counter: u64,
}

impl SessionSnapshot {
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.saved_at_ms) < SNAPSHOT_MAX_AGE.as_millis() as u64
    }

    /// Only live rounds with something at stake are worth remembering.
    pub fn worth_saving(&self) -> bool {
        matches!(self.phase, RoundPhase::Pause | RoundPhase::InProgress)
            && self
                .seats
                .iter()
                .any(|seat| seat.placed || seat.amount != DEFAULT_BET_AMOUNT)
    }

    pub fn any_placed(&self) -> bool {
        self.seats.iter().any(|seat| seat.placed)
    }
}

/// What restoring a snapshot told the user.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotNotice {
    AmountsRestored,
    RoundInterrupted { multiplier: f64 },
}

/// JSON file holding at most one snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&self.path, data)?;
        info!(path = %self.path.display(), phase = %snapshot.phase, "session snapshot saved");
        Ok(())
    }

    /// Read and delete the snapshot. Stale snapshots are deleted and
    /// reported as absent.
    pub fn take(&self, now_ms: u64) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        self.clear()?;
        let snapshot: SessionSnapshot = serde_json::from_slice(&data)?;
        if !snapshot.is_fresh(now_ms) {
            debug!(saved_at_ms = snapshot.saved_at_ms, now_ms, "discarding stale snapshot");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    pub fn clear(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
