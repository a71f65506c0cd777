//! Point ledger - balance with a per-session award guard, persisted to disk

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::StoreError;

/// Client's point balance
///
/// The balance never drops below zero and has no upper bound. At most one
/// award lands per connection session: the first one sets `award_guard`
/// and only a session reset clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointLedger {
    balance: u64,
    award_guard: bool,
}

impl PointLedger {
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance,
            award_guard: false,
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn award_guard(&self) -> bool {
        self.award_guard
    }

    /// Apply `delta` unless this session already got its award.
    ///
    /// Returns the new balance when applied.
    pub fn award(&mut self, delta: i32) -> Option<u64> {
        if self.award_guard {
            debug!(delta, "award already taken this session");
            return None;
        }

        let before = self.balance;
        self.balance = if delta < 0 {
            before.saturating_sub(delta.unsigned_abs() as u64)
        } else {
            before.saturating_add(delta as u64)
        };
        self.award_guard = true;

        info!(delta, before, balance = self.balance, "points applied");
        Some(self.balance)
    }

    /// New session: allow one more award
    pub fn reset_guard(&mut self) {
        self.award_guard = false;
    }

    pub fn clear(&mut self) {
        self.balance = 0;
    }
}

/// On-disk form; the guard is per-session and never stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredLedger {
    balance: u64,
}

/// JSON file holding the balance between runs
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub const FILE_NAME: &'static str = "ledger.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<home>/ledger.json`
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means a fresh ledger
    pub fn load(&self) -> Result<u64, StoreError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let data = fs::read_to_string(&self.path)?;
        let stored: StoredLedger = serde_json::from_str(&data)?;
        Ok(stored.balance)
    }

    pub fn save(&self, balance: u64) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&StoredLedger { balance })?;
        fs::write(&self.path, data)?;
        debug!(balance, path = %self.path.display(), "ledger saved");
        Ok(())
    }
}
