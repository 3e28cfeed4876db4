//! Persisted models

use serde::{Deserialize, Serialize};

/// Height of the last block the scanner fully processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub last_scanned_height: u64,
}

impl ScanCursor {
    pub fn new(height: u64) -> Self {
        Self {
            last_scanned_height: height,
        }
    }

    /// Move forward to `height`; never moves backwards
    pub fn advance_to(&mut self, height: u64) -> bool {
        if height > self.last_scanned_height {
            self.last_scanned_height = height;
            true
        } else {
            false
        }
    }

    pub fn next_height(&self) -> u64 {
        self.last_scanned_height + 1
    }
}
