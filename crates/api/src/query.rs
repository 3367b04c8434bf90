//! Shared query parameter types for API handlers.

use glossa_core::stats::ReadMode;
use serde::Deserialize;

/// `?force=true` bypasses cached aggregates on statistics reads.
#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    #[serde(default)]
    pub force: bool,
}

impl ReadParams {
    pub fn mode(&self) -> ReadMode {
        if self.force {
            ReadMode::Force
        } else {
            ReadMode::Cached
        }
    }
}
