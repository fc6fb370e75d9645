//! Generation - one evaluation epoch

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::component::Component;

/// A logical epoch during which components accumulate metrics before a survival decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub number: u64,
    pub started_at: DateTime<Utc>,
}

impl Generation {
    pub fn genesis(started_at: DateTime<Utc>) -> Self {
        Self {
            number: 0,
            started_at,
        }
    }

    /// The generation that follows this one
    pub fn next(&self, started_at: DateTime<Utc>) -> Self {
        Self {
            number: self.number + 1,
            started_at,
        }
    }

    /// Time elapsed since the generation started
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    /// A component has completed this generation's window when it existed before the window
    /// opened. Components created mid-window (emergency replacements) wait one more generation.
    pub fn has_completed_window(&self, component: &Component) -> bool {
        component.created_at <= self.started_at
    }
}
