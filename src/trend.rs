//! Trend Tracker: one-step lag between the latest two readings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sample::{ClassCounts, VehicleClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[serde(rename = "none")]
    Flat,
}

impl Trend {
    /// Strict comparison both ways; equal values are flat.
    pub fn between(current: u64, previous: u64) -> Self {
        match current.cmp(&previous) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Flat => "·",
        }
    }
}

/// `previous` always holds what `current` was right before the last update.
#[derive(Debug, Clone, Default)]
pub struct TrendTracker {
    current:    ClassCounts,
    previous:   ClassCounts,
    updated_at: Option<DateTime<Utc>>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the newest instantaneous reading (not accumulated totals).
    pub fn update(&mut self, latest: &ClassCounts, at: DateTime<Utc>) {
        self.previous = std::mem::replace(&mut self.current, *latest);
        self.updated_at = Some(at);
    }

    pub fn trend(&self, class: VehicleClass) -> Trend {
        Trend::between(self.current.get(class), self.previous.get(class))
    }

    pub fn current(&self) -> &ClassCounts {
        &self.current
    }

    pub fn previous(&self) -> &ClassCounts {
        &self.previous
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
