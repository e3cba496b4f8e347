//! Window Store: three bounded, time-ordered sample sequences.
//!
//! Each window is replaced wholesale whenever its feed answers. Replacement
//! re-sorts by timestamp (source order is not trusted) and keeps the most
//! recent `cap` entries.

use serde::Serialize;
use serde_json::Value;

use crate::config::WindowConfig;
use crate::feed::FeedError;
use crate::sample::{decode_samples, IdentityKey, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Hour,
    Day,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Second, Granularity::Hour, Granularity::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }

    pub(crate) fn label_format(&self) -> &'static str {
        match self {
            Granularity::Second => "%H:%M:%S",
            Granularity::Hour => "%H:00",
            Granularity::Day => "%H:%M",
        }
    }
}

// ─── Window ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    samples: Vec<Sample>,
}

impl Window {
    /// Normalize a feed response into a window.
    ///
    /// The sort is stable, so samples of equal rank (including every undated
    /// sample) keep their received relative order.
    pub fn from_samples(mut samples: Vec<Sample>, cap: Option<usize>) -> Self {
        samples.sort_by_key(|s| s.timestamp().sort_rank());
        if let Some(cap) = cap {
            if samples.len() > cap {
                let excess = samples.len() - cap;
                samples.drain(..excess);
            }
        }
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample by timestamp.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.samples.iter().any(|s| s.has_identity(key))
    }

    /// Sample with the highest `total`; the later one wins ties.
    pub fn peak(&self) -> Option<&Sample> {
        self.samples.iter().max_by_key(|s| s.total())
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WindowStore {
    second: Window,
    hour: Window,
    day: Window,
    caps: WindowConfig,
}

impl WindowStore {
    pub fn new(caps: WindowConfig) -> Self {
        Self {
            second: Window::default(),
            hour: Window::default(),
            day: Window::default(),
            caps,
        }
    }

    pub fn get(&self, granularity: Granularity) -> &Window {
        match granularity {
            Granularity::Second => &self.second,
            Granularity::Hour => &self.hour,
            Granularity::Day => &self.day,
        }
    }

    fn slot_mut(&mut self, granularity: Granularity) -> &mut Window {
        match granularity {
            Granularity::Second => &mut self.second,
            Granularity::Hour => &mut self.hour,
            Granularity::Day => &mut self.day,
        }
    }

    pub fn cap(&self, granularity: Granularity) -> Option<usize> {
        match granularity {
            Granularity::Second => Some(self.caps.second_cap),
            Granularity::Hour => Some(self.caps.hour_cap),
            Granularity::Day => self.caps.day_cap,
        }
    }

    /// Overwrite a window and hand back the one it replaced.
    ///
    /// The returned window is the only pre-replacement view callers get, so
    /// anything that must see "the window before this tick" has to use it.
    pub fn replace(&mut self, granularity: Granularity, samples: Vec<Sample>) -> Window {
        let next = Window::from_samples(samples, self.cap(granularity));
        std::mem::replace(self.slot_mut(granularity), next)
    }

    /// Decode and apply a raw feed payload. On a schema violation the window
    /// is left untouched.
    pub fn replace_from_payload(
        &mut self,
        granularity: Granularity,
        payload: &Value,
    ) -> Result<Window, FeedError> {
        let samples = decode_samples(payload)?;
        Ok(self.replace(granularity, samples))
    }

    pub fn all_empty(&self) -> bool {
        Granularity::ALL.iter().all(|g| self.get(*g).is_empty())
    }
}
