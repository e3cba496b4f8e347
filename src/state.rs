//! Dashboard state: the single-owner record mutated by the poll cycle, and
//! the serializable snapshot handed to the view layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::accumulator::{Accumulator, LifetimeTotals};
use crate::config::TrafficConfig;
use crate::dedup::DedupGuard;
use crate::feed::FeedError;
use crate::sample::{ClassCounts, Sample, VehicleClass};
use crate::summary::{DaySummary, SummaryTotals};
use crate::trend::{Trend, TrendTracker};
use crate::window::{Granularity, Window, WindowStore};

/// Shown when every granularity window is empty.
pub const NO_DATA_MESSAGE: &str = "No traffic data available from any feed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// No tick has run yet.
    #[default]
    Idle,
    Fetching,
    /// Last tick: every feed answered.
    Settled,
    /// Last tick: at least one feed failed and kept its previous contents.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    windows:      WindowStore,
    dedup:        DedupGuard,
    accumulator:  Accumulator,
    trend:        TrendTracker,
    summary:      Option<SummaryTotals>,
    day_summary:  Option<DaySummary>,
    last_updated: Option<DateTime<Utc>>,
    status:       PollStatus,
    error:        Option<String>,
}

impl DashboardState {
    pub fn new(cfg: &TrafficConfig) -> Self {
        Self {
            windows: WindowStore::new(cfg.window.clone()),
            dedup: DedupGuard::new(&cfg.dedup),
            accumulator: Accumulator::new(),
            trend: TrendTracker::new(),
            summary: None,
            day_summary: None,
            last_updated: None,
            status: PollStatus::Idle,
            error: None,
        }
    }

    pub fn window(&self, granularity: Granularity) -> &Window {
        self.windows.get(granularity)
    }

    pub fn dedup(&self) -> &DedupGuard {
        &self.dedup
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn totals(&self) -> &LifetimeTotals {
        self.accumulator.totals()
    }

    pub fn trend(&self) -> &TrendTracker {
        &self.trend
    }

    pub fn summary(&self) -> Option<&SummaryTotals> {
        self.summary.as_ref()
    }

    pub fn day_summary(&self) -> Option<&DaySummary> {
        self.day_summary.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn status(&self) -> PollStatus {
        self.status
    }

    pub fn is_fetching(&self) -> bool {
        self.status == PollStatus::Fetching
    }

    /// User-visible error, present only while all three windows are empty.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // ── Tick-side mutators (driven by the poll cycle) ───────────────────

    pub(crate) fn begin_tick(&mut self) {
        self.status = PollStatus::Fetching;
    }

    /// Overwrite a window, returning the pre-replacement window.
    pub(crate) fn replace_window(&mut self, granularity: Granularity, samples: Vec<Sample>) -> Window {
        self.windows.replace(granularity, samples)
    }

    pub(crate) fn apply_window_payload(
        &mut self,
        granularity: Granularity,
        payload: &serde_json::Value,
    ) -> Result<Window, FeedError> {
        self.windows.replace_from_payload(granularity, payload)
    }

    /// Run the latest second-granularity reading through dedup, then the
    /// accumulator and trend tracker. `prior` is the second window from
    /// before this tick's replacement.
    pub(crate) fn ingest_latest(&mut self, latest: &Sample, prior: &Window, at: DateTime<Utc>) -> bool {
        if !self.dedup.admit(latest, prior) {
            debug!(source = latest.source_id(), "Latest sample already recorded, skipping");
            return false;
        }
        self.accumulator.accept(latest);
        self.trend.update(latest.counts(), at);
        true
    }

    pub(crate) fn set_summary(&mut self, summary: SummaryTotals) {
        self.summary = Some(summary);
    }

    pub(crate) fn set_day_summary(&mut self, summary: DaySummary) {
        self.day_summary = Some(summary);
    }

    pub(crate) fn settle(&mut self, degraded: bool, any_applied: bool, at: DateTime<Utc>) {
        self.status = if degraded {
            PollStatus::Degraded
        } else {
            PollStatus::Settled
        };
        if any_applied {
            self.last_updated = Some(at);
        }

        if self.windows.all_empty() {
            if self.error.is_none() {
                error!("{}", NO_DATA_MESSAGE);
            }
            self.error = Some(NO_DATA_MESSAGE.to_string());
        } else if self.error.take().is_some() {
            info!("Traffic data available again");
        }
    }

    // ── View snapshot ───────────────────────────────────────────────────

    pub fn snapshot(&self) -> DashboardSnapshot {
        let rows = |g: Granularity| -> Vec<SampleRow> {
            self.windows
                .get(g)
                .samples()
                .iter()
                .map(|s| SampleRow::new(s, g))
                .collect()
        };

        let live = VehicleClass::ALL
            .iter()
            .map(|class| LiveTally {
                class: *class,
                count: self.trend.current().get(*class),
                previous: self.trend.previous().get(*class),
                trend: self.trend.trend(*class),
            })
            .collect();

        DashboardSnapshot {
            second: rows(Granularity::Second),
            hour: rows(Granularity::Hour),
            day: rows(Granularity::Day),
            hour_peak: self
                .windows
                .get(Granularity::Hour)
                .peak()
                .map(|s| SampleRow::new(s, Granularity::Hour)),
            live,
            live_updated_at: self.trend.updated_at(),
            lifetime: *self.accumulator.totals(),
            lifetime_total: self.accumulator.totals().sum(),
            summary: self.summary,
            day_summary: self.day_summary.clone(),
            last_updated: self.last_updated,
            fetching: self.is_fetching(),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

// ─── Snapshot types ──────────────────────────────────────────────────────────

/// One chart point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRow {
    pub label:     String,
    pub timestamp: Option<DateTime<Utc>>,
    pub camera_id: String,
    pub counts:    ClassCounts,
    pub total:     u64,
}

impl SampleRow {
    fn new(sample: &Sample, granularity: Granularity) -> Self {
        Self {
            label: sample.label(granularity),
            timestamp: sample.timestamp().instant(),
            camera_id: sample.source_id().to_string(),
            counts: *sample.counts(),
            total: sample.total(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveTally {
    pub class:    VehicleClass,
    pub count:    u64,
    pub previous: u64,
    pub trend:    Trend,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSnapshot {
    pub second:          Vec<SampleRow>,
    pub hour:            Vec<SampleRow>,
    pub day:             Vec<SampleRow>,
    pub hour_peak:       Option<SampleRow>,
    pub live:            Vec<LiveTally>,
    pub live_updated_at: Option<DateTime<Utc>>,
    pub lifetime:        LifetimeTotals,
    pub lifetime_total:  u64,
    pub summary:         Option<SummaryTotals>,
    pub day_summary:     Option<DaySummary>,
    pub last_updated:    Option<DateTime<Utc>>,
    pub fetching:        bool,
    pub status:          PollStatus,
    pub error:           Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleTime;

    fn sample(ts: &str, car: u64) -> Sample {
        Sample::new(
            SampleTime::parse(ts),
            "cam",
            ClassCounts { car, ..Default::default() },
            car,
        )
    }

    #[test]
    fn test_error_only_when_all_windows_empty() {
        let mut state = DashboardState::new(&TrafficConfig::default());
        state.settle(true, false, Utc::now());
        assert_eq!(state.error(), Some(NO_DATA_MESSAGE));

        state.replace_window(Granularity::Day, vec![sample("2024-05-01T12:00:00", 1)]);
        state.settle(true, true, Utc::now());
        assert_eq!(state.error(), None);
        assert_eq!(state.status(), PollStatus::Degraded);
    }

    #[test]
    fn test_ingest_uses_prior_window() {
        let mut state = DashboardState::new(&TrafficConfig::default());
        let s = sample("2024-05-01T12:00:00", 4);
        let prior = state.replace_window(Granularity::Second, vec![s.clone()]);
        assert!(state.ingest_latest(&s, &prior, Utc::now()));

        // same reading again next tick
        let prior = state.replace_window(Granularity::Second, vec![s.clone()]);
        assert!(!state.ingest_latest(&s, &prior, Utc::now()));
        assert_eq!(state.totals().car, 4);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut state = DashboardState::new(&TrafficConfig::default());
        let s = sample("2024-05-01T12:00:07", 2);
        let prior = state.replace_window(Granularity::Second, vec![s.clone()]);
        state.ingest_latest(&s, &prior, Utc::now());
        state.begin_tick();

        let snap = state.snapshot();
        assert!(snap.fetching);
        assert_eq!(snap.second.len(), 1);
        assert_eq!(snap.second[0].label, "12:00:07");
        assert_eq!(snap.live.len(), VehicleClass::ALL.len());
        assert_eq!(snap.live[0].trend, Trend::Up);
        assert_eq!(snap.lifetime_total, 2);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "fetching");
        assert_eq!(json["live"][1]["trend"], "none");
    }
}
