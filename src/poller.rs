//! Poll Cycle Controller
//!
//! Architecture:
//!   interval tick (skip missed ticks, never overlap)
//!     → fetch second / hour / day / summary / day-summary feeds concurrently
//!     → each result applied to its own slot in isolation
//!       → failure: log, keep the previous contents
//!     → second feed only: newest reading (source order)
//!       → dedup against the pre-replacement window
//!       → accumulator + trend tracker
//!     → settle: status, last-updated, no-data error
//!
//! Snapshots are published on a `watch` channel for the view layer.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::TrafficConfig;
use crate::feed::{Feed, FeedError, FeedSource};
use crate::sample::{decode_samples, IdentityKey};
use crate::state::{DashboardSnapshot, DashboardState};
use crate::summary::{decode_day_summary, decode_summary};
use crate::window::Granularity;

// ─── One tick ────────────────────────────────────────────────────────────────

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Feeds whose payload was applied.
    pub applied:  Vec<Feed>,
    /// Feeds that failed; their previous contents were kept.
    pub failed:   Vec<(Feed, FeedError)>,
    /// Identity of the latest reading when it was accepted as new.
    pub accepted: Option<IdentityKey>,
}

impl TickReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }

    fn fail(&mut self, feed: Feed, err: FeedError) {
        warn!(%feed, error = %err, "Feed update failed, keeping previous data");
        self.failed.push((feed, err));
    }
}

/// Run a complete poll cycle against `source`.
pub async fn run_tick<S: FeedSource>(source: &S, state: &mut DashboardState) -> TickReport {
    state.begin_tick();
    cycle(source, state).await
}

async fn cycle<S: FeedSource>(source: &S, state: &mut DashboardState) -> TickReport {
    let (second, hour, day, summary, day_summary) = tokio::join!(
        source.fetch(Feed::Second),
        source.fetch(Feed::Hour),
        source.fetch(Feed::Day),
        source.fetch(Feed::Summary),
        source.fetch(Feed::DaySummary),
    );
    let now = Utc::now();
    let mut report = TickReport::default();

    match second.and_then(|payload| apply_second(state, &payload, now)) {
        Ok(accepted) => {
            report.applied.push(Feed::Second);
            report.accepted = accepted;
        }
        Err(e) => report.fail(Feed::Second, e),
    }

    for (granularity, result) in [(Granularity::Hour, hour), (Granularity::Day, day)] {
        match result.and_then(|payload| state.apply_window_payload(granularity, &payload)) {
            Ok(_) => report.applied.push(granularity.into()),
            Err(e) => report.fail(granularity.into(), e),
        }
    }

    match summary.and_then(|payload| decode_summary(&payload)) {
        Ok(totals) => {
            state.set_summary(totals);
            report.applied.push(Feed::Summary);
        }
        Err(e) => report.fail(Feed::Summary, e),
    }

    match day_summary.and_then(|payload| decode_day_summary(&payload)) {
        Ok(day) => {
            state.set_day_summary(day);
            report.applied.push(Feed::DaySummary);
        }
        Err(e) => report.fail(Feed::DaySummary, e),
    }

    state.settle(report.is_degraded(), !report.applied.is_empty(), now);
    debug!(
        applied = report.applied.len(),
        failed = report.failed.len(),
        accepted = report.accepted.is_some(),
        "Tick settled"
    );
    report
}

/// Replace the second window, then push its newest reading through dedup.
///
/// "Newest" is the first record in source order: the feed lists newest
/// first and that order is trusted for this one purpose.
fn apply_second(
    state: &mut DashboardState,
    payload: &Value,
    now: chrono::DateTime<Utc>,
) -> Result<Option<IdentityKey>, FeedError> {
    let samples = decode_samples(payload)?;
    let latest = samples.first().cloned();
    let prior = state.replace_window(Granularity::Second, samples);

    Ok(latest.and_then(|sample| {
        state
            .ingest_latest(&sample, &prior, now)
            .then(|| sample.identity())
    }))
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

pub struct Poller<S> {
    source:   S,
    state:    DashboardState,
    interval: Duration,
}

impl<S> Poller<S>
where
    S: FeedSource + Send + Sync + 'static,
{
    pub fn new(source: S, cfg: &TrafficConfig) -> Self {
        Self {
            source,
            state: DashboardState::new(cfg),
            interval: cfg.poll.interval(),
        }
    }

    /// Start ticking in a background task. The first tick fires immediately.
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.state.snapshot());
        let join = tokio::spawn(self.run(stop_rx, snapshot_tx));
        PollerHandle {
            stop_tx,
            snapshots: snapshot_rx,
            join,
        }
    }

    async fn run(
        mut self,
        mut stop_rx: watch::Receiver<bool>,
        snapshot_tx: watch::Sender<DashboardSnapshot>,
    ) -> DashboardState {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow tick delays the next one; ticks missed meanwhile are dropped.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        info!(interval_ms = self.interval.as_millis() as u64, "Poller running");

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    self.state.begin_tick();
                    snapshot_tx.send_replace(self.state.snapshot());

                    let report = cycle(&self.source, &mut self.state).await;
                    if report.is_degraded() {
                        debug!(tick = ticks, failed = report.failed.len(), "Degraded tick");
                    }
                    snapshot_tx.send_replace(self.state.snapshot());
                }
            }
        }

        info!(ticks, accepted = self.state.accumulator().accepted(), "Poller stopped");
        self.state
    }
}

/// Control handle for a spawned [`Poller`].
pub struct PollerHandle {
    stop_tx:   watch::Sender<bool>,
    snapshots: watch::Receiver<DashboardSnapshot>,
    join:      JoinHandle<DashboardState>,
}

impl PollerHandle {
    /// Receiver that is notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop scheduling ticks and wait for an in-flight tick to finish.
    pub async fn stop(self) -> Result<DashboardState, JoinError> {
        let _ = self.stop_tx.send(true);
        self.join.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed {
        second: Value,
    }

    impl FeedSource for Fixed {
        async fn fetch(&self, feed: Feed) -> Result<Value, FeedError> {
            match feed {
                Feed::Second => Ok(self.second.clone()),
                Feed::Summary | Feed::DaySummary => Err(FeedError::Status { status: 500 }),
                _ => Ok(json!([])),
            }
        }
    }

    #[tokio::test]
    async fn test_newest_is_first_in_source_order() {
        // newest-first, as the source sends it
        let source = Fixed {
            second: json!([
                { "timestamp": "2024-05-01T12:00:02", "camera_id": "cam", "car": 7 },
                { "timestamp": "2024-05-01T12:00:01", "camera_id": "cam", "car": 3 }
            ]),
        };
        let mut state = DashboardState::new(&TrafficConfig::default());
        let report = run_tick(&source, &mut state).await;

        assert_eq!(state.trend().current().car, 7);
        assert_eq!(state.totals().car, 7);
        assert!(report.accepted.is_some());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(state.window(Granularity::Second).latest().map(|s| s.counts().car), Some(7));
    }

    #[tokio::test]
    async fn test_empty_second_feed_skips_pipeline() {
        let source = Fixed { second: json!([]) };
        let mut state = DashboardState::new(&TrafficConfig::default());
        let report = run_tick(&source, &mut state).await;

        assert!(report.accepted.is_none());
        assert!(report.applied.contains(&Feed::Second));
        assert_eq!(state.accumulator().accepted(), 0);
        assert!(state.error().is_some());
    }
}
