//! Real-time ingestion engine for polled vehicle-count telemetry.
//!
//! Polls second, hour and day granularity feeds plus a rolling summary,
//! keeps bounded display windows, counts each distinct reading exactly once
//! and tracks per-class trend direction.

pub mod accumulator;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod logging;
pub mod poller;
pub mod sample;
pub mod state;
pub mod summary;
pub mod trend;
pub mod window;

pub use config::TrafficConfig;
pub use feed::{Feed, FeedError, FeedSource, HttpFeedSource};
pub use poller::{run_tick, Poller, PollerHandle, TickReport};
pub use sample::{ClassCounts, Sample, SampleTime, VehicleClass};
pub use state::{DashboardSnapshot, DashboardState, PollStatus};
pub use trend::Trend;
pub use window::Granularity;
