//! Traffic Live Configuration
//!
//! Loaded from traffic-live.toml (working directory) with env-var overrides.
//! Env format: TRAFFIC_LIVE__SECTION__KEY (double underscore separators).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

// ─── Feed endpoints ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Restrict every feed to one camera.
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bucket width requested from the day feed.
    #[serde(default = "default_day_interval_minutes")]
    pub day_interval_minutes: u32,
    #[serde(default = "default_second_path")]
    pub second_path: String,
    #[serde(default = "default_hour_path")]
    pub hour_path: String,
    #[serde(default = "default_day_path")]
    pub day_path: String,
    #[serde(default = "default_summary_path")]
    pub summary_path: String,
    #[serde(default = "default_day_summary_path")]
    pub day_summary_path: String,
    /// Day the day summary covers (`YYYY-MM-DD`); the source defaults to
    /// today (UTC) when unset.
    #[serde(default)]
    pub summary_date: Option<String>,
    #[serde(default = "default_cameras_path")]
    pub cameras_path: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_day_interval_minutes() -> u32 {
    10
}
fn default_second_path() -> String {
    "/api/vehicle-counts/secondly".to_string()
}
fn default_hour_path() -> String {
    "/api/vehicle-counts/hourly".to_string()
}
fn default_day_path() -> String {
    "/api/vehicle-counts/daily".to_string()
}
fn default_summary_path() -> String {
    "/api/vehicle-counts/last-hour".to_string()
}
fn default_day_summary_path() -> String {
    "/api/vehicle-counts/summary".to_string()
}
fn default_cameras_path() -> String {
    "/api/cameras".to_string()
}

impl FeedConfig {
    /// The source only accepts 1..=60 minute buckets and falls back to 10.
    pub fn effective_day_interval(&self) -> u32 {
        if (1..=60).contains(&self.day_interval_minutes) {
            self.day_interval_minutes
        } else {
            default_day_interval_minutes()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            camera_id: None,
            timeout_secs: default_timeout_secs(),
            day_interval_minutes: default_day_interval_minutes(),
            second_path: default_second_path(),
            hour_path: default_hour_path(),
            day_path: default_day_path(),
            summary_path: default_summary_path(),
            day_summary_path: default_day_summary_path(),
            summary_date: None,
            cameras_path: default_cameras_path(),
        }
    }
}

// ─── Polling ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

// ─── Display windows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_second_cap")]
    pub second_cap: usize,
    #[serde(default = "default_hour_cap")]
    pub hour_cap: usize,
    /// Unset keeps every bucket the day feed returns.
    #[serde(default)]
    pub day_cap: Option<usize>,
}

fn default_second_cap() -> usize {
    30
}
fn default_hour_cap() -> usize {
    10
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            second_cap: default_second_cap(),
            hour_cap: default_hour_cap(),
            day_cap: None,
        }
    }
}

// ─── Deduplication ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// How far behind the newest seen sample a key is remembered.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_max_undated_keys")]
    pub max_undated_keys: usize,
}

fn default_retention_secs() -> u64 {
    3600
}
fn default_max_undated_keys() -> usize {
    1024
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_undated_keys: default_max_undated_keys(),
        }
    }
}

/// Load configuration from traffic-live.toml (or `path`) + environment
/// variable overrides.
///
/// Search order:
///   1. `path` when given, otherwise ./traffic-live.toml (optional)
///   2. Environment variables: TRAFFIC_LIVE__FEED__BASE_URL, etc.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TrafficConfig> {
    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name("traffic-live").required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("TRAFFIC_LIVE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize::<TrafficConfig>()?)
}

pub fn default_config() -> TrafficConfig {
    TrafficConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_display_caps() {
        let cfg = default_config();
        assert_eq!(cfg.window.second_cap, 30);
        assert_eq!(cfg.window.hour_cap, 10);
        assert_eq!(cfg.window.day_cap, None);
        assert_eq!(cfg.poll.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_day_interval_out_of_range_falls_back() {
        let mut feed = FeedConfig::default();
        feed.day_interval_minutes = 0;
        assert_eq!(feed.effective_day_interval(), 10);
        feed.day_interval_minutes = 90;
        assert_eq!(feed.effective_day_interval(), 10);
        feed.day_interval_minutes = 15;
        assert_eq!(feed.effective_day_interval(), 15);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[feed]\nbase_url = \"http://traffic.local:9000\"\ncamera_id = \"gate-2\"\n\n[window]\nsecond_cap = 12"
        )
        .unwrap();

        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.feed.base_url, "http://traffic.local:9000");
        assert_eq!(cfg.feed.camera_id.as_deref(), Some("gate-2"));
        assert_eq!(cfg.window.second_cap, 12);
        assert_eq!(cfg.window.hour_cap, 10);
        assert_eq!(cfg.feed.summary_path, "/api/vehicle-counts/last-hour");
        assert_eq!(cfg.feed.day_summary_path, "/api/vehicle-counts/summary");
        assert_eq!(cfg.feed.summary_date, None);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/traffic-live.toml"))).is_err());
    }
}
