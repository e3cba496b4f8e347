//! Feed sources.
//!
//! The poll cycle only sees [`FeedSource`]; [`HttpFeedSource`] is the
//! production implementation talking to the vehicle-count HTTP API.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::FeedConfig;
use crate::window::Granularity;

// ─── Feeds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Second,
    Hour,
    Day,
    /// Rolling last-hour totals.
    Summary,
    /// Calendar-day totals with the source's own peak hour.
    DaySummary,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Second => "second",
            Feed::Hour => "hour",
            Feed::Day => "day",
            Feed::Summary => "summary",
            Feed::DaySummary => "day-summary",
        }
    }
}

impl From<Granularity> for Feed {
    fn from(g: Granularity) -> Self {
        match g {
            Granularity::Second => Feed::Second,
            Granularity::Hour => Feed::Hour,
            Granularity::Day => Feed::Day,
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FeedError {
    /// Source unreachable, timed out, or the connection broke mid-response.
    #[error("request failed: {0}")]
    Transport(String),
    #[error("source answered with HTTP {status}")]
    Status { status: u16 },
    /// Payload arrived but is not the expected shape.
    #[error("unexpected payload: {0}")]
    Schema(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FeedError::Schema(e.to_string())
        } else if let Some(status) = e.status() {
            FeedError::Status { status: status.as_u16() }
        } else {
            FeedError::Transport(e.to_string())
        }
    }
}

/// Anything that can answer a feed request with a JSON payload.
pub trait FeedSource {
    fn fetch(&self, feed: Feed) -> impl Future<Output = Result<Value, FeedError>> + Send;
}

// ─── HTTP source ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CameraList {
    #[serde(default)]
    cameras: Vec<String>,
}

pub struct HttpFeedSource {
    http: Client,
    base: Url,
    cfg:  FeedConfig,
}

impl HttpFeedSource {
    pub fn new(cfg: &FeedConfig) -> Result<Self, FeedError> {
        let mut base = Url::parse(&cfg.base_url)
            .map_err(|e| FeedError::Endpoint(format!("{}: {}", cfg.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(FeedError::Endpoint(format!("{} cannot be a base URL", cfg.base_url)));
        }
        // Paths resolve relative to the base, so keep any prefix it carries.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| FeedError::Transport(format!("client setup: {}", e)))?;

        Ok(Self {
            http,
            base,
            cfg: cfg.clone(),
        })
    }

    /// Full request URL for a feed, including the camera filter, the day
    /// feed's bucket width and the day summary's date.
    pub fn endpoint(&self, feed: Feed) -> Result<Url, FeedError> {
        let path = match feed {
            Feed::Second => &self.cfg.second_path,
            Feed::Hour => &self.cfg.hour_path,
            Feed::Day => &self.cfg.day_path,
            Feed::Summary => &self.cfg.summary_path,
            Feed::DaySummary => &self.cfg.day_summary_path,
        };
        let mut url = self.resolve(path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(camera) = self.cfg.camera_id.as_deref().filter(|c| !c.is_empty()) {
                query.append_pair("camera_id", camera);
            }
            if feed == Feed::Day {
                query.append_pair(
                    "interval_minutes",
                    &self.cfg.effective_day_interval().to_string(),
                );
            }
            if feed == Feed::DaySummary {
                if let Some(date) = self.cfg.summary_date.as_deref().filter(|d| !d.is_empty()) {
                    query.append_pair("start_date", date);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn resolve(&self, path: &str) -> Result<Url, FeedError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| FeedError::Endpoint(format!("{}: {}", path, e)))
    }

    async fn get_json(&self, url: Url) -> Result<Value, FeedError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| FeedError::Schema(e.to_string()))
    }

    /// Camera ids known to the source.
    pub async fn cameras(&self) -> Result<Vec<String>, FeedError> {
        let url = self.resolve(&self.cfg.cameras_path)?;
        let payload = self.get_json(url).await?;
        let list = CameraList::deserialize(&payload)
            .map_err(|e| FeedError::Schema(format!("camera list: {}", e)))?;
        Ok(list.cameras)
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: Feed) -> Result<Value, FeedError> {
        let url = self.endpoint(feed)?;
        debug!(%feed, %url, "Fetching feed");
        self.get_json(url).await
    }
}
