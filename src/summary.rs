//! Summary feeds: per-class totals computed by the source.
//!
//! Two shapes: the rolling last-hour totals and the calendar-day summary
//! (totals, peak hour, record count). Both are displayed as-is and never
//! reconciled with the locally accumulated lifetime totals.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::FeedError;
use crate::sample::{kind_of, lenient_count, ClassCounts};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryTotals {
    pub counts: ClassCounts,
    pub total:  u64,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    hourly_totals: HourlyTotals,
}

#[derive(Debug, Deserialize)]
struct HourlyTotals {
    #[serde(default, deserialize_with = "lenient_count")]
    cars: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    bikes: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    trucks: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    buses: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    autos: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    total: u64,
}

pub fn decode_summary(payload: &Value) -> Result<SummaryTotals, FeedError> {
    if !payload.is_object() {
        return Err(FeedError::Schema(format!(
            "expected a summary object, got {}",
            kind_of(payload)
        )));
    }
    let parsed = SummaryPayload::deserialize(payload)
        .map_err(|e| FeedError::Schema(format!("summary payload: {}", e)))?;
    let t = parsed.hourly_totals;
    Ok(SummaryTotals {
        counts: ClassCounts {
            car:   t.cars,
            bike:  t.bikes,
            truck: t.trucks,
            bus:   t.buses,
            auto:  t.autos,
        },
        total: t.total,
    })
}

// ─── Day summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    /// Day covered, as reported by the source.
    pub date:            Option<String>,
    pub counts:          ClassCounts,
    pub total:           u64,
    /// Busiest hour (`HH:MM`), absent when the day has no records.
    pub peak_hour:       Option<String>,
    pub peak_hour_count: u64,
    pub record_count:    u64,
}

#[derive(Debug, Deserialize)]
struct DaySummaryPayload {
    #[serde(default)]
    date: Option<String>,
    total_vehicles: DayTotals,
    #[serde(default)]
    peak_hour: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    peak_hour_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    record_count: u64,
}

#[derive(Debug, Deserialize)]
struct DayTotals {
    #[serde(default, deserialize_with = "lenient_count")]
    cars: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    bikes: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    trucks: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    buses: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    autos: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    all: u64,
}

pub fn decode_day_summary(payload: &Value) -> Result<DaySummary, FeedError> {
    if !payload.is_object() {
        return Err(FeedError::Schema(format!(
            "expected a day summary object, got {}",
            kind_of(payload)
        )));
    }
    let parsed = DaySummaryPayload::deserialize(payload)
        .map_err(|e| FeedError::Schema(format!("day summary payload: {}", e)))?;
    let t = parsed.total_vehicles;
    Ok(DaySummary {
        date: parsed.date,
        counts: ClassCounts {
            car:   t.cars,
            bike:  t.bikes,
            truck: t.trucks,
            bus:   t.buses,
            auto:  t.autos,
        },
        total: t.all,
        peak_hour: parsed.peak_hour,
        peak_hour_count: parsed.peak_hour_count,
        record_count: parsed.record_count,
    })
}
