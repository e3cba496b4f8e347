//! Vehicle-count samples and their wire decoding.
//!
//! A [`Sample`] is one classification reading for one camera at one instant.
//! Feeds deliver them as JSON records; decoding is lenient about missing or
//! null numeric fields and unparseable timestamps, strict about anything that
//! is not a list.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::feed::FeedError;
use crate::window::Granularity;

/// Label rendered for samples whose timestamp could not be parsed.
pub const PLACEHOLDER_LABEL: &str = "--:--:--";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// ─── Vehicle classes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Bike,
    Truck,
    Bus,
    Auto,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 5] = [
        VehicleClass::Car,
        VehicleClass::Bike,
        VehicleClass::Truck,
        VehicleClass::Bus,
        VehicleClass::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Bike => "bike",
            VehicleClass::Truck => "truck",
            VehicleClass::Bus => "bus",
            VehicleClass::Auto => "auto",
        }
    }
}

/// Per-class vehicle counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub car: u64,
    pub bike: u64,
    pub truck: u64,
    pub bus: u64,
    pub auto: u64,
}

impl ClassCounts {
    pub fn get(&self, class: VehicleClass) -> u64 {
        match class {
            VehicleClass::Car => self.car,
            VehicleClass::Bike => self.bike,
            VehicleClass::Truck => self.truck,
            VehicleClass::Bus => self.bus,
            VehicleClass::Auto => self.auto,
        }
    }

    pub fn get_mut(&mut self, class: VehicleClass) -> &mut u64 {
        match class {
            VehicleClass::Car => &mut self.car,
            VehicleClass::Bike => &mut self.bike,
            VehicleClass::Truck => &mut self.truck,
            VehicleClass::Bus => &mut self.bus,
            VehicleClass::Auto => &mut self.auto,
        }
    }

    /// Adds `other` class by class, saturating at `u64::MAX`.
    pub fn add(&mut self, other: &ClassCounts) {
        for class in VehicleClass::ALL {
            let slot = self.get_mut(class);
            *slot = slot.saturating_add(other.get(class));
        }
    }

    pub fn sum(&self) -> u64 {
        VehicleClass::ALL
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(self.get(*c)))
    }
}

// ─── Timestamps and identity ─────────────────────────────────────────────────

/// A sample's timestamp as received.
///
/// Parseable timestamps become instants; anything else keeps its raw text so
/// the sample still has a stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampleTime {
    At(DateTime<Utc>),
    Undated(String),
}

impl SampleTime {
    /// Accepts RFC 3339 and naive ISO-8601 (read as UTC).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
            return SampleTime::At(t.with_timezone(&Utc));
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return SampleTime::At(naive.and_utc());
            }
        }
        SampleTime::Undated(raw.to_string())
    }

    fn from_wire(value: &Value) -> Self {
        match value {
            Value::String(s) => SampleTime::parse(s),
            Value::Null => SampleTime::Undated(String::new()),
            other => SampleTime::Undated(other.to_string()),
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            SampleTime::At(t) => Some(*t),
            SampleTime::Undated(_) => None,
        }
    }

    /// Ordering rank: undated samples rank equal to each other and before
    /// every dated sample.
    pub fn sort_rank(&self) -> Option<DateTime<Utc>> {
        self.instant()
    }
}

/// Deduplication key: two samples with equal keys are the same observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub timestamp: SampleTime,
    pub source_id: String,
}

// ─── Sample ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    timestamp: SampleTime,
    source_id: String,
    counts: ClassCounts,
    total: u64,
}

impl Sample {
    pub fn new(
        timestamp: SampleTime,
        source_id: impl Into<String>,
        counts: ClassCounts,
        total: u64,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            counts,
            total,
        }
    }

    pub fn timestamp(&self) -> &SampleTime {
        &self.timestamp
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn counts(&self) -> &ClassCounts {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            timestamp: self.timestamp.clone(),
            source_id: self.source_id.clone(),
        }
    }

    pub fn has_identity(&self, key: &IdentityKey) -> bool {
        self.timestamp == key.timestamp && self.source_id == key.source_id
    }

    /// Chart label for this sample at the given granularity.
    pub fn label(&self, granularity: Granularity) -> String {
        match self.timestamp.instant() {
            Some(t) => t.format(granularity.label_format()).to_string(),
            None => PLACEHOLDER_LABEL.to_string(),
        }
    }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SampleRecord {
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    camera_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    car: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    bike: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    truck: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    bus: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    auto: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    total: u64,
}

impl From<SampleRecord> for Sample {
    fn from(record: SampleRecord) -> Self {
        Sample {
            timestamp: SampleTime::from_wire(&record.timestamp),
            source_id: record.camera_id.unwrap_or_default(),
            counts: ClassCounts {
                car: record.car,
                bike: record.bike,
                truck: record.truck,
                bus: record.bus,
                auto: record.auto,
            },
            total: record.total,
        }
    }
}

/// Count fields: null or missing is zero, whole non-negative floats are
/// accepted (aggregating sources sometimes emit `12.0`). Any other value
/// (negative, fractional, non-numeric) is logged and read as zero so the
/// rest of the record still applies.
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let count = match &raw {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Some(_) => None,
    };
    Ok(count.unwrap_or_else(|| {
        if let Some(value) = &raw {
            warn!(%value, "invalid count, reading as zero");
        }
        0
    }))
}

/// Decode a list-typed feed payload, keeping source order.
///
/// A payload that is not a list is a schema violation. Individual elements
/// that fail to decode are skipped.
pub fn decode_samples(payload: &Value) -> Result<Vec<Sample>, FeedError> {
    let items = payload.as_array().ok_or_else(|| {
        FeedError::Schema(format!("expected a list of samples, got {}", kind_of(payload)))
    })?;

    let mut samples = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match SampleRecord::deserialize(item) {
            Ok(record) => samples.push(Sample::from(record)),
            Err(e) => warn!(index, error = %e, "skipping malformed sample record"),
        }
    }
    Ok(samples)
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_record() {
        let payload = json!([{
            "timestamp": "2024-05-01T12:00:03.250000",
            "camera_id": "cam-1",
            "car": 4, "bike": 1, "truck": 0, "bus": 2, "auto": 3, "total": 10
        }]);
        let samples = decode_samples(&payload).unwrap();
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.source_id(), "cam-1");
        assert_eq!(s.counts().get(VehicleClass::Auto), 3);
        assert_eq!(s.total(), 10);
        assert_eq!(s.label(Granularity::Second), "12:00:03");
    }

    #[test]
    fn test_missing_and_null_counts_default_to_zero() {
        let payload = json!([{ "timestamp": "2024-05-01T12:00:00", "camera_id": "c", "car": null, "bus": 7.0 }]);
        let s = &decode_samples(&payload).unwrap()[0];
        assert_eq!(s.counts().car, 0);
        assert_eq!(s.counts().bus, 7);
        assert_eq!(s.counts().bike, 0);
        assert_eq!(s.total(), 0);
    }

    #[test]
    fn test_non_list_payload_is_schema_error() {
        let err = decode_samples(&json!({"detail": "Database error"})).unwrap_err();
        assert!(matches!(err, FeedError::Schema(_)));
    }

    #[test]
    fn test_malformed_element_is_skipped() {
        let payload = json!([
            "garbage",
            { "timestamp": "2024-05-01T12:00:01", "camera_id": "c", "car": 2 }
        ]);
        let samples = decode_samples(&payload).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].counts().car, 2);
    }

    #[test]
    fn test_bad_count_field_reads_as_zero_and_keeps_record() {
        let payload = json!([
            { "timestamp": "2024-05-01T12:00:02", "camera_id": "c", "car": -3, "bike": 4 },
            { "timestamp": "2024-05-01T12:00:01", "camera_id": "c", "car": "many", "bus": 7.5, "truck": 2 }
        ]);
        let samples = decode_samples(&payload).unwrap();
        assert_eq!(samples.len(), 2);
        // still first in source order, so still the newest reading
        assert_eq!(samples[0].counts().car, 0);
        assert_eq!(samples[0].counts().bike, 4);
        assert_eq!(samples[1].counts().car, 0);
        assert_eq!(samples[1].counts().bus, 0);
        assert_eq!(samples[1].counts().truck, 2);
    }

    #[test]
    fn test_timestamp_forms() {
        let rfc = SampleTime::parse("2024-05-01T12:00:00+02:00");
        let naive = SampleTime::parse("2024-05-01 10:00:00");
        assert_eq!(rfc, naive);
        assert!(matches!(SampleTime::parse("yesterday-ish"), SampleTime::Undated(_)));
    }

    #[test]
    fn test_undated_sample_gets_placeholder_label() {
        let payload = json!([{ "timestamp": "not a time", "camera_id": "c", "car": 1 }]);
        let s = &decode_samples(&payload).unwrap()[0];
        assert_eq!(s.label(Granularity::Hour), PLACEHOLDER_LABEL);
        assert_eq!(s.counts().car, 1);
    }

    #[test]
    fn test_class_counts_add_and_sum() {
        let mut a = ClassCounts { car: 1, bike: 2, ..Default::default() };
        a.add(&ClassCounts { car: 3, bus: 4, ..Default::default() });
        assert_eq!(a.car, 4);
        assert_eq!(a.bus, 4);
        assert_eq!(a.sum(), 10);
    }
}
