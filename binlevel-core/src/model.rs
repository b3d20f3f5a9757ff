//! Domain data structures for bins, raw readings, and recorded fill levels.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field of a raw bin value holding the ultrasonic distance.
pub const DISTANCE_FIELD: &str = "distance(cm)";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier of a physical bin, as used for the telemetry store's top-level keys.
pub struct BinId(pub String);

impl BinId {
    /// Construct an identifier from anything string-like.
    #[must_use]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for BinId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for BinId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Latest raw sensor value stored for a bin.
pub struct BinReading {
    /// Bin the reading belongs to.
    pub bin: BinId,
    /// Distance between sensor and trash surface, if the sensor reported one.
    pub distance_cm: Option<f64>,
}

impl BinReading {
    /// Build a reading from the raw JSON value stored under the bin's key.
    ///
    /// Only a finite JSON number counts as a distance; a null, absent, or
    /// non-numeric field leaves `distance_cm` empty.
    #[must_use]
    pub fn from_value(bin: BinId, value: &Value) -> Self {
        let distance_cm = value
            .get(DISTANCE_FIELD)
            .and_then(Value::as_f64)
            .filter(|distance| distance.is_finite());
        Self { bin, distance_cm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
/// Fill level of a bin in percent, always within `0..=100`.
pub struct TrashLevel(u8);

impl TrashLevel {
    /// An empty bin.
    pub const EMPTY: Self = Self(0);
    /// A full bin.
    pub const FULL: Self = Self(100);

    /// Construct a level, rejecting values above 100.
    #[must_use]
    pub fn new(percent: u8) -> Option<Self> {
        (percent <= Self::FULL.0).then_some(Self(percent))
    }

    /// The level in percent.
    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TrashLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}%", self.0)
    }
}

impl TryFrom<u8> for TrashLevel {
    type Error = String;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        Self::new(percent).ok_or_else(|| format!("trash level {percent} exceeds 100"))
    }
}

impl From<TrashLevel> for u8 {
    fn from(level: TrashLevel) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A computed level about to be appended to the record store.
pub struct NewTrashLevel {
    /// Bin the level was computed for.
    pub bin: BinId,
    /// Computed fill level.
    pub trash_level: TrashLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// An appended, immutable fill level record.
pub struct TrashLevelRecord {
    /// Bin the level was computed for.
    pub bin: BinId,
    /// Computed fill level.
    pub trash_level: TrashLevel,
    /// Timestamp assigned by the record store at write time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reading_takes_numeric_distance() {
        let reading = BinReading::from_value(BinId::from("bin1"), &json!({ "distance(cm)": 10 }));
        assert_eq!(reading.distance_cm, Some(10.0));
    }

    #[test]
    fn reading_without_usable_distance_is_empty() {
        for value in [
            json!({ "distance(cm)": null }),
            json!({}),
            json!({ "distance(cm)": "12" }),
            json!(null),
            json!(42),
        ] {
            let reading = BinReading::from_value(BinId::from("bin"), &value);
            assert_eq!(reading.distance_cm, None, "value {value} should not yield a distance");
        }
    }

    #[test]
    fn trash_level_rejects_values_above_full() {
        assert_eq!(TrashLevel::new(100), Some(TrashLevel::FULL));
        assert_eq!(TrashLevel::new(101), None);
        assert!(serde_json::from_str::<TrashLevel>("101").is_err());
    }

    #[test]
    fn record_serializes_with_store_field_names() {
        let record = NewTrashLevel {
            bin: BinId::from("bin1"),
            trash_level: TrashLevel::FULL,
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value, json!({ "bin": "bin1", "trashLevel": 100 }));
    }
}
