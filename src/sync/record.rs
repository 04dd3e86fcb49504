//! Generic remote record representation

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WalkSyncError;

/// Kind of record stored in the remote namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    GameState,
    DailyLog,
    TrackedWalk,
}

impl RecordType {
    /// Every synchronized type, in pull order
    pub const ALL: [RecordType; 3] = [
        RecordType::GameState,
        RecordType::DailyLog,
        RecordType::TrackedWalk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::GameState => "GameState",
            RecordType::DailyLog => "DailyLog",
            RecordType::TrackedWalk => "TrackedWalk",
        }
    }

    /// Prefix of remote record names for per-key types
    pub fn name_prefix(&self) -> &'static str {
        match self {
            RecordType::GameState => "game",
            RecordType::DailyLog => "daily",
            RecordType::TrackedWalk => "walk",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = WalkSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GameState" => Ok(RecordType::GameState),
            "DailyLog" => Ok(RecordType::DailyLog),
            "TrackedWalk" => Ok(RecordType::TrackedWalk),
            _ => Err(WalkSyncError::InvalidInput(format!(
                "unknown record type: {}",
                s
            ))),
        }
    }
}

/// A named, queryable field on a remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Text(String),
    Date(DateTime<Utc>),
}

/// Record as stored remotely: identity, opaque fields and a binary payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_type: RecordType,
    /// Deterministic name; repeated pushes of one entity overwrite the same slot
    pub record_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// Encoded entity
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    /// Set by the remote store on write
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn new(record_type: RecordType, record_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            record_type,
            record_name: record_name.into(),
            fields: BTreeMap::new(),
            payload,
            modified_at: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Opaque continuation token of a paginated query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RemoteRecord>,
    /// `None` once the query is exhausted
    pub cursor: Option<Cursor>,
}

impl Page {
    pub fn last(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            cursor: None,
        }
    }
}

mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_parse() {
        for record_type in RecordType::ALL {
            assert_eq!(record_type.as_str().parse::<RecordType>().unwrap(), record_type);
        }
        assert!("Workout".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_payload_is_base64_on_the_wire() {
        let record = RemoteRecord::new(RecordType::DailyLog, "daily_2026-10-19", vec![0, 1, 2, 255])
            .with_field("day", FieldValue::Text("2026-10-19".into()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["payload"], "AAEC/w==");

        let back: RemoteRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
