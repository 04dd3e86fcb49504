//! Conversion between local entities and remote records

use tracing::warn;

use super::record::{FieldValue, RecordType, RemoteRecord};
use crate::error::{Result, WalkSyncError};
use crate::types::{parse_day_key, DailyLog, Entity, GameState, TrackedWalk, GAME_STATE_KEY};

/// Version stamped on every payload
pub const PAYLOAD_VERSION: i64 = 1;

/// Entity that knows its remote identity and queryable fields
pub trait SyncEntity: Entity {
    /// Deterministic remote name
    fn record_name(&self) -> Result<String>;

    /// Extra named fields stored next to the payload
    fn remote_fields(&self) -> Vec<(&'static str, FieldValue)> {
        Vec::new()
    }
}

impl SyncEntity for GameState {
    fn record_name(&self) -> Result<String> {
        Ok(GAME_STATE_KEY.to_string())
    }

    fn remote_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            (
                "longest_streak",
                FieldValue::Int(i64::from(self.streak.longest_streak)),
            ),
            (
                "onboarded",
                FieldValue::Bool(self.profile.has_completed_onboarding),
            ),
        ]
    }
}

impl SyncEntity for DailyLog {
    fn record_name(&self) -> Result<String> {
        parse_day_key(&self.day)?;
        Ok(format!("{}_{}", RecordType::DailyLog.name_prefix(), self.day))
    }

    fn remote_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("day", FieldValue::Text(self.day.clone())),
            ("steps", FieldValue::Int(i64::from(self.steps))),
        ]
    }
}

impl SyncEntity for TrackedWalk {
    fn record_name(&self) -> Result<String> {
        parse_day_key(&self.day)?;
        Ok(format!("{}_{}", RecordType::TrackedWalk.name_prefix(), self.id))
    }

    fn remote_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("day", FieldValue::Text(self.day.clone())),
            ("started_at", FieldValue::Date(self.started_at)),
        ]
    }
}

/// Bidirectional entity <-> record conversion
pub struct RecordMapper;

impl RecordMapper {
    /// Encode one entity
    pub fn to_remote<T: SyncEntity>(entity: &T) -> Result<RemoteRecord> {
        let name = entity
            .record_name()
            .map_err(|e| WalkSyncError::Encoding(format!("{} {}: {}", T::RECORD_TYPE, entity.key(), e)))?;
        let payload = serde_json::to_vec(entity)
            .map_err(|e| WalkSyncError::Encoding(format!("{} {}: {}", T::RECORD_TYPE, name, e)))?;

        let mut record = RemoteRecord::new(T::RECORD_TYPE, name, payload)
            .with_field("payload_version", FieldValue::Int(PAYLOAD_VERSION));
        for (field, value) in entity.remote_fields() {
            record = record.with_field(field, value);
        }
        Ok(record)
    }

    /// Decode one record; `None` if it is not a `T` or the payload is unreadable
    pub fn from_remote<T: SyncEntity>(record: &RemoteRecord) -> Option<T> {
        if record.record_type != T::RECORD_TYPE {
            warn!(
                expected = %T::RECORD_TYPE,
                actual = %record.record_type,
                name = %record.record_name,
                "Skipping record of unexpected type"
            );
            return None;
        }
        let entity: T = match serde_json::from_slice(&record.payload) {
            Ok(entity) => entity,
            Err(e) => {
                warn!(name = %record.record_name, error = %e, "Skipping undecodable record");
                return None;
            }
        };

        // The payload must name itself the same way the record does
        match entity.record_name() {
            Ok(name) if name == record.record_name => Some(entity),
            Ok(name) => {
                warn!(
                    name = %record.record_name,
                    payload_name = %name,
                    "Skipping record whose payload belongs to another key"
                );
                None
            }
            Err(e) => {
                warn!(name = %record.record_name, error = %e, "Skipping record with invalid key");
                None
            }
        }
    }

    /// Encode many entities, skipping the ones that fail
    pub fn to_remote_all<T: SyncEntity>(entities: &[T]) -> (Vec<RemoteRecord>, usize) {
        let mut records = Vec::with_capacity(entities.len());
        let mut skipped = 0;
        for entity in entities {
            match Self::to_remote(entity) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(error = %e, "Skipping record that failed to encode");
                    skipped += 1;
                }
            }
        }
        (records, skipped)
    }

    /// Decode many records, skipping the ones that fail
    pub fn from_remote_all<T: SyncEntity>(records: &[RemoteRecord]) -> Vec<T> {
        records.iter().filter_map(Self::from_remote).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn walk(day: &str) -> TrackedWalk {
        TrackedWalk {
            id: Uuid::new_v4(),
            day: day.to_string(),
            started_at: Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap(),
            ended_at: Utc.with_ymd_and_hms(2026, 10, 19, 7, 45, 0).unwrap(),
            steps: 5200,
            distance_meters: 3900.0,
            active_calories: 210.5,
        }
    }

    #[test]
    fn test_deterministic_names() {
        let state = GameState::default();
        assert_eq!(RecordMapper::to_remote(&state).unwrap().record_name, "game_state");

        let log = DailyLog::new("2026-10-19");
        assert_eq!(
            RecordMapper::to_remote(&log).unwrap().record_name,
            "daily_2026-10-19"
        );

        let w = walk("2026-10-19");
        let record = RecordMapper::to_remote(&w).unwrap();
        assert_eq!(record.record_name, format!("walk_{}", w.id));
        assert_eq!(record.record_type, RecordType::TrackedWalk);
    }

    #[test]
    fn test_decode_restores_entity() {
        let mut log = DailyLog::new("2026-10-19");
        log.steps = 8123;
        log.goal_met = true;
        let record = RecordMapper::to_remote(&log).unwrap();
        assert_eq!(record.field("steps"), Some(&FieldValue::Int(8123)));

        let decoded: DailyLog = RecordMapper::from_remote(&record).unwrap();
        assert_eq!(decoded, log);
    }

    #[test]
    fn test_bad_identity_is_skipped_not_fatal() {
        let logs = vec![
            DailyLog::new("2026-10-18"),
            DailyLog::new("yesterday"),
            DailyLog::new("2026-10-19"),
        ];
        let (records, skipped) = RecordMapper::to_remote_all(&logs);
        assert_eq!(records.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_corrupt_payload_decodes_to_none() {
        let record = RemoteRecord::new(RecordType::DailyLog, "daily_2026-10-19", b"{not json".to_vec());
        assert!(RecordMapper::from_remote::<DailyLog>(&record).is_none());
    }

    #[test]
    fn test_mislabeled_payload_is_skipped() {
        let mut record = RecordMapper::to_remote(&DailyLog::new("2026-10-19")).unwrap();
        record.record_name = "daily_2026-10-18".to_string();
        assert!(RecordMapper::from_remote::<DailyLog>(&record).is_none());

        let w = walk("2026-10-19");
        let mut record = RecordMapper::to_remote(&w).unwrap();
        record.record_name = format!("walk_{}", Uuid::new_v4());
        assert!(RecordMapper::from_remote::<TrackedWalk>(&record).is_none());
    }

    #[test]
    fn test_invalid_day_in_payload_is_skipped() {
        let payload = serde_json::to_vec(&DailyLog::new("19/10/2026")).unwrap();
        let record = RemoteRecord::new(RecordType::DailyLog, "daily_19/10/2026", payload);
        assert!(RecordMapper::from_remote::<DailyLog>(&record).is_none());
    }

    #[test]
    fn test_wrong_type_decodes_to_none() {
        let record = RecordMapper::to_remote(&DailyLog::new("2026-10-19")).unwrap();
        assert!(RecordMapper::from_remote::<TrackedWalk>(&record).is_none());
    }
}
