//! Remote store abstraction
//!
//! A remote store holds one namespace per user. Records are addressed by
//! `(record_type, record_name)` and overwritten by identity on write.

use async_trait::async_trait;

use super::record::{Cursor, Page, RecordType, RemoteRecord};
use crate::error::{Result, WalkSyncError};

/// The remote side of the sync engine
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the namespace. May fail with `NamespaceExists` if it already exists.
    async fn ensure_namespace(&self) -> Result<()>;

    /// Write records, overwriting by identity. With `atomic = false` the store may
    /// apply part of the batch before failing.
    async fn write_batch(&self, records: Vec<RemoteRecord>, atomic: bool) -> Result<()>;

    /// Fetch one record. Absence is reported as `RecordNotFound` or `ZoneNotFound`.
    async fn fetch_single(&self, record_type: RecordType, record_name: &str) -> Result<RemoteRecord>;

    /// First page of all records of a type
    async fn query_all(&self, record_type: RecordType) -> Result<Page>;

    /// Continue a query from a cursor
    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page>;

    /// Drop the namespace and everything in it
    async fn delete_namespace(&self) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Encode a cursor as `<type>:<offset>` for stores that paginate by position
pub(crate) fn offset_cursor(record_type: RecordType, offset: usize) -> Cursor {
    Cursor::new(format!("{}:{}", record_type.as_str(), offset))
}

/// Inverse of [`offset_cursor`]
pub(crate) fn parse_offset_cursor(cursor: &Cursor) -> Result<(RecordType, usize)> {
    let (kind, offset) = cursor.as_str().split_once(':').ok_or_else(|| {
        WalkSyncError::InvalidInput(format!("malformed cursor: {}", cursor.as_str()))
    })?;
    let offset = offset.parse::<usize>().map_err(|_| {
        WalkSyncError::InvalidInput(format!("malformed cursor: {}", cursor.as_str()))
    })?;
    Ok((kind.parse()?, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_cursor_parse() {
        let cursor = offset_cursor(RecordType::DailyLog, 250);
        assert_eq!(cursor.as_str(), "DailyLog:250");
        assert_eq!(
            parse_offset_cursor(&cursor).unwrap(),
            (RecordType::DailyLog, 250)
        );
        assert!(parse_offset_cursor(&Cursor::new("garbage")).is_err());
        assert!(parse_offset_cursor(&Cursor::new("DailyLog:x")).is_err());
    }
}
