//! Shared-directory remote store
//!
//! Each namespace is a directory, each record a JSON file at
//! `<root>/<namespace>/<RecordType>/<record_name>.json`. Pointing two devices
//! at one synced folder (or two local databases at one path) gives them a
//! common remote without any service.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::record::{Cursor, Page, RecordType, RemoteRecord};
use super::remote::{offset_cursor, parse_offset_cursor, RemoteStore};
use crate::error::{Result, WalkSyncError};

/// Records returned per page
pub const DIR_PAGE_SIZE: usize = 200;

/// Remote store on the local filesystem
pub struct DirRemote {
    root: PathBuf,
    namespace: String,
    page_size: usize,
}

impl DirRemote {
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
            page_size: DIR_PAGE_SIZE,
        }
    }

    /// Create from a `dir:///path/to/root` URI
    pub fn from_uri(uri: &str, namespace: &str) -> Result<Self> {
        let path = uri
            .strip_prefix("dir://")
            .ok_or_else(|| WalkSyncError::Config("URI must start with dir://".to_string()))?;
        if path.is_empty() {
            return Err(WalkSyncError::Config(
                "URI must be dir:///path/to/folder".to_string(),
            ));
        }
        Ok(Self::new(shellexpand::tilde(path).to_string(), namespace))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn namespace_dir(&self) -> PathBuf {
        self.root.join(&self.namespace)
    }

    fn type_dir(&self, record_type: RecordType) -> PathBuf {
        self.namespace_dir().join(record_type.as_str())
    }

    fn record_path(&self, record_type: RecordType, record_name: &str) -> Result<PathBuf> {
        if record_name.is_empty()
            || record_name.contains(['/', '\\'])
            || record_name.starts_with('.')
        {
            return Err(WalkSyncError::InvalidInput(format!(
                "record name not usable as a file name: {}",
                record_name
            )));
        }
        Ok(self
            .type_dir(record_type)
            .join(format!("{}.json", record_name)))
    }

    async fn require_namespace(&self) -> Result<()> {
        match tokio::fs::metadata(self.namespace_dir()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(WalkSyncError::ZoneNotFound(self.namespace.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(WalkSyncError::ZoneNotFound(self.namespace.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &RemoteRecord) -> Result<()> {
        let path = self.record_path(record.record_type, &record.record_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(record)?;

        // Write then rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn list_names(&self, record_type: RecordType) -> Result<Vec<String>> {
        let dir = self.type_dir(record_type);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_record(path: &Path) -> Result<RemoteRecord> {
        let body = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn page_from(&self, record_type: RecordType, offset: usize) -> Result<Page> {
        self.require_namespace().await?;
        let names = self.list_names(record_type).await?;

        let mut records = Vec::new();
        for name in names.iter().skip(offset).take(self.page_size) {
            let path = self.record_path(record_type, name)?;
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(WalkSyncError::Serialization(e)) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record file");
                }
                Err(e) => {
                    return Err(WalkSyncError::Remote(format!(
                        "unreadable record {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        let next = (offset + self.page_size).min(names.len());
        let cursor = (next < names.len()).then(|| offset_cursor(record_type, next));
        Ok(Page { records, cursor })
    }
}

#[async_trait]
impl RemoteStore for DirRemote {
    async fn ensure_namespace(&self) -> Result<()> {
        let dir = self.namespace_dir();
        if tokio::fs::metadata(&dir).await.is_ok() {
            return Err(WalkSyncError::NamespaceExists(self.namespace.clone()));
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WalkSyncError::Provisioning(format!("{}: {}", dir.display(), e)))?;
        Ok(())
    }

    async fn write_batch(&self, records: Vec<RemoteRecord>, _atomic: bool) -> Result<()> {
        self.require_namespace().await?;
        let now = Utc::now();
        for mut record in records {
            record.modified_at = Some(now);
            self.write_record(&record).await?;
        }
        Ok(())
    }

    async fn fetch_single(&self, record_type: RecordType, record_name: &str) -> Result<RemoteRecord> {
        self.require_namespace().await?;
        let path = self.record_path(record_type, record_name)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(serde_json::from_slice(&body)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(WalkSyncError::RecordNotFound(record_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_all(&self, record_type: RecordType) -> Result<Page> {
        self.page_from(record_type, 0).await
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page> {
        let (record_type, offset) = parse_offset_cursor(cursor)?;
        self.page_from(record_type, offset).await
    }

    async fn delete_namespace(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(self.namespace_dir()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("dir://{}/{}", self.root.display(), self.namespace)
    }
}
