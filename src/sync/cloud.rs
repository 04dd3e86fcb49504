//! S3-compatible remote store (S3, R2, GCS interop)
//!
//! Layout under the configured prefix:
//! `<prefix>/<namespace>/.zone` marks a provisioned namespace and every record
//! lives at `<prefix>/<namespace>/<RecordType>/<record_name>.json`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use futures::future::join_all;
use tracing::warn;

use super::record::{Cursor, Page, RecordType, RemoteRecord};
use super::remote::RemoteStore;
use crate::error::{Result, WalkSyncError};

/// Keys requested per list call
const LIST_PAGE_SIZE: i32 = 200;

/// S3 limit for one DeleteObjects request
const DELETE_BATCH: usize = 1000;

const ZONE_MARKER: &str = ".zone";

/// Remote store backed by an S3 bucket
pub struct S3Remote {
    client: S3Client,
    bucket: String,
    prefix: String,
    namespace: String,
}

impl S3Remote {
    /// Create from S3-compatible URI (s3://bucket/optional/prefix)
    pub async fn from_uri(uri: &str, namespace: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| WalkSyncError::Config("URI must start with s3://".to_string()))?;

        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(WalkSyncError::Config(
                "URI must be s3://bucket[/prefix]".to_string(),
            ));
        }

        // Load AWS config from environment
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = S3Client::new(&config);

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            namespace: namespace.to_string(),
        })
    }

    fn namespace_prefix(&self) -> String {
        if self.prefix.is_empty() {
            format!("{}/", self.namespace)
        } else {
            format!("{}/{}/", self.prefix, self.namespace)
        }
    }

    fn type_prefix(&self, record_type: RecordType) -> String {
        format!("{}{}/", self.namespace_prefix(), record_type.as_str())
    }

    fn record_key(&self, record_type: RecordType, record_name: &str) -> String {
        format!("{}{}.json", self.type_prefix(record_type), record_name)
    }

    fn marker_key(&self) -> String {
        format!("{}{}", self.namespace_prefix(), ZONE_MARKER)
    }

    async fn zone_exists(&self) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.marker_key())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(WalkSyncError::Remote(service_error.to_string()))
                }
            }
        }
    }

    async fn put_record(&self, record: &RemoteRecord) -> Result<()> {
        let body = serde_json::to_vec(record)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.record_key(record.record_type, &record.record_name))
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| WalkSyncError::Remote(e.to_string()))?;
        Ok(())
    }

    async fn get_key(&self, key: &str) -> Result<RemoteRecord> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    WalkSyncError::RecordNotFound(key.to_string())
                } else {
                    WalkSyncError::Remote(service_error.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| WalkSyncError::Remote(e.to_string()))?
            .into_bytes();

        Ok(serde_json::from_slice(&data)?)
    }

    async fn list_page(&self, record_type: RecordType, token: Option<String>) -> Result<Page> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.type_prefix(record_type))
            .max_keys(LIST_PAGE_SIZE)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| WalkSyncError::Remote(e.to_string()))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter(|key| key.ends_with(".json"))
            .map(String::from)
            .collect();

        let mut records = Vec::with_capacity(keys.len());
        let fetched = join_all(keys.iter().map(|key| self.get_key(key))).await;
        for (key, result) in keys.iter().zip(fetched) {
            match result {
                Ok(record) => records.push(record),
                Err(WalkSyncError::Serialization(e)) => {
                    warn!(key = %key, error = %e, "Skipping unreadable record object");
                }
                Err(e) => return Err(e),
            }
        }

        let cursor = response
            .next_continuation_token()
            .map(|token| Cursor::new(format!("{}|{}", record_type.as_str(), token)));

        Ok(Page { records, cursor })
    }

    async fn list_all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.namespace_prefix())
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| WalkSyncError::Remote(e.to_string()))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(String::from)),
            );

            match response.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl RemoteStore for S3Remote {
    async fn ensure_namespace(&self) -> Result<()> {
        if self
            .zone_exists()
            .await
            .map_err(|e| WalkSyncError::Provisioning(e.to_string()))?
        {
            return Err(WalkSyncError::NamespaceExists(self.namespace.clone()));
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.marker_key())
            .body(ByteStream::from(Utc::now().to_rfc3339().into_bytes()))
            .send()
            .await
            .map_err(|e| WalkSyncError::Provisioning(e.to_string()))?;

        tracing::info!(
            "Provisioned namespace s3://{}/{}",
            self.bucket,
            self.namespace_prefix()
        );
        Ok(())
    }

    async fn write_batch(&self, records: Vec<RemoteRecord>, _atomic: bool) -> Result<()> {
        // S3 has no multi-object put; objects land independently
        let now = Utc::now();
        let records: Vec<RemoteRecord> = records
            .into_iter()
            .map(|mut record| {
                record.modified_at = Some(now);
                record
            })
            .collect();

        let results = join_all(records.iter().map(|record| self.put_record(record))).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|result| result.err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WalkSyncError::Remote(format!(
                "{} of {} puts failed: {}",
                failures.len(),
                records.len(),
                failures[0]
            )))
        }
    }

    async fn fetch_single(&self, record_type: RecordType, record_name: &str) -> Result<RemoteRecord> {
        let key = self.record_key(record_type, record_name);
        match self.get_key(&key).await {
            Err(WalkSyncError::RecordNotFound(_)) => {
                if self.zone_exists().await? {
                    Err(WalkSyncError::RecordNotFound(record_name.to_string()))
                } else {
                    Err(WalkSyncError::ZoneNotFound(self.namespace.clone()))
                }
            }
            other => other,
        }
    }

    async fn query_all(&self, record_type: RecordType) -> Result<Page> {
        if !self.zone_exists().await? {
            return Err(WalkSyncError::ZoneNotFound(self.namespace.clone()));
        }
        self.list_page(record_type, None).await
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page> {
        let (kind, token) = cursor.as_str().split_once('|').ok_or_else(|| {
            WalkSyncError::InvalidInput(format!("malformed cursor: {}", cursor.as_str()))
        })?;
        self.list_page(kind.parse()?, Some(token.to_string())).await
    }

    async fn delete_namespace(&self) -> Result<()> {
        let keys = self.list_all_keys().await?;

        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| WalkSyncError::Internal(e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| WalkSyncError::Internal(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| WalkSyncError::Remote(e.to_string()))?;
        }

        tracing::info!(
            "Deleted {} objects under s3://{}/{}",
            keys.len(),
            self.bucket,
            self.namespace_prefix()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.namespace_prefix())
    }
}
