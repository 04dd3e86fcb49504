//! Cursor-driven reads of whole record types

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use super::record::{Cursor, RecordType, RemoteRecord};
use super::remote::RemoteStore;
use crate::error::{Result, WalkSyncError};

enum PageState {
    Start,
    Next(Cursor, usize),
    Done,
}

/// Reads every record of a type by following continuation cursors
pub struct PaginatedReader {
    remote: Arc<dyn RemoteStore>,
    max_pages: usize,
}

impl PaginatedReader {
    pub fn new(remote: Arc<dyn RemoteStore>, max_pages: usize) -> Self {
        Self {
            remote,
            max_pages: max_pages.max(1),
        }
    }

    /// Lazy sequence of pages. Restart by calling again; the stream ends after
    /// the first error.
    pub fn pages(
        &self,
        record_type: RecordType,
    ) -> impl Stream<Item = Result<Vec<RemoteRecord>>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        let max_pages = self.max_pages;

        stream::try_unfold(PageState::Start, move |state| {
            let remote = Arc::clone(&remote);
            async move {
                let (page, read) = match state {
                    PageState::Done => return Ok(None),
                    PageState::Start => (remote.query_all(record_type).await, 1),
                    PageState::Next(cursor, read) => {
                        if read >= max_pages {
                            return Err(WalkSyncError::Fetch {
                                record_type,
                                message: format!("gave up after {} pages", read),
                            });
                        }
                        (remote.fetch_page(&cursor).await, read + 1)
                    }
                };

                let page = page.map_err(|e| WalkSyncError::Fetch {
                    record_type,
                    message: e.to_string(),
                })?;
                debug!(%record_type, page = read, records = page.records.len(), "Fetched page");

                let next = match page.cursor {
                    Some(cursor) => PageState::Next(cursor, read),
                    None => PageState::Done,
                };
                Ok::<_, WalkSyncError>(Some((page.records, next)))
            }
        })
    }

    /// Fetch every record of a type, aggregated into one collection
    pub async fn fetch_all(&self, record_type: RecordType) -> Result<Vec<RemoteRecord>> {
        self.pages(record_type)
            .try_fold(Vec::new(), |mut all, page| async move {
                all.extend(page);
                Ok(all)
            })
            .await
    }
}
