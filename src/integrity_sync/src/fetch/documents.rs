use indexmap::IndexMap;
use store_gateway::models::{Document, FieldFilter, QueryRequest};
use tracing::debug;

use super::{Fetched, PageFetcher};
use crate::{error::ReconcileError, retry::timed};

impl PageFetcher {
    /// Every document of `collection` matching `filter`, keyed by id in
    /// cursor order.
    ///
    /// The filter is sent with the query and re-checked on each returned
    /// document. Ends when a page is empty or shorter than the page size.
    pub async fn fetch_collection(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> Result<Fetched<Document>, ReconcileError> {
        let mut records = IndexMap::new();
        let mut resident = self.metrics.track_resident();
        let mut request = QueryRequest {
            collection: collection.to_string(),
            filter,
            start_after: None,
            limit: self.settings.document_page_size,
        };

        loop {
            self.ensure_live()?;

            let page = self
                .retry
                .execute("runQuery", || {
                    timed(&self.metrics, self.documents.query(&request))
                })
                .await?;

            let returned = page.documents.len();
            for doc in page.documents {
                if request.filter.as_ref().is_some_and(|f| !f.matches(&doc)) {
                    continue;
                }
                resident.grow(doc.estimated_size());
                records.insert(doc.id.clone(), doc);
            }
            debug!(collection, fetched = records.len(), "document page");

            if returned < request.limit {
                break;
            }
            match page.last_cursor {
                Some(cursor) => request.start_after = Some(cursor),
                None => break,
            }
            self.throttle(collection).await?;
        }

        Ok(Fetched {
            records,
            _resident: resident,
        })
    }
}
