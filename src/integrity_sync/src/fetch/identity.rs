use indexmap::IndexMap;
use store_gateway::models::IdentityRecord;
use tracing::debug;

use super::{Fetched, PageFetcher};
use crate::{error::ReconcileError, retry::timed};

impl PageFetcher {
    /// Every account of the identity provider, keyed by uid in listing order.
    ///
    /// Ends when the provider returns no next-page token.
    pub async fn fetch_identities(&self) -> Result<Fetched<IdentityRecord>, ReconcileError> {
        let mut records = IndexMap::new();
        let mut resident = self.metrics.track_resident();
        let mut token: Option<String> = None;
        let page_size = self.settings.identity_page_size;

        loop {
            self.ensure_live()?;

            let page = self
                .retry
                .execute("listAccounts", || {
                    timed(
                        &self.metrics,
                        self.identity.list_accounts(page_size, token.as_deref()),
                    )
                })
                .await?;

            for account in page.accounts {
                resident.grow(account.estimated_size());
                records.insert(account.uid.clone(), account);
            }
            debug!(fetched = records.len(), "identity page");

            match page.next_page_token {
                Some(next) => {
                    token = Some(next);
                    self.throttle("identities").await?;
                }
                None => break,
            }
        }

        Ok(Fetched {
            records,
            _resident: resident,
        })
    }
}
