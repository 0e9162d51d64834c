use async_trait::async_trait;
use reqwest::Client;
use snafu::ResultExt;

use crate::{
    config::Credentials,
    errors::{DecodeSnafu, StoreError, StoreInitError, TransportSnafu},
    http::error_from_response,
    identity::{IdentityProvider, toolkit_rest::response::BatchGetResponse},
    models::{AccountPage, IdentityRecord},
};

const BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const OPERATION: &str = "accounts:batchGet";

pub struct ToolkitIdentityProvider {
    client: Client,
    base_url: String,
    project_id: String,
}

impl ToolkitIdentityProvider {
    /// Creates a provider authenticated with `credentials`.
    pub fn new(credentials: &Credentials) -> Result<Self, StoreInitError> {
        Ok(Self {
            client: credentials.authorized_client()?,
            base_url: BASE_URL.to_string(),
            project_id: credentials.project_id.clone(),
        })
    }

    /// Points the adapter at another endpoint (emulators, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/projects/{}/accounts:batchGet",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

#[async_trait]
impl IdentityProvider for ToolkitIdentityProvider {
    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, StoreError> {
        let mut query = vec![("maxResults", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("nextPageToken", token.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint())
            .query(&query)
            .send()
            .await
            .context(TransportSnafu {
                operation: OPERATION,
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(OPERATION, response).await);
        }

        let body = response.json::<BatchGetResponse>().await.map_err(|e| {
            DecodeSnafu {
                operation: OPERATION,
                message: e.to_string(),
            }
            .build()
        })?;

        // The API repeats the last token on an empty final page.
        let next_page_token = body
            .next_page_token
            .filter(|t| !t.is_empty() && !body.users.is_empty());

        Ok(AccountPage {
            accounts: body.users.into_iter().map(IdentityRecord::from).collect(),
            next_page_token,
        })
    }
}
