use async_trait::async_trait;
use reqwest::Client;
use snafu::ResultExt;

use crate::{
    config::Credentials,
    documents::{
        DocumentStore,
        firestore_rest::request::{RunQueryItem, commit_body, run_query_body},
    },
    errors::{DecodeSnafu, StoreError, StoreInitError, TransportSnafu},
    http::error_from_response,
    models::{DocumentPage, QueryRequest, WriteOp},
};

const BASE_URL: &str = "https://firestore.googleapis.com/v1";

pub struct FirestoreRestStore {
    client: Client,
    base_url: String,
    documents_root: String,
}

impl FirestoreRestStore {
    /// Creates a store client for the `(default)` database of the project.
    pub fn new(credentials: &Credentials) -> Result<Self, StoreInitError> {
        Ok(Self {
            client: credentials.authorized_client()?,
            base_url: BASE_URL.to_string(),
            documents_root: format!(
                "projects/{}/databases/(default)/documents",
                credentials.project_id
            ),
        })
    }

    /// Points the adapter at another endpoint (emulators, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.base_url.trim_end_matches('/'),
            self.documents_root,
            method
        )
    }

    async fn post(
        &self,
        operation: &'static str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, StoreError> {
        let response = self
            .client
            .post(self.url(operation))
            .json(body)
            .send()
            .await
            .context(TransportSnafu { operation })?;

        if !response.status().is_success() {
            return Err(error_from_response(operation, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for FirestoreRestStore {
    async fn query(&self, request: &QueryRequest) -> Result<DocumentPage, StoreError> {
        let body = run_query_body(&self.documents_root, request);
        let response = self.post("runQuery", &body).await?;

        let items = response.json::<Vec<RunQueryItem>>().await.map_err(|e| {
            DecodeSnafu {
                operation: "runQuery",
                message: e.to_string(),
            }
            .build()
        })?;

        // Items without a document only carry progress metadata (readTime, skippedResults).
        let documents: Vec<_> = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|raw| raw.into_document())
            .collect();
        let last_cursor = documents.last().map(|d| d.id.clone());

        Ok(DocumentPage {
            documents,
            last_cursor,
        })
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let body = commit_body(&self.documents_root, ops);
        self.post("commit", &body).await?;
        tracing::debug!(writes = ops.len(), "committed batch");
        Ok(())
    }
}
