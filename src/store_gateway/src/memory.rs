//! In-memory stores for tests and rehearsal runs.
//!
//! Both stores keep call counters and accept scripted failures
//! (`fail_next_*`), so callers can exercise retry and isolation paths without
//! a network. [`InMemoryDocumentStore`] also records every committed batch.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    documents::DocumentStore,
    errors::{ErrorCode, StoreError},
    identity::IdentityProvider,
    models::{
        AccountPage, Document, DocumentPage, Fields, IdentityRecord, QueryRequest, WriteOp,
        as_timestamp,
    },
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Field values as a backend would return them on the next read: timestamp
/// markers become their RFC 3339 text.
fn stored(fields: &Fields) -> impl Iterator<Item = (String, Value)> + '_ {
    fields.iter().map(|(k, v)| {
        let value = match as_timestamp(v) {
            Some(text) => Value::String(text.to_string()),
            None => v.clone(),
        };
        (k.clone(), value)
    })
}

/// Queue of scripted failures consumed one per call.
#[derive(Default)]
struct FaultScript(Mutex<VecDeque<ErrorCode>>);

impl FaultScript {
    fn push(&self, code: ErrorCode, times: usize) {
        lock(&self.0).extend(std::iter::repeat_n(code, times));
    }

    fn take(&self, operation: &str) -> Result<(), StoreError> {
        match lock(&self.0).pop_front() {
            Some(code) => Err(StoreError::remote(operation, code, "scripted failure")),
            None => Ok(()),
        }
    }
}

/// Identity provider backed by a vector of accounts, paged in insertion order.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: Mutex<Vec<IdentityRecord>>,
    faults: FaultScript,
    calls: AtomicUsize,
}

impl InMemoryIdentityProvider {
    pub fn new(accounts: impl IntoIterator<Item = IdentityRecord>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn push(&self, account: IdentityRecord) {
        lock(&self.accounts).push(account);
    }

    /// The next `times` calls fail with `code`.
    pub fn fail_next(&self, code: ErrorCode, times: usize) {
        self.faults.push(code, times);
    }

    /// Number of `list_accounts` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.faults.take("listAccounts")?;

        let start = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                StoreError::remote(
                    "listAccounts",
                    ErrorCode::InvalidArgument,
                    format!("bad page token {token:?}"),
                )
            })?,
            None => 0,
        };

        let accounts = lock(&self.accounts);
        let end = (start + page_size.max(1)).min(accounts.len());
        let page = accounts.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < accounts.len()).then(|| end.to_string());

        Ok(AccountPage {
            accounts: page,
            next_page_token,
        })
    }
}

/// Document store backed by ordered maps, one per collection.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Fields>>>,
    query_faults: FaultScript,
    commit_faults: FaultScript,
    queries: AtomicUsize,
    commits: Mutex<Vec<Vec<WriteOp>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, doc: Document) {
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.fields);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        lock(&self.collections)
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone()))
    }

    /// All documents of `collection`, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        lock(&self.collections)
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, f)| Document::new(id.clone(), f.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The next `times` queries fail with `code`.
    pub fn fail_next_query(&self, code: ErrorCode, times: usize) {
        self.query_faults.push(code, times);
    }

    /// The next `times` batch commits fail with `code`.
    pub fn fail_next_commit(&self, code: ErrorCode, times: usize) {
        self.commit_faults.push(code, times);
    }

    /// Number of `query` calls so far, failed ones included.
    pub fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Every successfully committed batch, in commit order.
    pub fn committed_batches(&self) -> Vec<Vec<WriteOp>> {
        lock(&self.commits).clone()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(&self, request: &QueryRequest) -> Result<DocumentPage, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.query_faults.take("runQuery")?;

        let collections = lock(&self.collections);
        let Some(coll) = collections.get(&request.collection) else {
            return Ok(DocumentPage::default());
        };

        let documents: Vec<Document> = coll
            .iter()
            .filter(|(id, _)| {
                request
                    .start_after
                    .as_deref()
                    .is_none_or(|cursor| id.as_str() > cursor)
            })
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|doc| request.filter.as_ref().is_none_or(|f| f.matches(doc)))
            .take(request.limit)
            .collect();
        let last_cursor = documents.last().map(|d| d.id.clone());

        Ok(DocumentPage {
            documents,
            last_cursor,
        })
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        self.commit_faults.take("commit")?;

        let mut collections = lock(&self.collections);

        // Validate the whole batch before touching anything.
        for op in ops {
            let exists = collections
                .get(op.collection())
                .is_some_and(|c| c.contains_key(op.id()));
            match op {
                WriteOp::Create { .. } if exists => {
                    return Err(StoreError::remote(
                        "commit",
                        ErrorCode::AlreadyExists,
                        format!("{}/{} already exists", op.collection(), op.id()),
                    ));
                }
                WriteOp::Update { .. } if !exists => {
                    return Err(StoreError::remote(
                        "commit",
                        ErrorCode::NotFound,
                        format!("{}/{} not found", op.collection(), op.id()),
                    ));
                }
                _ => {}
            }
        }

        for op in ops {
            match op {
                WriteOp::Create {
                    collection,
                    id,
                    fields,
                } => {
                    collections
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), stored(fields).collect());
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    if let Some(existing) = collections
                        .get_mut(collection)
                        .and_then(|c| c.get_mut(id))
                    {
                        existing.extend(stored(fields));
                    }
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(c) = collections.get_mut(collection) {
                        c.remove(id);
                    }
                }
            }
        }

        lock(&self.commits).push(ops.to_vec());
        Ok(())
    }
}
