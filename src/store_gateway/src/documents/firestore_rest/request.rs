//! Request bodies for `runQuery` and `documents:commit`.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::documents::firestore_rest::value::{decode_fields, encode_fields, to_firestore};
use crate::models::{Document, FieldFilter, QueryRequest, WriteOp};

/// Builds the `structuredQuery` body for one page.
///
/// `documents_root` is `projects/{p}/databases/(default)/documents`; the cursor
/// is expressed as a document reference since we order by `__name__`.
pub(crate) fn run_query_body(documents_root: &str, request: &QueryRequest) -> Value {
    let mut query = Map::new();
    query.insert(
        "from".into(),
        json!([{ "collectionId": request.collection }]),
    );
    if let Some(filter) = &request.filter {
        query.insert("where".into(), filter_body(filter));
    }
    query.insert(
        "orderBy".into(),
        json!([{ "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" }]),
    );
    if let Some(cursor) = &request.start_after {
        query.insert(
            "startAt".into(),
            json!({
                "values": [{ "referenceValue": document_name(documents_root, &request.collection, cursor) }],
                "before": false
            }),
        );
    }
    query.insert("limit".into(), json!(request.limit));

    json!({ "structuredQuery": Value::Object(query) })
}

fn filter_body(filter: &FieldFilter) -> Value {
    let (op, value) = match filter {
        FieldFilter::In { values, .. } => (
            "IN",
            json!({ "arrayValue": { "values": values.iter().map(to_firestore).collect::<Vec<_>>() } }),
        ),
    };
    json!({
        "fieldFilter": {
            "field": { "fieldPath": field_path(filter.field()) },
            "op": op,
            "value": value
        }
    })
}

/// Builds the `writes` body for one atomic commit.
pub(crate) fn commit_body(documents_root: &str, ops: &[WriteOp]) -> Value {
    let writes: Vec<Value> = ops
        .iter()
        .map(|op| match op {
            WriteOp::Create {
                collection,
                id,
                fields,
            } => json!({
                "update": {
                    "name": document_name(documents_root, collection, id),
                    "fields": encode_fields(fields)
                },
                "currentDocument": { "exists": false }
            }),
            WriteOp::Update {
                collection,
                id,
                fields,
            } => json!({
                "update": {
                    "name": document_name(documents_root, collection, id),
                    "fields": encode_fields(fields)
                },
                "updateMask": {
                    "fieldPaths": fields.keys().map(|k| field_path(k)).collect::<Vec<_>>()
                },
                "currentDocument": { "exists": true }
            }),
            WriteOp::Delete { collection, id } => json!({
                "delete": document_name(documents_root, collection, id)
            }),
        })
        .collect();

    json!({ "writes": writes })
}

pub(crate) fn document_name(documents_root: &str, collection: &str, id: &str) -> String {
    format!("{documents_root}/{collection}/{id}")
}

/// Quotes a field name with backticks unless it is a simple identifier.
fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// One element of the streamed `runQuery` response array.
#[derive(Deserialize, Debug)]
pub(crate) struct RunQueryItem {
    pub document: Option<RawDocument>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    /// The id is the last path segment of the resource name.
    pub fn into_document(self) -> Document {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or(self.name.as_str())
            .to_string();
        Document::new(id, decode_fields(&self.fields))
    }
}
