//! Schemaless documents and the paged query model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Field map of a document (JSON object semantics).
pub type Fields = serde_json::Map<String, Value>;

/// Key of the single-entry object that marks a typed timestamp in [`Fields`].
pub const TIMESTAMP_KEY: &str = "timestampValue";

/// A field value that backends write as a native timestamp.
///
/// Reads surface timestamps as RFC 3339 strings, so this marker only ever
/// appears in outgoing writes.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    json!({ TIMESTAMP_KEY: at.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// RFC 3339 text of a [`timestamp_value`] marker, or `None` for any other value.
pub fn as_timestamp(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(TIMESTAMP_KEY)?.as_str()
}

/// One record of a named collection.
///
/// The store does not enforce a schema; the reconciler reads typed views out
/// of `fields` and validates required keys itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a document from a JSON object literal; non-object values yield
    /// an empty field map.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self::new(id, fields)
    }

    /// String value of `name`, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Rough heap footprint in bytes, used for memory accounting.
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.id.len()
            + self
                .fields
                .iter()
                .map(|(k, v)| k.len() + value_size(v))
                .sum::<usize>()
    }
}

fn value_size(v: &Value) -> usize {
    let inner = match v {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(value_size).sum(),
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + value_size(v)).sum(),
        Value::Null | Value::Bool(_) | Value::Number(_) => 0,
    };
    std::mem::size_of::<Value>() + inner
}

/// Server-side predicate for [`QueryRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// `field` equals any of `values`
    In { field: String, values: Vec<Value> },
}

impl FieldFilter {
    /// `field in [values...]` over string values.
    pub fn any_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::In {
            field: field.into(),
            values: values
                .into_iter()
                .map(|s| Value::String(s.into()))
                .collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldFilter::In { field, .. } => field,
        }
    }

    /// Client-side evaluation with the same semantics the stores apply.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.fields.get(self.field()) else {
            return false;
        };
        match self {
            FieldFilter::In { values, .. } => values.contains(actual),
        }
    }
}

/// A range query over one collection, ordered by document id.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub collection: String,
    pub filter: Option<FieldFilter>,
    /// Exclusive lower bound on the document id (the previous page's cursor).
    pub start_after: Option<String>,
    /// Maximum number of documents returned.
    pub limit: usize,
}

/// A single page of query results.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    /// Id of the last returned document, to be fed back as `start_after`.
    pub last_cursor: Option<String>,
}
