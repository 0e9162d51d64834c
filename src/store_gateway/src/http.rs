//! Response handling shared by the Google REST adapters.

use reqwest::Response;
use serde::Deserialize;

use crate::errors::{ErrorCode, StoreError};

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Turns a non-success response into a classified [`StoreError`].
///
/// The status name in the envelope wins over the HTTP status when we know it.
pub(crate) async fn error_from_response(operation: &str, response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown API error".to_string());
    classify_error_body(operation, status, &body)
}

fn classify_error_body(operation: &str, status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .status
                .as_deref()
                .and_then(ErrorCode::from_status_name)
                .unwrap_or_else(|| ErrorCode::from_http_status(status));
            StoreError::remote(operation, code, envelope.error.message)
        }
        Err(_) => StoreError::remote(operation, ErrorCode::from_http_status(status), body),
    }
}
