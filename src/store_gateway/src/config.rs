//! Credentials and HTTP client construction for the REST adapters.

use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var;
use snafu::ResultExt;

use crate::errors::{ClientBuildSnafu, InvalidTokenSnafu, MissingEnvVarSnafu, StoreInitError};

/// Environment variable naming the project both stores live in.
pub const PROJECT_ID_VAR: &str = "INTEGRITY_PROJECT_ID";
/// Environment variable holding a bearer access token for both APIs.
pub const ACCESS_TOKEN_VAR: &str = "INTEGRITY_ACCESS_TOKEN";

/// Project identifier plus the bearer token used by both REST adapters.
pub struct Credentials {
    /// Project / account identifier (e.g. `my-app-prod`).
    pub project_id: String,
    access_token: SecretString,
}

impl Credentials {
    pub fn new(project_id: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            project_id: project_id.into(),
            access_token,
        }
    }

    /// Reads [`PROJECT_ID_VAR`] and [`ACCESS_TOKEN_VAR`].
    pub fn from_env() -> Result<Self, StoreInitError> {
        let project_id = get_env_var(PROJECT_ID_VAR).context(MissingEnvVarSnafu)?;
        let token = get_env_var(ACCESS_TOKEN_VAR).context(MissingEnvVarSnafu)?;
        Ok(Self::new(project_id, SecretString::new(token.into())))
    }

    /// Builds a `reqwest` client that sends the bearer token on every request.
    pub fn authorized_client(&self) -> Result<Client, StoreInitError> {
        let mut bearer = header::HeaderValue::from_str(&format!(
            "Bearer {}",
            self.access_token.expose_secret()
        ))
        .context(InvalidTokenSnafu)?;
        bearer.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer);

        Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("access_token", &"[redacted]")
            .finish()
    }
}
