//! Typed views over user, provider-profile and call documents.

use std::fmt;

use serde::{Deserialize, Serialize};
use store_gateway::models::Document;

/// Fields every user document must carry.
pub const USER_REQUIRED_FIELDS: &[&str] = &["email", "role", "firstName", "lastName", "createdAt"];
/// Fields every provider profile must carry.
pub const PROFILE_REQUIRED_FIELDS: &[&str] = &["uid", "type", "fullName", "rating", "price"];
/// Fields every call must carry.
pub const CALL_REQUIRED_FIELDS: &[&str] = &["clientId", "providerId", "serviceType", "status", "price"];

/// Placeholder used when a name cannot be derived.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Role of a user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Books calls.
    Client,
    /// Provider offering legal calls.
    Lawyer,
    /// Provider offering expat-help calls.
    Expat,
}

impl Role {
    /// Lenient parse: trims and ignores case. Unknown roles yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "lawyer" => Some(Role::Lawyer),
            "expat" => Some(Role::Expat),
            _ => None,
        }
    }

    /// Profile type a user with this role must have, if any.
    pub fn provider_kind(self) -> Option<ProviderKind> {
        match self {
            Role::Client => None,
            Role::Lawyer => Some(ProviderKind::Lawyer),
            Role::Expat => Some(ProviderKind::Expat),
        }
    }

    /// Lowercase name as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Lawyer => "lawyer",
            Role::Expat => "expat",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `type` of a provider profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Lawyer profile.
    Lawyer,
    /// Expat-helper profile.
    Expat,
}

impl ProviderKind {
    /// Role values that make a user a provider.
    pub const ROLE_VALUES: [&'static str; 2] = ["lawyer", "expat"];

    /// Lowercase name as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Lawyer => "lawyer",
            ProviderKind::Expat => "expat",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed `role` field of a user document.
pub fn role_of(doc: &Document) -> Option<Role> {
    doc.str_field("role").and_then(Role::parse)
}

/// The owning uid of a provider profile: its `uid` field, else its id.
pub fn profile_owner(doc: &Document) -> &str {
    doc.str_field("uid")
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .unwrap_or(doc.id.as_str())
}

/// Splits a display name into `(first, last)`.
///
/// First token is the first name, the remaining tokens joined by a single
/// space are the last name. Either side defaults to [`UNKNOWN_NAME`].
pub fn split_display_name(display_name: Option<&str>) -> (String, String) {
    let mut tokens = display_name.unwrap_or_default().split_whitespace();
    let first = tokens.next().unwrap_or(UNKNOWN_NAME).to_string();
    let rest = tokens.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() {
        UNKNOWN_NAME.to_string()
    } else {
        rest
    };
    (first, last)
}
