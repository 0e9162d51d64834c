//! Account records as listed by the identity provider.

use serde::{Deserialize, Serialize};

/// One account owned by the identity provider. Read-only for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Provider-assigned unique id.
    pub uid: String,
    /// Primary email. Phone-only or anonymous accounts have none.
    pub email: Option<String>,
    /// Free-form display name.
    pub display_name: Option<String>,
}

impl IdentityRecord {
    pub fn new(uid: impl Into<String>, email: Option<&str>, display_name: Option<&str>) -> Self {
        Self {
            uid: uid.into(),
            email: email.map(str::to_string),
            display_name: display_name.map(str::to_string),
        }
    }

    /// Rough heap footprint in bytes, used for memory accounting.
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.uid.len()
            + self.email.as_ref().map_or(0, String::len)
            + self.display_name.as_ref().map_or(0, String::len)
    }
}

/// A single page of accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountPage {
    pub accounts: Vec<IdentityRecord>,
    /// Cursor for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}
