//! Identity provider abstraction.
//!
//! The identity provider owns the authoritative set of accounts. The
//! reconciler only ever lists them, one page at a time.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use store_gateway::identity::IdentityProvider;
//! use store_gateway::models::AccountPage;
//! use store_gateway::StoreError;
//!
//! struct Empty;
//!
//! #[async_trait]
//! impl IdentityProvider for Empty {
//!     async fn list_accounts(
//!         &self,
//!         _page_size: usize,
//!         _page_token: Option<&str>,
//!     ) -> Result<AccountPage, StoreError> {
//!         Ok(AccountPage::default())
//!     }
//! }
//! ```

pub mod toolkit_rest;

use async_trait::async_trait;

use crate::{errors::StoreError, models::AccountPage};

/// Paged, read-only access to the identity provider's accounts.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns up to `page_size` accounts starting at `page_token`
    /// (`None` for the first page).
    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, StoreError>;
}
