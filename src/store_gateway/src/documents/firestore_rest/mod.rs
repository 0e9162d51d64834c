//! Firestore REST adapter (`runQuery` / `documents:commit`).

mod request;
pub mod store;
pub mod value;

pub use store::FirestoreRestStore;
