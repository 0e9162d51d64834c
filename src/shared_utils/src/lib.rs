//! Small helpers shared by the reconciler crates.

pub mod env;
