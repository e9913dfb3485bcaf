//! Built-in action implementations.
//!
//! Each action is a self-contained module. To add an action, implement the
//! Action trait in a new file here and register it in
//! `create_default_registry()` in ../lib.rs.

pub mod expand;
pub mod filter_kg;
pub mod filter_results;
pub mod message;
pub mod overlay;
pub mod query_graph;
pub mod rank;
pub mod resultify;
