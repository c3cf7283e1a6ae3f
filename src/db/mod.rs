//! Database module for the status service.
//!
//! Append-only SQLite storage of raw probe observations.

mod models;
mod store;

pub use models::*;
pub use store::*;
