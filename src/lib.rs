//! Document search and update layer of the SMS platform
//!
//! Translates caller query descriptors into search engine queries, projects
//! highlighted hits back into records, and applies partial updates keyed by
//! message id. A key-value cache accessor ships alongside for the rest of the
//! platform.

pub mod cache;
pub mod config;
pub mod error;
pub mod search;
pub mod telemetry;

pub use error::{AppError, Result};
