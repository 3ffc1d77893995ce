//! Database Layer
//!
//! Provides database connection management, models, and repositories.

mod database;
pub mod models;
pub mod repository;
pub mod retry;

pub use database::*;
pub use models::*;
pub use repository::*;
pub use retry::{DbRetryConfig, retry_db_anyhow, retry_db_operation};
