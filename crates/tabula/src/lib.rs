//! Postgres lifecycle helpers for test and dev databases.
//!
//! This crate provides:
//! - [`ensure_database_exists`]: create a database if it isn't there yet
//! - [`apply_schema`]: bring a database up to a declarative schema via an
//!   external migration tool (Atlas by default)
//! - [`reset_database`]: restart every sequence and empty every table,
//!   without knowing the foreign-key graph up front
//!
//! # Example
//!
//! ```ignore
//! tabula::ensure_database_exists(&url).await?;
//! tabula::apply_schema(&url, &dev_url, &tabula::SyncOptions::default()).await?;
//!
//! let client = tabula::connect(&url).await?;
//! // ... run a test ...
//! tabula::reset_database(&client).await?;
//! ```

mod db_url;
mod ensure;
mod error;
mod ident;
pub mod reset;
mod sync;
mod traced;

pub use db_url::{DatabaseUrl, mask_password};
pub use ensure::ensure_database_exists;
pub use error::Error;
pub use ident::{Ident, qualified, quote_ident};
pub use reset::{MAX_ROUNDS, ResetReport, reset_database};
pub use sync::{SyncOptions, apply_schema, run_migration_tool};
pub use traced::{Connection, ConnectionExt, TracedConn, connect};

/// Result type for tabula operations.
pub type Result<T> = std::result::Result<T, Error>;
