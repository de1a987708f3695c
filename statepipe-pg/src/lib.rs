//! Statepipe PG - PostgreSQL State Repository
//!
//! Implements [`statepipe_storage::StateRepository`] for the states table on
//! a `deadpool-postgres` pool. Table and column names come from
//! configuration and are validated before they reach SQL text.

pub mod config;
pub mod error;
pub mod repository;
pub mod sql;

pub use config::{DbConfig, Identifier, TableLayout};
pub use error::PgError;
pub use repository::{ColumnInfo, PgStateRepository};
