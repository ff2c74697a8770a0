//! partwise-postgres
//!
//! PostgreSQL implementations of the partwise catalog and statement executor.

#![warn(missing_docs)]

mod catalog;
mod connection;
mod error;
mod executor;

pub use catalog::PgCatalog;
pub use connection::ConnectionConfig;
pub use executor::PgExecutor;
