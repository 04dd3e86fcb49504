//! Local persistence for walksync
//!
//! The sync engine only depends on the [`LocalStore`] trait; [`Storage`] is the
//! SQLite implementation used by the CLI and tests.

mod connection;
mod local;
mod migrations;

pub use connection::Storage;
pub use local::LocalStore;
pub use migrations::SCHEMA_VERSION;
