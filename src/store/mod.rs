//! Persistence layer — libSQL-backed storage for contacts, the FAQ
//! mirror, and scheduled steps.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{FaqEntry, NewContact, Store};
