//! StructWatch Storage - Database access for owners, structures, alerts and queues
//!
//! Every repository is a trait with a PostgreSQL implementation (`Db*`) and
//! an implementation on [`MemoryStore`] used by tests and local runs.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
