//! Database access for the migration hierarchy
//!
//! Tenant → Project → DataSource → Import → ImportRow, plus the job
//! bookkeeping and import map tables. Reads go through [`queries`],
//! writes go through the command dispatcher in [`crate::commands`].

pub mod init;
pub mod models;
pub mod queries;

pub use init::{init_database_pool, init_schema};
pub use models::*;
