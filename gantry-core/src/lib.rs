//! # Gantry Core Library
//!
//! Migration engine core for bulk association/member data:
//! - Hierarchical entity store (tenant → project → data source → import → row)
//! - Row value codec (typed heterogeneous field values)
//! - Import batch paging engine
//! - Command/event dispatch layer
//! - Job bookkeeping records
//!
//! Hosting applications (UI, job scheduler, CLI) integrate exclusively
//! through the query functions in [`db::queries`], the paging engine in
//! [`paging`], and the command dispatcher in [`commands`].

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod paging;
pub mod value;

pub use error::{Error, Result};
pub use value::FieldValue;
