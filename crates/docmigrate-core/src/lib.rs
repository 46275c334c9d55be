//! DocMigrate Core: error taxonomy, run configuration, document model.

pub mod config;
pub mod document;
pub mod error;

pub use config::RunConfig;
pub use document::{defined_value, is_defined, Fields, Value};
pub use error::{Error, Result};
