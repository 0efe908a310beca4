//! Destination store abstraction.
//!
//! Everything that conversion reads from or publishes to lives behind the
//! [`StorageBackend`] trait: the assets' own source tree, sibling files they
//! import, and the compiled output. Paths are always relative to the
//! backend's root and validated with [`validate_path`] before use.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::{Entry, FileInfo};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
