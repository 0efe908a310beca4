//! Staged asset conversion against a destination store.
//!
//! Source assets (Sass, Less, TypeScript, ...) and their compiled outputs
//! both live in a [`StorageBackend`](kiln_storage::StorageBackend) that may
//! well be remote. [`AssetConverter::convert()`] decides whether an output is
//! stale, stages the asset's base directory on the local filesystem, runs the
//! converter registered for the asset's extension, publishes the result back
//! to the store and records a short-lived freshness marker in a
//! [`Cache`](kiln_cache::Cache).
//!
//! The pieces are usable on their own:
//! - [`needs_recompile`]: the freshness decision.
//! - [`Staging`]: a mirrored scratch directory that cleans up after itself.
//! - [`Registry`]: extension to converter mapping built from configuration.
//! - [`BaseLocks`]: per-base-path mutual exclusion.

mod converter;
mod decision;
mod dispatch;
pub mod error;
mod fallback;
mod locks;
mod staging;
mod target;

pub use crate::converter::{AssetConverter, Converted, Settings};
pub use crate::decision::needs_recompile;
pub use crate::dispatch::{CommandTemplate, Converter, CopyTransform, Registry, RegistryBuilder, Rule, Transform};
pub use crate::fallback::{Fallback, PassThrough};
pub use crate::locks::BaseLocks;
pub use crate::staging::Staging;
pub use crate::target::{Target, extension};
pub use kiln_config::PublishPolicy;
