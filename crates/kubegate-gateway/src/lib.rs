//! Kubegate gateway process
//!
//! Wires the workspace proxy to its read model: a hot-reloaded catalog file
//! for signups, spaces, bindings, member clusters and plugin configs, and
//! per-member Route reflectors for plugin targets.

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod routes;

pub use catalog::{Catalog, CatalogError};
pub use config::Cli;
pub use routes::{member_client, RouteCache, RouteError};
