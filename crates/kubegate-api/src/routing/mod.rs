//! Path utilities for workspace routing
//!
//! Single source of truth for the path manipulation used by the proxy
//! handler, the authorizer and the forwarder.

mod path;

pub use path::{namespace_from_path, single_joining_slash, workspace_context, WorkspaceContext};
