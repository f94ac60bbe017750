//! Security module for AutoLite: filesystem confinement.
//!
//! Every path a command receives from the model is resolved against the
//! agent workspace before any I/O happens. Paths that would land outside
//! the workspace are rejected.

pub mod path;

pub use path::{PathValidationError, relative_to_workspace, resolve_in_workspace};
