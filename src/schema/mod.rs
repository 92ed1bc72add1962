//! Schema bootstrap for the key-value space
//!
//! Declares the space, its field format and its primary index on every start.
//! Every statement is create-if-not-exists, so running it against an already
//! provisioned engine is a no-op. A failure is fatal: nothing may be served
//! before the space exists.

mod bootstrap;
mod errors;
mod types;

pub use bootstrap::bootstrap;
pub use errors::{BootstrapError, BootstrapResult, BootstrapStep};
pub use types::{FieldDef, FieldType, IndexDef, IndexType, SpaceSchema};
