//! Identifiers and bearer-session secrets owned by the opener context.

pub mod id;
pub mod session;

pub use id::*;
pub use session::*;
