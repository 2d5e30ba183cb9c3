//! Root of the `quill-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the embedding application or the
// tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent;
pub mod approval;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod features;
pub mod file_refs;
pub mod inventory;
mod outbound;
pub use outbound::OutboundSender;
pub use outbound::SessionStatus;
pub use outbound::SessionStatusHandle;
mod session;
pub use session::ChatSession;
mod submit;
pub use submit::Draft;
pub use submit::MessageSubmitter;

pub use quill_protocol as protocol;
