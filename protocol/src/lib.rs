//! Typed events and records exchanged between the chat composer engine and
//! its collaborators (session store, transport, file inventory).
//!
//! Everything here is plain data. Field names are camelCase on the wire and
//! event enums are internally tagged with a snake_case `type` field.

pub mod agent;
pub mod approvals;
pub mod descriptors;
pub mod protocol;

pub use protocol::InboundEvent;
pub use protocol::OutboundEvent;
