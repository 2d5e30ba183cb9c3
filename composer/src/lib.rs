//! Input-side state of the chat box: the draft, the `/tool` and `@file`
//! triggers, and the autocomplete popups they open.

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod chat_composer;
pub mod popup;
pub mod trigger;

pub use chat_composer::ChatComposer;
pub use chat_composer::ComposerState;
pub use chat_composer::InputResult;
pub use popup::Autocomplete;
pub use popup::Candidate;
pub use popup::TextSplice;
pub use trigger::TriggerContext;
