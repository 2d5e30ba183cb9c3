use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuillErr>;

#[derive(Error, Debug)]
pub enum QuillErr {
    /// The transport is down; nothing may be sent until it reconnects.
    #[error("not connected to the chat server")]
    NotConnected,

    #[error("no model selected for this session")]
    NoModelSelected,

    /// The file inventory itself could not be consulted (as opposed to a
    /// single file failing to load, which is reported inline).
    #[error("session file inventory unavailable: {0}")]
    Inventory(String),

    #[error("failed to load {filename}: {message}")]
    Fetch { filename: String, message: String },

    #[error("no tool call is awaiting approval")]
    NoPendingApproval,

    #[error("tool call {0} does not allow editing its arguments")]
    EditNotAllowed(String),

    #[error("tool call {tool_call_id} has no argument named {name}")]
    UnknownArgument { tool_call_id: String, name: String },

    #[error("the agent has not asked a question")]
    NoPendingQuestion,

    #[error("agent mode is not available")]
    AgentModeUnavailable,

    #[error("outbound event channel closed")]
    ChannelClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}
