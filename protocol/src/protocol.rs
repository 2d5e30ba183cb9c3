//! Events flowing over the transport. The transport itself (framing,
//! reconnects) is owned by the embedding application; this module only
//! describes the typed payloads.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use ts_rs::TS;

use crate::agent::AgentAnswer;
use crate::agent::AgentCompletedEvent;
use crate::agent::AgentQuestionEvent;
use crate::agent::AgentRunRequest;
use crate::agent::AgentStepEvent;
use crate::approvals::ToolApprovalRequest;
use crate::approvals::ToolApprovalResponse;

/// Event delivered by the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(tag = "type")]
pub enum InboundEvent {
    ToolApprovalRequested(ToolApprovalRequest),
    AgentStep(AgentStepEvent),
    AgentQuestion(AgentQuestionEvent),
    AgentCompleted(AgentCompletedEvent),
    ConnectionStatus(ConnectionStatusEvent),
    /// Any other chat traffic (assistant deltas, tool output, ...). Handed
    /// back to the embedding application untouched.
    Chat(ChatEvent),
}

/// Event sent by the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(tag = "type")]
pub enum OutboundEvent {
    ChatMessage(OutboundChatMessage),
    ToolApprovalResponse(ToolApprovalResponse),
    AgentAnswer(AgentAnswer),
    AgentStop,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusEvent {
    pub connected: bool,
    /// Model currently selected for the session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default)]
    pub payload: JsonValue,
}

/// A fully resolved user message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct OutboundChatMessage {
    pub text: String,
    /// Filename to content, or to a `[File not found: ..]` /
    /// `[Error loading file: ..]` placeholder.
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentRunRequest>,
}
