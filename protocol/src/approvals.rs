use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use ts_rs::TS;

/// Reason sent when the user rejects a tool call without saying why.
pub const DEFAULT_REJECTION_REASON: &str = "User rejected the tool call";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalRequest {
    /// Server-assigned identifier correlating this request with its response.
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, JsonValue>,
    /// Whether the user may edit the arguments before approving.
    #[serde(default)]
    pub allow_edit: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalResponse {
    pub tool_call_id: String,
    pub approved: bool,
    /// Arguments the tool should run with. Only set on approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<BTreeMap<String, JsonValue>>,
    /// Only set on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolApprovalResponse {
    pub fn approved(tool_call_id: String, arguments: BTreeMap<String, JsonValue>) -> Self {
        Self {
            tool_call_id,
            approved: true,
            arguments: Some(arguments),
            reason: None,
        }
    }

    pub fn rejected(tool_call_id: String, reason: Option<String>) -> Self {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
        Self {
            tool_call_id,
            approved: false,
            arguments: None,
            reason: Some(reason),
        }
    }
}
