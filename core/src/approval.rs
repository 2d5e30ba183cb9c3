//! Tool-call approval state machine.
//!
//! One request is displayed at a time. The user approves (optionally after
//! editing arguments) or rejects it, and exactly one
//! [`ToolApprovalResponse`] is emitted per request.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use quill_protocol::OutboundEvent;
use quill_protocol::approvals::ToolApprovalRequest;
use quill_protocol::approvals::ToolApprovalResponse;
use serde_json::Value as JsonValue;

use crate::error::QuillErr;
use crate::error::Result;
use crate::features::Feature;
use crate::features::Features;
use crate::outbound::OutboundSender;

/// Reason attached when a displayed request is dropped because the agent run
/// was stopped.
pub const RUN_CANCELLED_REASON: &str = "Run cancelled by user";

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalState {
    Idle,
    AwaitingDecision(PendingApproval),
}

/// The request on screen plus any argument edits made so far.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    request: ToolApprovalRequest,
    /// `None` until edit mode is entered. Holds raw edited text per argument.
    edits: Option<BTreeMap<String, String>>,
}

impl PendingApproval {
    fn new(request: ToolApprovalRequest) -> Self {
        Self {
            request,
            edits: None,
        }
    }

    pub fn request(&self) -> &ToolApprovalRequest {
        &self.request
    }

    pub fn is_editing(&self) -> bool {
        self.edits.is_some()
    }

    /// Text shown in the editor for `name`: the pending edit if there is one,
    /// otherwise the original value.
    pub fn argument_text(&self, name: &str) -> Option<String> {
        if let Some(edits) = &self.edits
            && let Some(text) = edits.get(name)
        {
            return Some(text.clone());
        }
        self.request.arguments.get(name).map(display_value)
    }

    fn final_arguments(&self) -> BTreeMap<String, JsonValue> {
        let mut arguments = self.request.arguments.clone();
        if let Some(edits) = &self.edits {
            for (name, text) in edits {
                arguments.insert(name.clone(), parse_edited_value(text));
            }
        }
        arguments
    }
}

/// How many answered tool call ids are remembered to drop redeliveries.
const RESOLVED_HISTORY: usize = 256;

/// Answered tool call ids, oldest evicted first once the cap is reached.
#[derive(Debug)]
struct ResolvedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ResolvedIds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct ApprovalController {
    state: ApprovalState,
    resolved: ResolvedIds,
    outbound: OutboundSender,
    edits_enabled: bool,
}

impl ApprovalController {
    pub fn new(outbound: OutboundSender, features: &Features) -> Self {
        Self {
            state: ApprovalState::Idle,
            resolved: ResolvedIds::with_capacity(RESOLVED_HISTORY),
            outbound,
            edits_enabled: features.enabled(Feature::ApprovalEdits),
        }
    }

    pub fn state(&self) -> &ApprovalState {
        &self.state
    }

    pub fn pending(&self) -> Option<&ToolApprovalRequest> {
        match &self.state {
            ApprovalState::Idle => None,
            ApprovalState::AwaitingDecision(pending) => Some(pending.request()),
        }
    }

    /// Show `request`. Returns `false` if it was ignored because its id has
    /// already been answered.
    pub fn on_request(&mut self, request: ToolApprovalRequest) -> bool {
        if self.resolved.contains(&request.tool_call_id) {
            tracing::debug!(
                "ignoring approval request for already answered tool call {}",
                request.tool_call_id
            );
            return false;
        }
        if let ApprovalState::AwaitingDecision(current) = &self.state {
            tracing::warn!(
                "approval request {} replaced unanswered request {}",
                request.tool_call_id,
                current.request.tool_call_id
            );
        }
        self.state = ApprovalState::AwaitingDecision(PendingApproval::new(request));
        true
    }

    /// Whether the edit control should be offered for the displayed request.
    pub fn can_edit(&self) -> bool {
        self.edits_enabled && self.pending().is_some_and(|r| r.allow_edit)
    }

    pub fn enter_edit_mode(&mut self) -> Result<()> {
        let can_edit = self.can_edit();
        let ApprovalState::AwaitingDecision(pending) = &mut self.state else {
            return Err(QuillErr::NoPendingApproval);
        };
        if !can_edit {
            return Err(QuillErr::EditNotAllowed(pending.request.tool_call_id.clone()));
        }
        pending.edits.get_or_insert_with(BTreeMap::new);
        Ok(())
    }

    /// Replace the text of argument `name`. Requires edit mode.
    pub fn edit_argument(&mut self, name: &str, text: impl Into<String>) -> Result<()> {
        let ApprovalState::AwaitingDecision(pending) = &mut self.state else {
            return Err(QuillErr::NoPendingApproval);
        };
        if !pending.request.arguments.contains_key(name) {
            return Err(QuillErr::UnknownArgument {
                tool_call_id: pending.request.tool_call_id.clone(),
                name: name.to_string(),
            });
        }
        let Some(edits) = pending.edits.as_mut() else {
            return Err(QuillErr::EditNotAllowed(pending.request.tool_call_id.clone()));
        };
        edits.insert(name.to_string(), text.into());
        Ok(())
    }

    pub fn approve(&mut self) -> Result<ToolApprovalResponse> {
        let pending = self.take_pending()?;
        let response = ToolApprovalResponse::approved(
            pending.request.tool_call_id.clone(),
            pending.final_arguments(),
        );
        self.emit(response.clone());
        Ok(response)
    }

    pub fn reject(&mut self, reason: Option<String>) -> Result<ToolApprovalResponse> {
        let pending = self.take_pending()?;
        let response = ToolApprovalResponse::rejected(pending.request.tool_call_id, reason);
        self.emit(response.clone());
        Ok(response)
    }

    /// Reject whatever is displayed because the surrounding run was stopped.
    pub fn interrupt(&mut self) -> Option<ToolApprovalResponse> {
        if self.pending().is_none() {
            return None;
        }
        self.reject(Some(RUN_CANCELLED_REASON.to_string())).ok()
    }

    fn take_pending(&mut self) -> Result<PendingApproval> {
        match std::mem::replace(&mut self.state, ApprovalState::Idle) {
            ApprovalState::AwaitingDecision(pending) => Ok(pending),
            ApprovalState::Idle => Err(QuillErr::NoPendingApproval),
        }
    }

    fn emit(&mut self, response: ToolApprovalResponse) {
        tracing::debug!(
            "tool call {} {}",
            response.tool_call_id,
            if response.approved { "approved" } else { "rejected" }
        );
        self.resolved.insert(response.tool_call_id.clone());
        self.outbound.send(OutboundEvent::ToolApprovalResponse(response));
    }
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Edited text that looks like a complete JSON object or array is parsed;
/// anything else, including unparsable structures, stays a string.
pub fn parse_edited_value(text: &str) -> JsonValue {
    let trimmed = text.trim();
    let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_structured && let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return value;
    }
    JsonValue::String(text.to_string())
}
