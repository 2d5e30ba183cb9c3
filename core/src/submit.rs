use std::collections::BTreeMap;
use std::sync::Arc;

use quill_protocol::OutboundEvent;
use quill_protocol::protocol::OutboundChatMessage;

use crate::agent::AgentCoordinator;
use crate::error::QuillErr;
use crate::error::Result;
use crate::file_refs::resolve_file_references;
use crate::inventory::SessionInventory;
use crate::outbound::OutboundSender;
use crate::outbound::SessionStatusHandle;

/// What the user is about to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    /// Files attached by hand, filename to content.
    pub uploads: BTreeMap<String, String>,
}

impl Draft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            uploads: BTreeMap::new(),
        }
    }

    pub fn with_upload(mut self, filename: impl Into<String>, content: impl Into<String>) -> Self {
        self.uploads.insert(filename.into(), content.into());
        self
    }
}

/// Turns drafts into outbound chat messages.
pub struct MessageSubmitter {
    inventory: Arc<dyn SessionInventory>,
    status: SessionStatusHandle,
    outbound: OutboundSender,
    resolve_references: bool,
}

impl MessageSubmitter {
    pub fn new(
        inventory: Arc<dyn SessionInventory>,
        status: SessionStatusHandle,
        outbound: OutboundSender,
        resolve_references: bool,
    ) -> Self {
        Self {
            inventory,
            status,
            outbound,
            resolve_references,
        }
    }

    /// Resolve `@file` mentions, attach uploads and the agent run request,
    /// and send the message. Nothing is composed or sent unless the session
    /// is connected with a model selected.
    pub async fn submit(
        &self,
        draft: Draft,
        agent: &mut AgentCoordinator,
    ) -> Result<OutboundChatMessage> {
        let status = self.status.get();
        if !status.connected {
            return Err(QuillErr::NotConnected);
        }
        let Some(model) = status.model.filter(|m| !m.is_empty()) else {
            return Err(QuillErr::NoModelSelected);
        };

        let Draft { text, uploads } = draft;
        let mut attachments = if self.resolve_references {
            match resolve_file_references(&text, self.inventory.as_ref()).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::warn!("sending without file references: {err}");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        // Manual uploads win over a reference to the same filename.
        attachments.extend(uploads);

        let run = agent.run_request();
        let message = OutboundChatMessage {
            text,
            attachments,
            model: Some(model),
            agent: run,
        };
        if !self
            .outbound
            .send(OutboundEvent::ChatMessage(message.clone()))
        {
            return Err(QuillErr::ChannelClosed);
        }
        if run.is_some() {
            agent.begin_run();
        }
        Ok(message)
    }
}
