use std::sync::Arc;

use quill_protocol::InboundEvent;
use quill_protocol::protocol::ChatEvent;
use quill_protocol::protocol::OutboundChatMessage;

use crate::agent::AgentCoordinator;
use crate::approval::ApprovalController;
use crate::config::Config;
use crate::error::Result;
use crate::features::Feature;
use crate::inventory::SessionInventory;
use crate::outbound::OutboundSender;
use crate::outbound::SessionStatusHandle;
use crate::submit::Draft;
use crate::submit::MessageSubmitter;

/// Owns the per-session engine state and routes transport events to it.
pub struct ChatSession {
    status: SessionStatusHandle,
    approvals: ApprovalController,
    agent: AgentCoordinator,
    submitter: MessageSubmitter,
    inventory: Arc<dyn SessionInventory>,
}

impl ChatSession {
    pub fn new(
        config: &Config,
        inventory: Arc<dyn SessionInventory>,
        outbound: OutboundSender,
    ) -> Self {
        let status = SessionStatusHandle::default();
        if let Some(model) = &config.model {
            status.set_model(Some(model.clone()));
        }
        let submitter = MessageSubmitter::new(
            Arc::clone(&inventory),
            status.clone(),
            outbound.clone(),
            config.features.enabled(Feature::FileReferences),
        );
        Self {
            approvals: ApprovalController::new(outbound.clone(), &config.features),
            agent: AgentCoordinator::new(outbound, &config.features, &config.agent),
            status,
            submitter,
            inventory,
        }
    }

    pub fn status(&self) -> &SessionStatusHandle {
        &self.status
    }

    pub fn inventory(&self) -> Arc<dyn SessionInventory> {
        Arc::clone(&self.inventory)
    }

    pub fn approvals(&self) -> &ApprovalController {
        &self.approvals
    }

    pub fn approvals_mut(&mut self) -> &mut ApprovalController {
        &mut self.approvals
    }

    pub fn agent(&self) -> &AgentCoordinator {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut AgentCoordinator {
        &mut self.agent
    }

    /// Apply `event` to the engine. Generic chat traffic is handed back to
    /// the caller.
    pub fn handle_event(&mut self, event: InboundEvent) -> Option<ChatEvent> {
        match event {
            InboundEvent::ToolApprovalRequested(request) => {
                self.approvals.on_request(request);
            }
            InboundEvent::AgentStep(step) => self.agent.on_step(step),
            InboundEvent::AgentQuestion(question) => self.agent.on_question(question),
            InboundEvent::AgentCompleted(done) => self.agent.on_completed(done),
            InboundEvent::ConnectionStatus(status) => {
                tracing::info!(
                    "connection status: connected={} model={:?}",
                    status.connected,
                    status.model
                );
                self.status.set_connected(status.connected);
                if status.model.is_some() {
                    self.status.set_model(status.model);
                }
            }
            InboundEvent::Chat(chat) => return Some(chat),
        }
        None
    }

    pub async fn submit(&mut self, draft: Draft) -> Result<OutboundChatMessage> {
        self.submitter.submit(draft, &mut self.agent).await
    }

    /// Stop the agent run and reject any tool call still awaiting a decision.
    pub fn stop_agent(&mut self) -> bool {
        let stopped = self.agent.stop();
        if stopped {
            self.approvals.interrupt();
        }
        stopped
    }
}
