use quill_protocol::OutboundEvent;
use quill_protocol::agent::AgentAnswer;
use quill_protocol::agent::AgentCompletedEvent;
use quill_protocol::agent::AgentQuestionEvent;
use quill_protocol::agent::AgentRunRequest;
use quill_protocol::agent::AgentStepEvent;

use crate::config::AgentConfig;
use crate::config::clamp_max_steps;
use crate::error::QuillErr;
use crate::error::Result;
use crate::features::Feature;
use crate::features::Features;
use crate::outbound::OutboundSender;

/// Snapshot of the agent controls and the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRunState {
    pub enabled: bool,
    pub max_steps: u32,
    pub current_step: u32,
    pub pending_question: Option<String>,
    pub running: bool,
    /// Description attached to the latest step event.
    pub step_description: Option<String>,
    /// Step budget the server reported for the current run, if any.
    pub reported_max_steps: Option<u32>,
    /// Error reported when the last run completed, if any.
    pub last_error: Option<String>,
}

/// Tracks a multi-step agent run driven by server events.
pub struct AgentCoordinator {
    available: bool,
    state: AgentRunState,
    outbound: OutboundSender,
}

impl AgentCoordinator {
    pub fn new(outbound: OutboundSender, features: &Features, config: &AgentConfig) -> Self {
        let available = features.enabled(Feature::AgentMode);
        Self {
            available,
            state: AgentRunState {
                enabled: available && config.enabled,
                max_steps: clamp_max_steps(config.max_steps),
                current_step: 0,
                pending_question: None,
                running: false,
                step_description: None,
                reported_max_steps: None,
                last_error: None,
            },
            outbound,
        }
    }

    /// Whether agent controls should be rendered at all.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn state(&self) -> &AgentRunState {
        &self.state
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.available {
            return Err(QuillErr::AgentModeUnavailable);
        }
        self.state.enabled = enabled;
        Ok(())
    }

    /// Returns the value actually stored after clamping.
    pub fn set_max_steps(&mut self, max_steps: u32) -> u32 {
        self.state.max_steps = clamp_max_steps(max_steps);
        self.state.max_steps
    }

    /// What to attach to an outbound message, if agent mode is on.
    pub fn run_request(&self) -> Option<AgentRunRequest> {
        self.state.enabled.then_some(AgentRunRequest {
            max_steps: self.state.max_steps,
        })
    }

    /// Called when a message carrying an agent run request was sent.
    pub fn begin_run(&mut self) {
        if !self.state.enabled {
            return;
        }
        tracing::debug!("agent run started with max_steps={}", self.state.max_steps);
        self.state.running = true;
        self.state.current_step = 0;
        self.state.pending_question = None;
        self.state.step_description = None;
        self.state.reported_max_steps = None;
        self.state.last_error = None;
    }

    pub fn on_step(&mut self, event: AgentStepEvent) {
        if !self.state.running {
            tracing::debug!("ignoring agent step {} outside of a run", event.step);
            return;
        }
        if event.step > self.state.current_step {
            self.state.current_step = event.step;
        }
        if let Some(reported) = event.max_steps
            && self.state.reported_max_steps != Some(reported)
        {
            if reported != self.state.max_steps {
                tracing::warn!(
                    "server reports max_steps={reported}, requested {}",
                    self.state.max_steps
                );
            }
            self.state.reported_max_steps = Some(reported);
        }
        if event.description.is_some() {
            self.state.step_description = event.description;
        }
    }

    pub fn on_question(&mut self, event: AgentQuestionEvent) {
        if !self.state.running {
            tracing::warn!("ignoring agent question outside of a run");
            return;
        }
        self.state.pending_question = Some(event.question);
    }

    /// Send `answer` to the agent and clear the pending question.
    pub fn answer(&mut self, answer: impl Into<String>) -> Result<()> {
        if self.state.pending_question.take().is_none() {
            return Err(QuillErr::NoPendingQuestion);
        }
        self.outbound.send(OutboundEvent::AgentAnswer(AgentAnswer {
            answer: answer.into(),
        }));
        Ok(())
    }

    /// Ask the server to stop the run. Does not wait for confirmation: the
    /// run is presented as inactive immediately and later step events are
    /// ignored. Returns `false` if no run was active.
    pub fn stop(&mut self) -> bool {
        if !self.state.running {
            return false;
        }
        self.outbound.send(OutboundEvent::AgentStop);
        self.state.running = false;
        self.state.current_step = 0;
        self.state.pending_question = None;
        self.state.step_description = None;
        self.state.reported_max_steps = None;
        true
    }

    pub fn on_completed(&mut self, event: AgentCompletedEvent) {
        if let Some(error) = &event.error {
            tracing::warn!("agent run failed: {error}");
        }
        self.state.running = false;
        self.state.pending_question = None;
        self.state.last_error = event.error;
    }

    /// Fraction of the step budget used, or `None` while idle.
    pub fn progress(&self) -> Option<f64> {
        if self.state.current_step == 0 {
            return None;
        }
        let ratio = f64::from(self.state.current_step) / f64::from(self.state.max_steps);
        Some(ratio.clamp(0.0, 1.0))
    }
}
