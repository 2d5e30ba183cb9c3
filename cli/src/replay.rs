//! Drive a [`ChatSession`] and a [`ChatComposer`] from a JSONL script.
//!
//! Each script line is one step: an inbound server event, keyboard input for
//! the composer, or a user decision (approve, reject, answer, stop). Every
//! outbound event the engine produces is written to the output as one JSON
//! line.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::Write;

use anyhow::Context;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;
use quill_composer::ChatComposer;
use quill_composer::InputResult;
use quill_core::ChatSession;
use quill_core::Draft;
use quill_core::approval::ApprovalState;
use quill_core::inventory::InventorySnapshot;
use quill_protocol::InboundEvent;
use quill_protocol::OutboundEvent;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// An event as delivered by the server.
    Inbound { event: InboundEvent },
    /// Type each character of `text` into the composer.
    Type { text: String },
    /// A single key such as `enter`, `shift+enter`, `tab`, `esc`, `ctrl+n`.
    Key { key: String },
    Paste { text: String },
    /// Attach a file by hand to the next submitted message.
    Upload { filename: String, content: String },
    Approve,
    /// Edit one argument of the displayed tool call, entering edit mode if
    /// needed.
    Edit { name: String, value: String },
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
    Answer { text: String },
    AgentMode {
        enabled: bool,
        #[serde(default)]
        max_steps: Option<u32>,
    },
    Stop,
}

pub struct Replay<W> {
    session: ChatSession,
    composer: ChatComposer,
    outbound_rx: UnboundedReceiver<OutboundEvent>,
    inventory_rx: Option<watch::Receiver<InventorySnapshot>>,
    uploads: BTreeMap<String, String>,
    out: W,
}

impl<W: Write> Replay<W> {
    pub fn new(session: ChatSession, outbound_rx: UnboundedReceiver<OutboundEvent>, out: W) -> Self {
        Self {
            session,
            composer: ChatComposer::new(),
            outbound_rx,
            inventory_rx: None,
            uploads: BTreeMap::new(),
            out,
        }
    }

    /// Feed tool and file listings from the inventory poller into the
    /// composer between steps.
    pub fn with_inventory_updates(mut self, rx: watch::Receiver<InventorySnapshot>) -> Self {
        self.apply_snapshot(&rx.borrow());
        self.inventory_rx = Some(rx);
        self
    }

    pub fn composer(&self) -> &ChatComposer {
        &self.composer
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run(&mut self, script: impl BufRead) -> anyhow::Result<()> {
        for (idx, line) in script.lines().enumerate() {
            let line = line.context("failed to read script")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step: ScriptStep = serde_json::from_str(line)
                .with_context(|| format!("invalid script step on line {}", idx + 1))?;
            self.step(step).await;
            self.flush_outbound()?;
        }
        Ok(())
    }

    pub async fn step(&mut self, step: ScriptStep) {
        self.refresh_inventory();
        self.composer
            .set_submit_enabled(self.session.status().get().can_submit());

        match step {
            ScriptStep::Inbound { event } => {
                if let Some(chat) = self.session.handle_event(event) {
                    tracing::debug!("chat event: {}", chat.payload);
                }
            }
            ScriptStep::Type { text } => {
                for c in text.chars() {
                    self.key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
                        .await;
                }
            }
            ScriptStep::Key { key } => match parse_key(&key) {
                Ok(key_event) => self.key(key_event).await,
                Err(err) => tracing::warn!("{err}"),
            },
            ScriptStep::Paste { text } => {
                self.composer.handle_paste(text);
            }
            ScriptStep::Upload { filename, content } => {
                self.uploads.insert(filename, content);
            }
            ScriptStep::Approve => {
                if let Err(err) = self.session.approvals_mut().approve() {
                    tracing::warn!("approve: {err}");
                }
            }
            ScriptStep::Edit { name, value } => {
                if let Err(err) = self.edit_argument(&name, value) {
                    tracing::warn!("edit {name}: {err}");
                }
            }
            ScriptStep::Reject { reason } => {
                if let Err(err) = self.session.approvals_mut().reject(reason) {
                    tracing::warn!("reject: {err}");
                }
            }
            ScriptStep::Answer { text } => {
                if let Err(err) = self.session.agent_mut().answer(text) {
                    tracing::warn!("answer: {err}");
                }
            }
            ScriptStep::AgentMode { enabled, max_steps } => {
                let agent = self.session.agent_mut();
                if let Err(err) = agent.set_enabled(enabled) {
                    tracing::warn!("agent mode: {err}");
                }
                if let Some(max_steps) = max_steps {
                    agent.set_max_steps(max_steps);
                }
            }
            ScriptStep::Stop => {
                if !self.session.stop_agent() {
                    tracing::info!("stop requested with no agent run active");
                }
            }
        }
    }

    async fn key(&mut self, key_event: KeyEvent) {
        self.composer
            .set_submit_enabled(self.session.status().get().can_submit());
        if let InputResult::Submitted(text) = self.composer.handle_key_event(key_event) {
            let uploads = std::mem::take(&mut self.uploads);
            let draft = Draft {
                text: text.clone(),
                uploads: uploads.clone(),
            };
            if let Err(err) = self.session.submit(draft).await {
                // Put the draft back.
                tracing::warn!("submit failed: {err}");
                self.composer.set_text_content(text);
                self.uploads = uploads;
            }
        }
    }

    fn edit_argument(&mut self, name: &str, value: String) -> quill_core::error::Result<()> {
        let approvals = self.session.approvals_mut();
        let needs_edit_mode = matches!(
            approvals.state(),
            ApprovalState::AwaitingDecision(pending) if !pending.is_editing()
        );
        if needs_edit_mode {
            approvals.enter_edit_mode()?;
        }
        approvals.edit_argument(name, value)
    }

    fn refresh_inventory(&mut self) {
        let snapshot = match self.inventory_rx.as_mut() {
            Some(rx) if rx.has_changed().unwrap_or(false) => rx.borrow_and_update().clone(),
            _ => return,
        };
        self.apply_snapshot(&snapshot);
    }

    fn apply_snapshot(&mut self, snapshot: &InventorySnapshot) {
        self.composer.set_tools(snapshot.tools.clone());
        self.composer.set_files(snapshot.files.clone());
    }

    fn flush_outbound(&mut self) -> anyhow::Result<()> {
        while let Ok(event) = self.outbound_rx.try_recv() {
            serde_json::to_writer(&mut self.out, &event)?;
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Parse key names like `enter`, `shift+enter`, `ctrl+p` or a single
/// character.
pub fn parse_key(spec: &str) -> anyhow::Result<KeyEvent> {
    let mut modifiers = KeyModifiers::NONE;
    let mut rest = spec.trim();
    loop {
        let lower = rest.to_ascii_lowercase();
        if let Some(stripped) = lower.strip_prefix("shift+") {
            modifiers |= KeyModifiers::SHIFT;
            rest = &rest[rest.len() - stripped.len()..];
        } else if let Some(stripped) = lower.strip_prefix("ctrl+") {
            modifiers |= KeyModifiers::CONTROL;
            rest = &rest[rest.len() - stripped.len()..];
        } else if let Some(stripped) = lower.strip_prefix("alt+") {
            modifiers |= KeyModifiers::ALT;
            rest = &rest[rest.len() - stripped.len()..];
        } else {
            break;
        }
    }

    let code = match rest.to_ascii_lowercase().as_str() {
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "esc" | "escape" => KeyCode::Esc,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "space" => KeyCode::Char(' '),
        _ => {
            let mut chars = rest.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => anyhow::bail!("unknown key: {spec}"),
            }
        }
    };
    Ok(KeyEvent::new(code, modifiers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_core::OutboundSender;
    use quill_core::config::Config;
    use quill_core::config::ConfigOverrides;
    use quill_core::config::ConfigToml;
    use quill_core::inventory::StaticInventory;
    use quill_protocol::descriptors::ToolDescriptor;
    use serde_json::Value;
    use std::sync::Arc;

    fn replay(config_toml: &str) -> Replay<Vec<u8>> {
        let cfg: ConfigToml = toml::from_str(config_toml).expect("config toml");
        let config = Config::load_from_base_config_with_overrides(
            cfg,
            ConfigOverrides::default(),
            std::env::temp_dir(),
        )
        .expect("config");
        let (tx, rx) = OutboundSender::channel();
        let session = ChatSession::new(&config, Arc::new(StaticInventory::default()), tx);
        Replay::new(session, rx, Vec::new())
    }

    fn output_lines(replay: Replay<Vec<u8>>) -> Vec<Value> {
        let out = String::from_utf8(replay.into_output()).expect("utf8");
        out.lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn parses_key_names() {
        assert_eq!(
            parse_key("shift+Enter").expect("key"),
            KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT)
        );
        assert_eq!(
            parse_key("ctrl+n").expect("key"),
            KeyEvent::new(KeyCode::Char('n'), KeyModifiers::CONTROL)
        );
        assert_eq!(
            parse_key("x").expect("key"),
            KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE)
        );
        assert!(parse_key("hyper+q").is_err());
    }

    #[tokio::test]
    async fn typed_message_is_sent_after_connecting() {
        let mut replay = replay("model = \"gpt-large\"");
        let script = r#"
{"op": "type", "text": "hello"}
{"op": "key", "key": "enter"}
{"op": "inbound", "event": {"type": "connection_status", "connected": true}}
{"op": "key", "key": "enter"}
"#;
        replay.run(script.as_bytes()).await.expect("replay");

        let lines = output_lines(replay);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], "chat_message");
        assert_eq!(lines[0]["text"], "hello");
        assert_eq!(lines[0]["model"], "gpt-large");
    }

    #[tokio::test]
    async fn approval_edits_flow_into_response() {
        let mut replay = replay("");
        let script = r#"
{"op": "inbound", "event": {"type": "tool_approval_requested", "toolCallId": "c1", "toolName": "write_file", "arguments": {"path": "a.md", "opts": {}}, "allowEdit": true}}
{"op": "edit", "name": "opts", "value": "{\"force\": true}"}
{"op": "approve"}
{"op": "approve"}
"#;
        replay.run(script.as_bytes()).await.expect("replay");

        let lines = output_lines(replay);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            serde_json::json!({
                "type": "tool_approval_response",
                "toolCallId": "c1",
                "approved": true,
                "arguments": {"path": "a.md", "opts": {"force": true}},
            })
        );
    }

    #[tokio::test]
    async fn inventory_snapshot_feeds_tool_popup() {
        let replay = replay("");
        let (_tx, rx) = watch::channel(InventorySnapshot {
            tools: vec![ToolDescriptor::new("web", "search")],
            files: Vec::new(),
        });
        let mut replay = replay.with_inventory_updates(rx);
        replay
            .step(ScriptStep::Type {
                text: "/se".to_string(),
            })
            .await;
        let popup = replay.composer().tool_popup().expect("tool popup");
        assert_eq!(popup.candidates()[0].name, "search");
    }

    #[tokio::test]
    async fn failed_submit_keeps_text_and_uploads() {
        let config = Config::load_from_base_config_with_overrides(
            toml::from_str("model = \"gpt-large\"").expect("config toml"),
            ConfigOverrides::default(),
            std::env::temp_dir(),
        )
        .expect("config");
        let (tx, closed_rx) = OutboundSender::channel();
        drop(closed_rx);
        let (_unused_tx, rx) = OutboundSender::channel();
        let session = ChatSession::new(&config, Arc::new(StaticInventory::default()), tx);
        let mut replay = Replay::new(session, rx, Vec::new());

        let script = r#"
{"op": "inbound", "event": {"type": "connection_status", "connected": true}}
{"op": "upload", "filename": "notes.txt", "content": "draft notes"}
{"op": "type", "text": "hello"}
{"op": "key", "key": "enter"}
"#;
        replay.run(script.as_bytes()).await.expect("replay");

        assert_eq!(replay.composer().text(), "hello");
        assert_eq!(
            replay.uploads,
            BTreeMap::from([("notes.txt".to_string(), "draft notes".to_string())])
        );
        assert_eq!(output_lines(replay), Vec::<Value>::new());
    }

    #[tokio::test]
    async fn malformed_step_reports_line_number() {
        let mut replay = replay("");
        let err = replay
            .run("{\"op\": \"approve\"}\n{\"op\": \"dance\"}\n".as_bytes())
            .await
            .expect_err("invalid op");
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
