#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use quill_core::ChatSession;
use quill_core::Draft;
use quill_core::OutboundSender;
use quill_core::config::Config;
use quill_core::config::ConfigOverrides;
use quill_core::config::ConfigToml;
use quill_core::inventory::HttpInventory;
use quill_protocol::InboundEvent;
use quill_protocol::OutboundEvent;
use quill_protocol::protocol::ConnectionStatusEvent;
use serde_json::json;
use tempfile::TempDir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn load_config(server: &MockServer, home: &TempDir, extra: &str) -> Config {
    let raw = format!(
        r#"
model = "gpt-large"

[inventory]
base_url = "{}/api/"
session_id = "s1"
{extra}
"#,
        server.uri()
    );
    let cfg: ConfigToml = toml::from_str(&raw).expect("config toml");
    Config::load_from_base_config_with_overrides(
        cfg,
        ConfigOverrides::default(),
        home.path().to_path_buf(),
    )
    .expect("config")
}

fn connect(session: &mut ChatSession) {
    session.handle_event(InboundEvent::ConnectionStatus(ConnectionStatusEvent {
        connected: true,
        model: None,
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mentions_resolve_into_attachments() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"filename": "report.csv", "type": "data", "size": 8, "source": "user", "locator": "/blobs/report"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blobs/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("q1,q2\n"))
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new()?;
    let config = load_config(&server, &home, "");
    let inventory = HttpInventory::new(config.inventory.as_ref().expect("inventory"));
    let (tx, mut rx) = OutboundSender::channel();
    let mut session = ChatSession::new(&config, Arc::new(inventory), tx);
    connect(&mut session);

    let message = session
        .submit(Draft::new("see @file report.csv and @file missing.txt"))
        .await?;

    assert_eq!(
        message.attachments,
        BTreeMap::from([
            ("missing.txt".to_string(), "[File not found: missing.txt]".to_string()),
            ("report.csv".to_string(), "q1,q2\n".to_string()),
        ])
    );
    assert_eq!(message.text, "see @file report.csv and @file missing.txt");
    assert_eq!(rx.recv().await, Some(OutboundEvent::ChatMessage(message)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inventory_outage_still_sends_uploads() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/files"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let home = TempDir::new()?;
    let config = load_config(&server, &home, "");
    let inventory = HttpInventory::new(config.inventory.as_ref().expect("inventory"));
    let (tx, _rx) = OutboundSender::channel();
    let mut session = ChatSession::new(&config, Arc::new(inventory), tx);
    connect(&mut session);

    let message = session
        .submit(Draft::new("compare @file a.csv").with_upload("b.csv", "1,2"))
        .await?;
    assert_eq!(
        message.attachments,
        BTreeMap::from([("b.csv".to_string(), "1,2".to_string())])
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn agent_run_is_attached_and_tracked() -> Result<()> {
    let server = MockServer::start().await;
    let home = TempDir::new()?;
    let config = load_config(
        &server,
        &home,
        r#"
[agent]
enabled = true
max_steps = 4
"#,
    );
    let inventory = HttpInventory::new(config.inventory.as_ref().expect("inventory"));
    let (tx, mut rx) = OutboundSender::channel();
    let mut session = ChatSession::new(&config, Arc::new(inventory), tx);
    connect(&mut session);

    let message = session.submit(Draft::new("refactor the parser")).await?;
    assert_eq!(
        serde_json::to_value(&message)?["agent"],
        json!({"maxSteps": 4})
    );

    let step: InboundEvent = serde_json::from_value(json!({
        "type": "agent_step",
        "step": 2,
        "description": "Reading files",
    }))?;
    session.handle_event(step);
    assert_eq!(session.agent().progress(), Some(0.5));

    let question: InboundEvent = serde_json::from_value(json!({
        "type": "agent_question",
        "question": "Keep the old API?",
    }))?;
    session.handle_event(question);
    session.agent_mut().answer("yes")?;

    let completed: InboundEvent = serde_json::from_value(json!({"type": "agent_completed"}))?;
    session.handle_event(completed);
    assert!(!session.agent().state().running);

    let mut sent = Vec::new();
    while let Ok(event) = rx.try_recv() {
        sent.push(serde_json::to_value(event)?["type"].clone());
    }
    assert_eq!(sent, vec![json!("chat_message"), json!("agent_answer")]);
    Ok(())
}
