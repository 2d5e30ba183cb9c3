#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;

use anyhow::Result;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use quill_core::config::InventoryConfig;
use quill_core::error::QuillErr;
use quill_core::file_refs::resolve_file_references;
use quill_core::inventory::HttpInventory;
use quill_core::inventory::SessionInventory;
use quill_protocol::descriptors::FileType;
use serde_json::json;
use url::Url;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn inventory_for(server: &MockServer) -> HttpInventory {
    HttpInventory::new(&InventoryConfig {
        base_url: Url::parse(&format!("{}/api/", server.uri())).expect("mock server url"),
        session_id: "s1".to_string(),
    })
}

async fn mount_files(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"filename": "report.csv", "type": "data", "size": 8, "source": "user", "locator": "/blobs/report"},
            {"filename": "logo.png", "type": "image", "size": 3, "source": "tool", "locator": "blobs/logo"},
            {"filename": "gone.txt", "type": "document", "size": 1, "source": "user", "locator": "/blobs/gone"},
        ])))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lists_tools_and_files() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"key": "web:search", "name": "search", "server": "web", "description": "Search the web"},
            {"key": "fs:read_file", "name": "read_file", "server": "fs"},
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_files(&server).await;

    let inventory = inventory_for(&server);
    let tools = inventory.list_tools().await?;
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["search", "read_file"]);
    assert_eq!(tools[1].description, "");

    let files = inventory.list_session_files().await?;
    assert_eq!(files.len(), 3);
    assert_eq!(files[1].kind, FileType::Image);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolves_text_binary_and_failed_fetches() -> Result<()> {
    let server = MockServer::start().await;
    mount_files(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/blobs/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blobs/logo"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89_u8, 0x50, 0x4e]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blobs/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let inventory = inventory_for(&server);
    let attachments = resolve_file_references(
        "@file report.csv @file logo.png @file gone.txt @file nope.md",
        &inventory,
    )
    .await?;

    assert_eq!(
        attachments,
        BTreeMap::from([
            ("gone.txt".to_string(), "[Error loading file: gone.txt]".to_string()),
            ("logo.png".to_string(), "iVBO".to_string()),
            ("nope.md".to_string(), "[File not found: nope.md]".to_string()),
            ("report.csv".to_string(), "a,b\n1,2\n".to_string()),
        ])
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_failure_surfaces_as_inventory_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/files"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let inventory = inventory_for(&server);
    assert_matches!(
        inventory.list_session_files().await,
        Err(QuillErr::Inventory(_))
    );
    assert_matches!(
        resolve_file_references("@file report.csv", &inventory).await,
        Err(QuillErr::Inventory(_))
    );
    Ok(())
}
