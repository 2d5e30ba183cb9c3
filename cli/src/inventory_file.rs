use std::path::Path;

use anyhow::Context;
use quill_core::inventory::StaticInventory;
use quill_protocol::descriptors::FileDescriptor;
use quill_protocol::descriptors::ToolDescriptor;
use serde::Deserialize;

/// Offline inventory description used by `quill replay --inventory`.
///
/// ```json
/// {"tools": [{"key": "web:search", "name": "search", "server": "web"}],
///  "files": [{"filename": "a.csv", "type": "data", "size": 3, "source": "user", "content": "1,2"}]}
/// ```
#[derive(Debug, Default, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(default)]
    files: Vec<InventoryFileEntry>,
}

#[derive(Debug, Deserialize)]
struct InventoryFileEntry {
    #[serde(flatten)]
    descriptor: FileDescriptor,
    /// Missing content makes the file fail to load.
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn parse_inventory(raw: &str) -> anyhow::Result<StaticInventory> {
    let file: InventoryFile = serde_json::from_str(raw)?;
    let mut inventory = StaticInventory::new(file.tools);
    for entry in file.files {
        inventory = match entry.content {
            Some(content) => inventory.with_file(entry.descriptor, content),
            None => inventory.with_broken_file(entry.descriptor),
        };
    }
    Ok(inventory)
}

pub(crate) async fn load_inventory_file(path: &Path) -> anyhow::Result<StaticInventory> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read inventory file {}", path.display()))?;
    parse_inventory(&raw).with_context(|| format!("invalid inventory file {}", path.display()))
}
