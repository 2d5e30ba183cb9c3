//! Resolution of `@file <name>` mentions into message attachments.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures::future::join_all;
use quill_protocol::descriptors::FileDescriptor;
use regex_lite::Regex;

use crate::error::QuillErr;
use crate::error::Result;
use crate::inventory::SessionInventory;

static FILE_MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@file\s+(\S+)").unwrap_or_else(|_| std::process::abort()));

/// A single `@file` mention found in a draft. Lives for one submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFileMention {
    pub filename: String,
    /// The full matched text, e.g. `"@file report.csv"`.
    pub raw_match: String,
}

/// Distinct mentions in order of first appearance.
pub fn extract_file_mentions(text: &str) -> Vec<PendingFileMention> {
    let mut mentions: Vec<PendingFileMention> = Vec::new();
    for caps in FILE_MENTION_REGEX.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if mentions.iter().any(|m| m.filename == name.as_str()) {
            continue;
        }
        mentions.push(PendingFileMention {
            filename: name.as_str().to_string(),
            raw_match: whole.as_str().to_string(),
        });
    }
    mentions
}

pub fn not_found_placeholder(filename: &str) -> String {
    format!("[File not found: {filename}]")
}

pub fn load_error_placeholder(filename: &str) -> String {
    format!("[Error loading file: {filename}]")
}

/// Text content is passed through; anything that is not valid UTF-8 is
/// base64 encoded.
pub fn decode_payload(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => BASE64_STANDARD.encode(err.into_bytes()),
    }
}

/// Resolve every distinct mention in `text`. The returned map has one entry
/// per mention: file content, or a placeholder when the file is unknown or
/// could not be loaded. Fetches run concurrently and all of them settle
/// before this returns.
///
/// Only a failure to list the session's files is returned as an error.
pub async fn resolve_file_references(
    text: &str,
    inventory: &dyn SessionInventory,
) -> Result<BTreeMap<String, String>> {
    let mentions = extract_file_mentions(text);
    if mentions.is_empty() {
        return Ok(BTreeMap::new());
    }

    let files = inventory
        .list_session_files()
        .await
        .map_err(|e| QuillErr::Inventory(e.to_string()))?;
    let by_name: HashMap<&str, &FileDescriptor> =
        files.iter().map(|f| (f.filename.as_str(), f)).collect();
    let by_name = &by_name;

    let resolutions = mentions.iter().map(|mention| async move {
        let filename = mention.filename.as_str();
        let content = match by_name.get(filename) {
            None => {
                tracing::debug!("referenced file {filename} is not in the session");
                not_found_placeholder(filename)
            }
            Some(file) => match inventory.fetch_file_content(file).await {
                Ok(bytes) => decode_payload(bytes),
                Err(err) => {
                    tracing::warn!("failed to load referenced file: {err}");
                    load_error_placeholder(filename)
                }
            },
        };
        (filename.to_string(), content)
    });

    Ok(join_all(resolutions).await.into_iter().collect())
}
