use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// A tool the assistant can invoke, as advertised by a tool server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique across all servers. Usually `"{server}:{name}"`.
    pub key: String,
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(server: impl Into<String>, name: impl Into<String>) -> Self {
        let server = server.into();
        let name = name.into();
        Self {
            key: format!("{server}:{name}"),
            name,
            server,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
    TS,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileType {
    Code,
    Image,
    Data,
    Document,
    Other,
}

/// Who put the file into the session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
    TS,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileSource {
    User,
    Tool,
}

/// A file available in the current chat session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema, TS)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Unique within a session.
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: FileType,
    /// Size in bytes.
    pub size: u64,
    pub source: FileSource,
    /// Where the content can be fetched from: an absolute URL or a path
    /// relative to the inventory service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}
