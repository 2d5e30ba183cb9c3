//! Access to the tools and files available in the current chat session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quill_async_utils::BackoffPoller;
use quill_async_utils::PollSchedule;
use quill_async_utils::PollerHandle;
use quill_protocol::descriptors::FileDescriptor;
use quill_protocol::descriptors::ToolDescriptor;
use reqwest::Client;
use tokio::sync::watch;
use url::Url;

use crate::config::InventoryConfig;
use crate::config::PollConfig;
use crate::error::QuillErr;
use crate::error::Result;

#[async_trait]
pub trait SessionInventory: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    async fn list_session_files(&self) -> Result<Vec<FileDescriptor>>;

    /// Fetch the raw bytes behind `file.locator`. Fails with
    /// [`QuillErr::Fetch`] on a non-success response or transport error.
    async fn fetch_file_content(&self, file: &FileDescriptor) -> Result<Vec<u8>>;
}

/// Inventory backed by the session service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpInventory {
    client: Client,
    base_url: Url,
    session_id: String,
}

impl HttpInventory {
    pub fn new(config: &InventoryConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &InventoryConfig) -> Self {
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            session_id: config.session_id.clone(),
        }
    }

    fn session_url(&self, leaf: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| QuillErr::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["sessions", self.session_id.as_str(), leaf]);
        Ok(url)
    }

    fn content_url(&self, locator: &str) -> Result<Url> {
        match Url::parse(locator) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(self.base_url.join(locator.trim_start_matches('/'))?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SessionInventory for HttpInventory {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let url = self.session_url("tools")?;
        let tools = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ToolDescriptor>>()
            .await?;
        tracing::debug!("loaded {} tools", tools.len());
        Ok(tools)
    }

    async fn list_session_files(&self) -> Result<Vec<FileDescriptor>> {
        let url = self.session_url("files")?;
        let response = self.client.get(url).send().await?;
        let files = response
            .error_for_status()
            .map_err(|e| QuillErr::Inventory(e.to_string()))?
            .json::<Vec<FileDescriptor>>()
            .await?;
        tracing::debug!("session has {} files", files.len());
        Ok(files)
    }

    async fn fetch_file_content(&self, file: &FileDescriptor) -> Result<Vec<u8>> {
        let fetch_err = |message: String| QuillErr::Fetch {
            filename: file.filename.clone(),
            message,
        };
        let locator = file
            .locator
            .as_deref()
            .ok_or_else(|| fetch_err("no content locator".to_string()))?;
        let url = self.content_url(locator)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("unexpected status {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Fixed, in-memory inventory. Used for replaying recorded sessions and in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    tools: Vec<ToolDescriptor>,
    files: Vec<FileDescriptor>,
    contents: HashMap<String, Vec<u8>>,
}

impl StaticInventory {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            ..Default::default()
        }
    }

    /// Adds a file whose content is served under its filename.
    pub fn with_file(mut self, mut file: FileDescriptor, content: impl Into<Vec<u8>>) -> Self {
        if file.locator.is_none() {
            file.locator = Some(file.filename.clone());
        }
        if let Some(locator) = file.locator.clone() {
            self.contents.insert(locator, content.into());
        }
        self.files.push(file);
        self
    }

    /// Adds a file that is listed but whose content cannot be loaded.
    pub fn with_broken_file(mut self, file: FileDescriptor) -> Self {
        self.files.push(file);
        self
    }
}

#[async_trait]
impl SessionInventory for StaticInventory {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn list_session_files(&self) -> Result<Vec<FileDescriptor>> {
        Ok(self.files.clone())
    }

    async fn fetch_file_content(&self, file: &FileDescriptor) -> Result<Vec<u8>> {
        file.locator
            .as_ref()
            .and_then(|locator| self.contents.get(locator))
            .cloned()
            .ok_or_else(|| QuillErr::Fetch {
                filename: file.filename.clone(),
                message: "content unavailable".to_string(),
            })
    }
}

/// Latest tool and file listing fetched by the inventory poller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub tools: Vec<ToolDescriptor>,
    pub files: Vec<FileDescriptor>,
}

/// Keep an [`InventorySnapshot`] fresh by polling `inventory` with backoff.
/// Polling stops when the returned handle is cancelled or dropped.
pub fn spawn_inventory_poller(
    inventory: Arc<dyn SessionInventory>,
    poll: &PollConfig,
) -> (PollerHandle, watch::Receiver<InventorySnapshot>) {
    let (tx, rx) = watch::channel(InventorySnapshot::default());
    let tx = Arc::new(tx);
    let schedule = PollSchedule::new(poll.interval, poll.max_backoff).with_jitter(poll.jitter);
    let handle = BackoffPoller::spawn("inventory", schedule, move || {
        let inventory = Arc::clone(&inventory);
        let tx = Arc::clone(&tx);
        async move {
            let tools = inventory.list_tools().await?;
            let files = inventory.list_session_files().await?;
            tx.send_if_modified(|current| {
                let next = InventorySnapshot { tools, files };
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
            Ok::<(), QuillErr>(())
        }
    });
    (handle, rx)
}
