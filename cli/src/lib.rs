pub mod config_override;
mod inventory_file;
pub mod replay;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quill_core::ChatSession;
use quill_core::OutboundSender;
use quill_core::config::Config;
use quill_core::inventory::HttpInventory;
use quill_core::inventory::SessionInventory;
use quill_core::inventory::StaticInventory;
use quill_core::inventory::spawn_inventory_poller;

pub use config_override::CliConfigOverrides;

use crate::inventory_file::load_inventory_file;
use crate::replay::Replay;

/// How long to wait for the first tool/file listing before replaying input.
const FIRST_LISTING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
pub struct ReplayCommand {
    /// JSONL script to replay. Use `-` to read from stdin.
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Serve tools and files from a JSON description instead of the
    /// configured inventory service.
    #[arg(long = "inventory", value_name = "FILE")]
    pub inventory: Option<PathBuf>,

    /// Run sent messages in agent mode.
    #[arg(long = "agent", default_value_t = false)]
    pub agent: bool,

    /// Step budget for agent runs (1-10).
    #[arg(long = "max-steps", value_name = "N")]
    pub max_steps: Option<u32>,
}

pub async fn run_replay(cmd: ReplayCommand, config: Config) -> anyhow::Result<()> {
    let inventory: Arc<dyn SessionInventory> = match (&cmd.inventory, &config.inventory) {
        (Some(path), _) => Arc::new(load_inventory_file(path).await?),
        (None, Some(inventory)) => Arc::new(HttpInventory::new(inventory)),
        (None, None) => {
            tracing::info!("no inventory configured; @file mentions will not resolve");
            Arc::new(StaticInventory::default())
        }
    };

    let (outbound, outbound_rx) = OutboundSender::channel();
    let session = ChatSession::new(&config, Arc::clone(&inventory), outbound);
    let (poller, mut snapshots) = spawn_inventory_poller(inventory, &config.poll);
    if tokio::time::timeout(FIRST_LISTING_TIMEOUT, snapshots.changed())
        .await
        .is_err()
    {
        tracing::warn!("inventory listing not available yet; starting without it");
    }

    let stdout = std::io::stdout();
    let mut replay = Replay::new(session, outbound_rx, stdout.lock()).with_inventory_updates(snapshots);
    if cmd.script.as_os_str() == "-" {
        replay.run(std::io::stdin().lock()).await?;
    } else {
        let file = File::open(&cmd.script)
            .with_context(|| format!("failed to open script {}", cmd.script.display()))?;
        replay.run(BufReader::new(file)).await?;
    }

    poller.shutdown().await;
    Ok(())
}
