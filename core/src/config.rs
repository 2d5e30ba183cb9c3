use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::Value as TomlValue;
use url::Url;

use crate::config_loader::load_config_as_toml_with_cli_overrides;
use crate::features::Feature;
use crate::features::Features;
use crate::features::FeaturesToml;

pub const CONFIG_TOML_FILE: &str = "config.toml";

pub const MIN_AGENT_STEPS: u32 = 1;
pub const MAX_AGENT_STEPS: u32 = 10;
pub const DEFAULT_AGENT_STEPS: u32 = 5;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
const DEFAULT_POLL_JITTER: f64 = 0.1;

/// Base config deserialized from `$QUILL_HOME/config.toml`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConfigToml {
    /// Model preselected for new sessions.
    pub model: Option<String>,
    pub agent: Option<AgentToml>,
    pub poll: Option<PollToml>,
    pub inventory: Option<InventoryToml>,
    pub features: Option<FeaturesToml>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentToml {
    pub enabled: Option<bool>,
    pub max_steps: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PollToml {
    pub interval_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub jitter: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InventoryToml {
    pub base_url: Option<String>,
    pub session_id: Option<String>,
}

/// Optional overrides for user configuration (e.g., from CLI flags).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub agent_enabled: Option<bool>,
    pub max_steps: Option<u32>,
    pub inventory_base_url: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub enabled: bool,
    pub max_steps: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
    pub jitter: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryConfig {
    pub base_url: Url,
    pub session_id: String,
}

/// Application configuration loaded from disk and merged with overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model: Option<String>,
    pub agent: AgentConfig,
    pub poll: PollConfig,
    /// `None` when no inventory service is configured; file references then
    /// resolve to not-found placeholders.
    pub inventory: Option<InventoryConfig>,
    pub features: Features,
    /// Directory containing all Quill state (config, logs).
    pub quill_home: PathBuf,
}

impl Config {
    /// Load configuration from `$QUILL_HOME/config.toml`, applying `-c`
    /// overrides first and then the typed `overrides`.
    pub async fn load_with_cli_overrides(
        cli_overrides: Vec<(String, TomlValue)>,
        overrides: ConfigOverrides,
    ) -> std::io::Result<Self> {
        let quill_home = find_quill_home()?;
        let root = load_config_as_toml_with_cli_overrides(&quill_home, cli_overrides).await?;
        let cfg: ConfigToml = root.try_into().map_err(|e| {
            tracing::error!("Failed to deserialize overridden config: {e}");
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        Self::load_from_base_config_with_overrides(cfg, overrides, quill_home)
    }

    pub fn load_from_base_config_with_overrides(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        quill_home: PathBuf,
    ) -> std::io::Result<Self> {
        let ConfigOverrides {
            model,
            agent_enabled,
            max_steps,
            inventory_base_url,
            session_id,
        } = overrides;

        let mut features = Features::with_defaults();
        if let Some(toml_features) = cfg.features.as_ref() {
            features.apply_map(&toml_features.entries);
        }

        let agent_toml = cfg.agent.unwrap_or_default();
        let requested_steps = max_steps
            .or(agent_toml.max_steps)
            .unwrap_or(DEFAULT_AGENT_STEPS);
        let agent = AgentConfig {
            enabled: features.enabled(Feature::AgentMode)
                && agent_enabled.or(agent_toml.enabled).unwrap_or(false),
            max_steps: clamp_max_steps(requested_steps),
        };

        let poll_toml = cfg.poll.unwrap_or_default();
        let poll = PollConfig {
            interval: poll_toml
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_backoff: poll_toml
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_MAX_BACKOFF),
            jitter: poll_toml.jitter.unwrap_or(DEFAULT_POLL_JITTER),
        };

        let inventory_toml = cfg.inventory.unwrap_or_default();
        let inventory = match (
            inventory_base_url.or(inventory_toml.base_url),
            session_id.or(inventory_toml.session_id),
        ) {
            (Some(base_url), Some(session_id)) => {
                let base_url = Url::parse(&base_url).map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("invalid inventory.base_url {base_url:?}: {e}"),
                    )
                })?;
                Some(InventoryConfig {
                    base_url,
                    session_id,
                })
            }
            (Some(_), None) => {
                tracing::warn!("inventory.base_url is set but inventory.session_id is not");
                None
            }
            _ => None,
        };

        Ok(Self {
            model: model.or(cfg.model),
            agent,
            poll,
            inventory,
            features,
            quill_home,
        })
    }

    /// Whether the agent UI should be offered at all.
    pub fn agent_mode_available(&self) -> bool {
        self.features.enabled(Feature::AgentMode)
    }
}

pub fn clamp_max_steps(steps: u32) -> u32 {
    let clamped = steps.clamp(MIN_AGENT_STEPS, MAX_AGENT_STEPS);
    if clamped != steps {
        tracing::warn!("agent max_steps {steps} out of range; using {clamped}");
    }
    clamped
}

/// Returns the path to the Quill configuration directory, which can be
/// specified by the `QUILL_HOME` environment variable. If not set, defaults
/// to `~/.quill`.
///
/// - If `QUILL_HOME` is set, the value will be canonicalized and this
///   function will Err if the path does not exist.
/// - If `QUILL_HOME` is not set, this function does not verify that the
///   directory exists.
pub fn find_quill_home() -> std::io::Result<PathBuf> {
    if let Ok(val) = std::env::var("QUILL_HOME")
        && !val.is_empty()
    {
        return PathBuf::from(val).canonicalize();
    }

    let mut p = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    p.push(".quill");
    Ok(p)
}

/// Returns the path to the folder where Quill logs are stored.
pub fn log_dir(quill_home: &Path) -> PathBuf {
    quill_home.join("log")
}
