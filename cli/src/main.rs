use std::fs::OpenOptions;

use clap::Parser;
use quill_cli::CliConfigOverrides;
use quill_cli::ReplayCommand;
use quill_cli::run_replay;
use quill_core::config::Config;
use quill_core::config::ConfigOverrides;
use quill_core::config::log_dir;
use quill_core::features::Stage;
use quill_core::features::is_known_feature_key;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Quill chat composer engine.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "quill")]
struct MultitoolCli {
    #[clap(flatten)]
    config_overrides: CliConfigOverrides,

    #[clap(flatten)]
    feature_toggles: FeatureToggles,

    /// Model to select for the session.
    #[arg(long = "model", short = 'm', global = true)]
    model: Option<String>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Replay a JSONL script of server events and user input, printing
    /// outbound events as JSONL.
    Replay(ReplayCommand),

    /// Inspect feature flags.
    Features(FeaturesCli),
}

#[derive(Debug, Default, Parser)]
struct FeatureToggles {
    /// Enable a feature (repeatable). Equivalent to `-c features.<name>=true`.
    #[arg(long = "enable", value_name = "FEATURE", action = clap::ArgAction::Append, global = true)]
    enable: Vec<String>,

    /// Disable a feature (repeatable). Equivalent to `-c features.<name>=false`.
    #[arg(long = "disable", value_name = "FEATURE", action = clap::ArgAction::Append, global = true)]
    disable: Vec<String>,
}

impl FeatureToggles {
    fn to_overrides(&self) -> anyhow::Result<Vec<String>> {
        let mut v = Vec::new();
        for feature in &self.enable {
            Self::validate_feature(feature)?;
            v.push(format!("features.{feature}=true"));
        }
        for feature in &self.disable {
            Self::validate_feature(feature)?;
            v.push(format!("features.{feature}=false"));
        }
        Ok(v)
    }

    fn validate_feature(feature: &str) -> anyhow::Result<()> {
        if is_known_feature_key(feature) {
            Ok(())
        } else {
            anyhow::bail!("Unknown feature flag: {feature}")
        }
    }
}

#[derive(Debug, Parser)]
struct FeaturesCli {
    #[command(subcommand)]
    sub: FeaturesSubcommand,
}

#[derive(Debug, Parser)]
enum FeaturesSubcommand {
    /// List known features with their stage and effective state.
    List,
}

fn stage_str(stage: Stage) -> &'static str {
    match stage {
        Stage::Experimental => "experimental",
        Stage::Beta => "beta",
        Stage::Stable => "stable",
    }
}

/// Log to `<quill_home>/log/quill.log`. The returned guard flushes the
/// writer on drop.
fn init_logging(config: &Config) -> anyhow::Result<WorkerGuard> {
    let log_dir = log_dir(&config.quill_home);
    std::fs::create_dir_all(&log_dir)?;
    let mut log_file_opts = OpenOptions::new();
    log_file_opts.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        log_file_opts.mode(0o600);
    }

    let log_file = log_file_opts.open(log_dir.join("quill.log"))?;
    let (non_blocking, guard) = non_blocking(log_file);

    // use RUST_LOG env var, default to info for quill crates.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quill_core=info,quill_composer=info,quill_cli=info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(false)
        .with_ansi(false)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(file_layer).try_init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let MultitoolCli {
        mut config_overrides,
        feature_toggles,
        model,
        subcommand,
    } = MultitoolCli::parse();

    // Fold --enable/--disable into config overrides.
    let toggle_overrides = feature_toggles.to_overrides()?;
    config_overrides.raw_overrides.extend(toggle_overrides);
    let cli_kv_overrides = config_overrides
        .parse_overrides()
        .map_err(anyhow::Error::msg)?;

    match subcommand {
        Subcommand::Replay(cmd) => {
            let overrides = ConfigOverrides {
                model,
                agent_enabled: cmd.agent.then_some(true),
                max_steps: cmd.max_steps,
                ..Default::default()
            };
            let config = Config::load_with_cli_overrides(cli_kv_overrides, overrides).await?;
            let _guard = init_logging(&config)?;
            tracing::info!("replaying {}", cmd.script.display());
            run_replay(cmd, config).await?;
        }
        Subcommand::Features(FeaturesCli { sub }) => match sub {
            FeaturesSubcommand::List => {
                let overrides = ConfigOverrides {
                    model,
                    ..Default::default()
                };
                let config = Config::load_with_cli_overrides(cli_kv_overrides, overrides).await?;
                for def in quill_core::features::FEATURES.iter() {
                    let name = def.key;
                    let stage = stage_str(def.stage);
                    let enabled = config.features.enabled(def.id);
                    println!("{name}\t{stage}\t{enabled}");
                }
            }
        },
    }

    Ok(())
}
