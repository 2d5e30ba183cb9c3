//! Support for `-c key=value` overrides shared by every subcommand.
//!
//! Values are parsed as TOML so `-c agent.max_steps=3` yields an integer and
//! `-c features.agent_mode=false` a boolean. Anything that does not parse is
//! kept as a plain string, so `-c model=gpt-large` works without quotes.

use clap::ArgAction;
use clap::Parser;
use toml::Value;

#[derive(Parser, Debug, Default, Clone)]
pub struct CliConfigOverrides {
    /// Override a configuration value from `$QUILL_HOME/config.toml`. Use a
    /// dotted path (`agent.max_steps=3`) for nested values. Repeatable.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "key=value",
        action = ArgAction::Append,
        global = true
    )]
    pub raw_overrides: Vec<String>,
}

impl CliConfigOverrides {
    pub fn parse_overrides(&self) -> Result<Vec<(String, Value)>, String> {
        self.raw_overrides
            .iter()
            .map(|raw| {
                let Some((key, value)) = raw.split_once('=') else {
                    return Err(format!("Invalid override (missing '='): {raw}"));
                };
                let key = key.trim();
                if key.is_empty() {
                    return Err(format!("Empty key in override: {raw}"));
                }
                let value = value.trim();
                let value = parse_toml_value(value)
                    .unwrap_or_else(|| Value::String(trim_quotes(value).to_string()));
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn parse_toml_value(raw: &str) -> Option<Value> {
    let wrapped = format!("_x_ = {raw}");
    let mut table: toml::Table = toml::from_str(&wrapped).ok()?;
    table.remove("_x_")
}

fn trim_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
