use crate::config::CONFIG_TOML_FILE;
use std::io;
use std::path::Path;
use tokio::fs;
use toml::Value as TomlValue;

// Configuration layering pipeline (top overrides bottom):
//
//        +-------------------------+
//        |  -c key=value overrides |
//        +-------------------------+
//                    ^
//                    |
//        +-------------------------+
//        |    config.toml (base)   |
//        +-------------------------+

pub async fn load_config_as_toml(quill_home: &Path) -> io::Result<TomlValue> {
    load_config_as_toml_with_cli_overrides(quill_home, Vec::new()).await
}

pub async fn load_config_as_toml_with_cli_overrides(
    quill_home: &Path,
    cli_overrides: Vec<(String, TomlValue)>,
) -> io::Result<TomlValue> {
    let user_config_path = quill_home.join(CONFIG_TOML_FILE);
    let mut root = read_config_from_path(&user_config_path)
        .await?
        .unwrap_or_else(default_empty_table);
    for (path, value) in cli_overrides {
        apply_toml_override(&mut root, &path, value);
    }
    Ok(root)
}

fn default_empty_table() -> TomlValue {
    TomlValue::Table(Default::default())
}

async fn read_config_from_path(path: &Path) -> io::Result<Option<TomlValue>> {
    match fs::read_to_string(path).await {
        Ok(contents) => match toml::from_str::<TomlValue>(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::error!("Failed to parse {}: {err}", path.display());
                Err(io::Error::new(io::ErrorKind::InvalidData, err))
            }
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::info!("{} not found, using defaults", path.display());
            Ok(None)
        }
        Err(err) => {
            tracing::error!("Failed to read {}: {err}", path.display());
            Err(err)
        }
    }
}

/// Merge config `overlay` into `base`, giving `overlay` precedence.
pub(crate) fn merge_toml_values(base: &mut TomlValue, overlay: &TomlValue) {
    if let TomlValue::Table(overlay_table) = overlay
        && let TomlValue::Table(base_table) = base
    {
        for (key, value) in overlay_table {
            if let Some(existing) = base_table.get_mut(key) {
                merge_toml_values(existing, value);
            } else {
                base_table.insert(key.clone(), value.clone());
            }
        }
    } else {
        *base = overlay.clone();
    }
}

/// Set `value` at the dotted `path` inside `root`, creating intermediate
/// tables as needed.
fn apply_toml_override(root: &mut TomlValue, path: &str, value: TomlValue) {
    let mut overlay = value;
    for segment in path.rsplit('.') {
        let mut table = toml::map::Map::new();
        table.insert(segment.to_string(), overlay);
        overlay = TomlValue::Table(table);
    }
    merge_toml_values(root, &overlay);
}
