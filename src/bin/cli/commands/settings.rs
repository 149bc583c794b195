use anyhow::{bail, Context, Result};
use serde_json::Value;

use gdd_lib::sync::PersistenceConfig;

use crate::app::App;
use crate::OutputFormat;

pub fn run_show(app: &App, format: &OutputFormat) -> Result<()> {
    let config = app.workspace.persistence_config();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Plain => {
            let value = serde_json::to_value(config)?;
            if let Value::Object(map) = value {
                for (key, value) in map {
                    println!("{} = {}", key, value);
                }
            }
        }
    }
    Ok(())
}

/// Change one field, addressed by its camelCase key
pub fn run_set(app: &mut App, key: &str, raw: &str) -> Result<()> {
    let config = apply_setting(app.workspace.persistence_config(), key, raw)?;
    app.workspace
        .set_persistence_config(config)
        .context("Failed to save settings")?;
    println!("{} = {}", key, raw);
    Ok(())
}

fn apply_setting(current: &PersistenceConfig, key: &str, raw: &str) -> Result<PersistenceConfig> {
    let mut value = serde_json::to_value(current)?;
    let Some(map) = value.as_object_mut() else {
        bail!("Settings are not an object");
    };
    if !map.contains_key(key) {
        bail!(
            "Unknown setting '{}'. Known settings: {}",
            key,
            map.keys().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    let replacement = match map.get(key) {
        Some(Value::Bool(_)) => Value::Bool(
            raw.parse::<bool>()
                .with_context(|| format!("'{}' expects true or false", key))?,
        ),
        Some(Value::Number(_)) => Value::from(
            raw.parse::<u64>()
                .with_context(|| format!("'{}' expects milliseconds", key))?,
        ),
        _ => Value::String(raw.to_string()),
    };
    map.insert(key.to_string(), replacement);

    Ok(serde_json::from_value(value)?)
}
