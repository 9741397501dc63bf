//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use shinryo_feed::config::FeedConfig;
use shinryo_feed::Variant;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "SHINRYO_FEED_CONFIG";
pub const OUTPUT_ENV: &str = "SHINRYO_FEED_OUTPUT";
pub const LOCAL_CONFIG_FILE: &str = "shinryo-feed.json";

/// Resolve the config file path.
///
/// `--config` flag, then `SHINRYO_FEED_CONFIG`, then `./shinryo-feed.json`
/// when it exists. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    pick_config_path(
        explicit,
        std::env::var(CONFIG_ENV).ok(),
        Path::new(LOCAL_CONFIG_FILE),
    )
}

fn pick_config_path(
    explicit: Option<&Path>,
    env_path: Option<String>,
    local: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    local.exists().then(|| local.to_path_buf())
}

/// Load the run configuration.
///
/// Fields missing from the file keep the defaults of the selected variant.
/// `variant` (from `--variant`) wins over the file's own `variant`.
pub fn load_config(path: Option<&Path>, variant: Option<Variant>) -> Result<FeedConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config = parse_config(&text, variant)
                .with_context(|| format!("invalid config {}", path.display()))?;
            info!("config: {}", path.display());
            config
        }
        None => {
            debug!("no config file, using built-in defaults");
            FeedConfig::for_variant(variant.unwrap_or_default())
        }
    };
    config.validate()?;
    Ok(config)
}

/// Overlay a JSON config document onto the defaults of its variant.
pub fn parse_config(text: &str, variant: Option<Variant>) -> Result<FeedConfig> {
    let overrides: Value = serde_json::from_str(text)?;
    let Value::Object(overrides) = overrides else {
        anyhow::bail!("config must be a JSON object");
    };

    let variant = match (variant, overrides.get("variant")) {
        (Some(v), _) => v,
        (None, Some(v)) => serde_json::from_value(v.clone())?,
        (None, None) => Variant::default(),
    };

    let mut merged = serde_json::to_value(FeedConfig::for_variant(variant))?;
    if let Value::Object(base) = &mut merged {
        for (key, value) in overrides {
            base.insert(key, value);
        }
        base.insert("variant".to_string(), serde_json::to_value(variant)?);
    }
    Ok(serde_json::from_value(merged)?)
}

/// Resolve the feed output path.
///
/// `--output` flag, then `SHINRYO_FEED_OUTPUT`, then the config value.
pub fn resolve_output_path(explicit: Option<&Path>, config: &FeedConfig) -> PathBuf {
    pick_output_path(explicit, std::env::var(OUTPUT_ENV).ok(), config)
}

fn pick_output_path(
    explicit: Option<&Path>,
    env_path: Option<String>,
    config: &FeedConfig,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    config.output_path.clone()
}
