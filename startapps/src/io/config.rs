//! Driver configuration read from an optional `startapps.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::render::DocumentFormat;

/// File name looked up next to the data file.
pub const CONFIG_FILE_NAME: &str = "startapps.toml";

/// Driver configuration (TOML).
///
/// Every field is optional in the file; missing fields fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Module started as the root task of every app.
    pub root_module: String,

    /// Channel recorded on answers saved by the driver.
    pub answer_channel: String,

    /// Base directory for relative local source paths. Defaults to the data
    /// file's directory.
    pub app_root: Option<PathBuf>,

    /// Files written per output document, in order.
    pub outputs: Vec<OutputFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputFormat {
    /// File extension, without the dot.
    pub extension: String,
    /// Document rendering written under that extension.
    pub format: DocumentFormat,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            root_module: "app".to_string(),
            answer_channel: "api".to_string(),
            app_root: None,
            outputs: vec![
                OutputFormat {
                    extension: "html".to_string(),
                    format: DocumentFormat::Html,
                },
                OutputFormat {
                    extension: "md".to_string(),
                    format: DocumentFormat::Markdown,
                },
            ],
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.root_module.trim().is_empty() {
            return Err(anyhow!("root_module must be non-empty"));
        }
        if self.answer_channel.trim().is_empty() {
            return Err(anyhow!("answer_channel must be non-empty"));
        }
        if self.outputs.is_empty() {
            return Err(anyhow!("outputs must list at least one format"));
        }
        for output in &self.outputs {
            let ext = output.extension.as_str();
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(anyhow!(
                    "output extension must be [A-Za-z0-9]+ (got '{ext}')"
                ));
            }
        }
        Ok(())
    }

    /// Directory relative local source paths resolve against.
    pub fn resolve_app_root(&self, data_dir: &Path) -> PathBuf {
        match &self.app_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => data_dir.join(root),
            None => data_dir.to_path_buf(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DriverConfig::default()`.
pub fn load_config(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        let cfg = DriverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DriverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
