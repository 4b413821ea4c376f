//! App source connections.
//!
//! A source spec (a mapping with a `type` key) is opened into a
//! [`SourceConnection`], which loads named apps from wherever the source keeps
//! them. [`LocalConnector`] reads app directories from the filesystem; tests
//! use in-memory connectors.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::debug;

use crate::core::module::{AppDefinition, ModuleSpec, validate_app};

const MODULE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/app_module/v1.schema.json"
));

/// Opens source specs into connections.
pub trait SourceConnector {
    fn open(&self, spec: &Value) -> Result<Box<dyn SourceConnection + '_>>;
}

/// An open connection to a repository of app definitions.
pub trait SourceConnection {
    /// Human-readable label for log lines.
    fn description(&self) -> String;

    /// Fetch and parse the named app.
    fn get_app(&self, name: &str) -> Result<AppDefinition>;
}

/// Connector for `{type: local, path: <dir>}` sources.
///
/// An app named `x` is the directory `<dir>/x/`; each `*.yaml` file in it is
/// one module, and the file stem must equal the module id.
pub struct LocalConnector {
    root: PathBuf,
    root_module: String,
    schema: Validator,
}

impl LocalConnector {
    /// `root` is the base for relative source paths.
    pub fn new(root: impl Into<PathBuf>, root_module: &str) -> Result<Self> {
        let schema_value: Value =
            serde_json::from_str(MODULE_SCHEMA).context("parse module schema")?;
        let schema =
            validator_for(&schema_value).map_err(|err| anyhow!("invalid module schema: {err}"))?;
        Ok(Self {
            root: root.into(),
            root_module: root_module.to_string(),
            schema,
        })
    }
}

impl SourceConnector for LocalConnector {
    fn open(&self, spec: &Value) -> Result<Box<dyn SourceConnection + '_>> {
        let kind = spec.get("type").and_then(Value::as_str).unwrap_or("");
        if kind != "local" {
            bail!("unsupported app source type '{kind}' in {spec}");
        }
        let path = spec
            .get("path")
            .and_then(Value::as_str)
            .with_context(|| format!("local source needs a 'path' string: {spec}"))?;
        let dir = self.root.join(path);
        if !dir.is_dir() {
            bail!("app source directory {} does not exist", dir.display());
        }
        debug!(dir = %dir.display(), "opened local source");
        Ok(Box::new(LocalConnection {
            dir,
            label: path.to_string(),
            connector: self,
        }))
    }
}

struct LocalConnection<'a> {
    dir: PathBuf,
    label: String,
    connector: &'a LocalConnector,
}

impl SourceConnection for LocalConnection<'_> {
    fn description(&self) -> String {
        let label = if self.label.is_empty() { "." } else { self.label.as_str() };
        format!("local directory {label}")
    }

    fn get_app(&self, name: &str) -> Result<AppDefinition> {
        if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
            bail!("invalid app name '{name}'");
        }
        let app_dir = self.dir.join(name);
        if !app_dir.is_dir() {
            bail!("app '{name}' not found in {}", self.description());
        }

        let modules = module_files(&app_dir)?
            .iter()
            .map(|path| self.load_module(path))
            .collect::<Result<Vec<_>>>()?;
        let app = AppDefinition {
            name: name.to_string(),
            modules,
        };

        let errors = validate_app(&app, &self.connector.root_module);
        if !errors.is_empty() {
            bail!("invalid app '{name}':\n- {}", errors.join("\n- "));
        }
        Ok(app)
    }
}

impl LocalConnection<'_> {
    fn load_module(&self, path: &Path) -> Result<ModuleSpec> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let raw: Value = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse {}", path.display()))?;

        let messages: Vec<String> = self
            .connector
            .schema
            .iter_errors(&raw)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            bail!(
                "module schema validation failed for {}:\n- {}",
                path.display(),
                messages.join("\n- ")
            );
        }

        let spec: ModuleSpec = serde_json::from_value(raw)
            .with_context(|| format!("deserialize module {}", path.display()))?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if spec.id != stem {
            bail!(
                "module id '{}' does not match file name {}",
                spec.id,
                path.display()
            );
        }
        Ok(spec)
    }
}

/// `*.yaml` files in `dir`, sorted by name.
fn module_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read dir entry in {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
