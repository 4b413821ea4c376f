//! Orchestration for one driver run: data file in, documents out.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::bind::BindSummary;
use crate::io::config::{CONFIG_FILE_NAME, DriverConfig, load_config};
use crate::io::output::write_outputs;
use crate::io::render::{DocumentRenderer, TemplateRenderer};
use crate::io::source::{LocalConnector, SourceConnector};
use crate::io::store::{MemoryStore, Store, TaskId};
use crate::io::validator::{AnswerValidator, BuiltinValidator};
use crate::outputs::generate_task_outputs;
use crate::run_context::RunContext;

/// The YAML driver file: which app to start and the answers to give it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataFile {
    #[serde(default)]
    pub app: Value,
    #[serde(default = "empty_list")]
    pub questions: Value,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub root: TaskId,
    /// Binding summary of the root task.
    pub summary: BindSummary,
    pub files_written: usize,
}

pub fn load_data_file(path: &Path) -> Result<DataFile> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Start the app described by `data_path` and write its documents to `outdir`.
///
/// Uses `startapps.toml` next to the data file when present, an in-memory
/// store, and local app sources resolved against the configured app root.
pub fn start_apps(data_path: &Path, outdir: &Path) -> Result<RunOutcome> {
    let data_dir = data_path.parent().unwrap_or_else(|| Path::new(""));
    let config = load_config(&data_dir.join(CONFIG_FILE_NAME))?;
    let data = load_data_file(data_path)?;
    let connector = LocalConnector::new(config.resolve_app_root(data_dir), &config.root_module)?;
    let mut store = MemoryStore::default();
    run_with(
        &mut store,
        &connector,
        &BuiltinValidator,
        &TemplateRenderer::new(),
        &config,
        &data,
        outdir,
    )
}

/// Run with explicit collaborators.
pub fn run_with<S, C, V, R>(
    store: &mut S,
    connector: &C,
    validator: &V,
    renderer: &R,
    config: &DriverConfig,
    data: &DataFile,
    outdir: &Path,
) -> Result<RunOutcome>
where
    S: Store,
    C: SourceConnector,
    V: AnswerValidator,
    R: DocumentRenderer,
{
    let (root, summary) = {
        let mut ctx = RunContext::new(store, connector, validator, config)?;
        let root = ctx.start_app(&data.app).context("start app")?;
        let summary = ctx.set_answers(root, &data.questions)?;
        (root, summary)
    };

    let documents = generate_task_outputs(&*store, renderer, Vec::new(), root);
    let files_written = write_outputs(outdir, documents, &config.outputs)?;
    info!(
        bound = summary.bound.len(),
        not_answered = summary.not_answered.len(),
        files = files_written,
        "run complete"
    );
    Ok(RunOutcome {
        root,
        summary,
        files_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_file_defaults_questions_to_empty_list() {
        let data: DataFile = serde_yaml::from_str("app: apps/sample\n").expect("parse");
        assert_eq!(data.app, Value::String("apps/sample".to_string()));
        assert_eq!(data.questions, empty_list());
    }

    #[test]
    fn missing_app_is_an_invalid_reference() {
        let temp = tempfile::tempdir().expect("tempdir");
        let data_path = temp.path().join("data.yaml");
        fs::write(&data_path, "questions: []\n").expect("write");

        let err = start_apps(&data_path, &temp.path().join("out")).expect_err("should fail");
        assert!(format!("{err:#}").contains("invalid app reference"));
        assert!(!temp.path().join("out").exists());
    }
}
