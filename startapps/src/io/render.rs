//! Rendering of module output documents.
//!
//! Output templates are minijinja templates. The template context maps every
//! answered question of the task to its value; module answers expand to the
//! context of their sub-task.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::Environment;
use pulldown_cmark::{Parser, html};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::module::TemplateFormat;
use crate::io::store::{ExtendedAnswer, Store, TaskId};

/// A rendering of a document, as written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Html,
    Markdown,
}

/// One rendered output document of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    pub renderings: BTreeMap<DocumentFormat, String>,
}

impl OutputDocument {
    pub fn get(&self, format: DocumentFormat) -> Option<&str> {
        self.renderings.get(&format).map(String::as_str)
    }
}

/// Turns a task into its output documents.
pub trait DocumentRenderer {
    fn render<S: Store>(&self, store: &S, task: TaskId) -> Result<Vec<OutputDocument>>;
}

/// Template engine wrapper around minijinja.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }
}

impl DocumentRenderer for TemplateRenderer {
    fn render<S: Store>(&self, store: &S, task: TaskId) -> Result<Vec<OutputDocument>> {
        let module = store.task_module(task)?;
        if module.spec.output.is_empty() {
            return Ok(Vec::new());
        }
        let context = answer_context(store, task)?;

        let mut documents = Vec::with_capacity(module.spec.output.len());
        for (i, output) in module.spec.output.iter().enumerate() {
            let label = output.id.clone().unwrap_or_else(|| i.to_string());
            let text = self
                .env
                .render_str(&output.template, &context)
                .with_context(|| {
                    format!("render output '{label}' of module '{}'", module.spec.id)
                })?;
            let mut renderings = BTreeMap::new();
            match output.format {
                TemplateFormat::Markdown => {
                    renderings.insert(DocumentFormat::Html, markdown_to_html(&text));
                    renderings.insert(DocumentFormat::Markdown, text);
                }
                TemplateFormat::Html => {
                    renderings.insert(DocumentFormat::Html, text);
                }
            }
            documents.push(OutputDocument {
                id: output.id.clone(),
                title: output.title.clone(),
                renderings,
            });
        }
        debug!(%task, count = documents.len(), "rendered documents");
        Ok(documents)
    }
}

fn markdown_to_html(markdown: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new(markdown));
    out
}

/// Template context for `task`: question key to answer value.
pub fn answer_context<S: Store>(store: &S, task: TaskId) -> Result<Value> {
    let mut context = Map::new();
    for (key, answer) in store.answers(task)? {
        let value = match answer {
            ExtendedAnswer::Value(value) => value,
            ExtendedAnswer::Module { task: Some(sub) } => answer_context(store, sub)?,
            ExtendedAnswer::Module { task: None } => Value::Null,
            ExtendedAnswer::ModuleSet { tasks } => Value::Array(
                tasks
                    .into_iter()
                    .map(|sub| answer_context(store, sub))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        context.insert(key, value);
    }
    Ok(Value::Object(context))
}
