//! App definitions: modules, questions, and output templates.
//!
//! Module files are YAML documents; see `schemas/app_module/v1.schema.json`
//! for the accepted shape. Cross-module rules live in [`validate_app`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

/// A loaded app: its name and every module it defines.
#[derive(Debug, Clone, PartialEq)]
pub struct AppDefinition {
    pub name: String,
    pub modules: Vec<ModuleSpec>,
}

impl AppDefinition {
    pub fn module(&self, id: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|module| module.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleSpec {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Protocols this module implements.
    #[serde(default, deserialize_with = "one_or_many")]
    pub protocol: Vec<String>,
    /// Questions in declaration order.
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub output: Vec<OutputTemplate>,
}

impl ModuleSpec {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuestionSpec {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Fixed module type for `module`/`module-set` questions.
    #[serde(default)]
    pub module_id: Option<String>,
    /// Protocols an app must implement to answer this question.
    #[serde(default, deserialize_with = "one_or_many")]
    pub protocol: Vec<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl QuestionSpec {
    /// True for a `module` question whose sub-module is fixed by the app.
    pub fn has_fixed_module(&self) -> bool {
        self.kind == QuestionType::Module && self.module_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    Text,
    Longtext,
    Email,
    Url,
    #[serde(rename = "yesno")]
    YesNo,
    Choice,
    MultipleChoice,
    Integer,
    Real,
    Date,
    Interstitial,
    Module,
    ModuleSet,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Longtext => "longtext",
            Self::Email => "email",
            Self::Url => "url",
            Self::YesNo => "yesno",
            Self::Choice => "choice",
            Self::MultipleChoice => "multiple-choice",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Date => "date",
            Self::Interstitial => "interstitial",
            Self::Module => "module",
            Self::ModuleSet => "module-set",
        }
    }

    pub fn is_module(self) -> bool {
        matches!(self, Self::Module | Self::ModuleSet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub key: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// One output document a module renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub format: TemplateFormat,
    pub template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    Markdown,
    Html,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
    })
}

/// Check cross-module rules that JSON Schema cannot express:
/// - Module ids are unique and the root module exists
/// - Question ids are unique within a module
/// - `module`/`module-set` questions name a `module-id` or a `protocol`
/// - `module-id` targets exist in the same app
/// - Fixed `module-id` references do not form a cycle
pub fn validate_app(app: &AppDefinition, root_module: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for module in &app.modules {
        if !seen.insert(module.id.as_str()) {
            errors.push(format!("duplicate module id '{}'", module.id));
        }
    }
    if app.module(root_module).is_none() {
        errors.push(format!("missing root module '{root_module}'"));
    }

    for module in &app.modules {
        let mut question_ids = HashSet::new();
        for question in &module.questions {
            let path = format!("{}/{}", module.id, question.id);
            if !question_ids.insert(question.id.as_str()) {
                errors.push(format!("{path}: duplicate question id"));
            }
            if question.kind.is_module() {
                if question.module_id.is_none() && question.protocol.is_empty() {
                    errors.push(format!(
                        "{path}: {} question needs a module-id or a protocol",
                        question.kind.as_str()
                    ));
                }
            } else if question.module_id.is_some() {
                errors.push(format!(
                    "{path}: module-id is only allowed on module questions"
                ));
            }
            if let Some(target) = &question.module_id
                && app.module(target).is_none()
            {
                errors.push(format!("{path}: unknown module-id '{target}'"));
            }
        }
    }

    if let Some(cycle) = find_cycle(app) {
        errors.push(format!("module-id cycle: {}", cycle.join(" -> ")));
    }

    errors
}

/// Depth-first search over fixed `module-id` edges.
fn find_cycle(app: &AppDefinition) -> Option<Vec<String>> {
    let edges: BTreeMap<&str, Vec<&str>> = app
        .modules
        .iter()
        .map(|module| {
            let targets = module
                .questions
                .iter()
                .filter_map(|q| q.module_id.as_deref())
                .collect();
            (module.id.as_str(), targets)
        })
        .collect();

    let mut done = HashSet::new();
    for &start in edges.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = visit(start, &edges, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|seen| *seen == node) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }
    path.push(node);
    for &next in edges.get(node).into_iter().flatten() {
        if let Some(cycle) = visit(next, edges, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixed_module_question, module, protocol_question, question};

    fn app(modules: Vec<ModuleSpec>) -> AppDefinition {
        AppDefinition {
            name: "sample".to_string(),
            modules,
        }
    }

    #[test]
    fn parses_module_yaml() {
        let spec: ModuleSpec = serde_yaml::from_str(
            r##"
id: app
title: Sample
protocol: system
questions:
  - id: q1
    type: text
  - id: q2
    type: module
    module-id: sub
  - id: owners
    type: module-set
    protocol: [person]
output:
  - id: ssp
    format: markdown
    template: "# {{ q1 }}"
"##,
        )
        .expect("parse");
        assert_eq!(spec.protocol, vec!["system".to_string()]);
        assert_eq!(spec.questions.len(), 3);
        assert!(spec.questions[1].has_fixed_module());
        assert_eq!(spec.questions[2].kind, QuestionType::ModuleSet);
        assert_eq!(spec.questions[2].protocol, vec!["person".to_string()]);
        assert_eq!(spec.output[0].format, TemplateFormat::Markdown);
    }

    #[test]
    fn valid_app_has_no_errors() {
        let app = app(vec![
            module(
                "app",
                vec![
                    question("q1", QuestionType::Text),
                    fixed_module_question("q2", "sub"),
                    protocol_question("owner", QuestionType::Module, &["person"]),
                ],
            ),
            module("sub", vec![question("name", QuestionType::Text)]),
        ]);
        assert_eq!(validate_app(&app, "app"), Vec::<String>::new());
    }

    #[test]
    fn reports_structural_problems() {
        let mut untyped = question("m", QuestionType::Module);
        untyped.module_id = None;
        let mut misplaced = question("t", QuestionType::Text);
        misplaced.module_id = Some("app".to_string());
        let app = app(vec![
            module(
                "main",
                vec![
                    untyped,
                    misplaced,
                    fixed_module_question("gone", "missing"),
                    question("dup", QuestionType::Text),
                    question("dup", QuestionType::Text),
                ],
            ),
            module("main", Vec::new()),
        ]);

        let errors = validate_app(&app, "app");
        for needle in [
            "duplicate module id 'main'",
            "missing root module 'app'",
            "main/m: module question needs a module-id or a protocol",
            "main/t: module-id is only allowed",
            "unknown module-id 'missing'",
            "main/dup: duplicate question id",
        ] {
            assert!(
                errors.iter().any(|err| err.contains(needle)),
                "missing {needle:?} in {errors:?}"
            );
        }
    }

    #[test]
    fn detects_module_cycles() {
        let app = app(vec![
            module("app", vec![fixed_module_question("a", "left")]),
            module("left", vec![fixed_module_question("b", "right")]),
            module("right", vec![fixed_module_question("c", "left")]),
        ]);
        let errors = validate_app(&app, "app");
        assert!(
            errors
                .iter()
                .any(|err| err == "module-id cycle: left -> right -> left"),
            "{errors:?}"
        );
    }
}
