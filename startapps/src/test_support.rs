//! Test-only helpers: module builders, an in-memory source, and on-disk app
//! fixtures.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::module::{AppDefinition, Choice, ModuleSpec, QuestionSpec, QuestionType};
use crate::io::source::{SourceConnection, SourceConnector};
use crate::io::store::{Store, TaskId, UserId};

/// Module with the given questions and no outputs.
pub fn module(id: &str, questions: Vec<QuestionSpec>) -> ModuleSpec {
    ModuleSpec {
        id: id.to_string(),
        title: Some(format!("{id} title")),
        protocol: Vec::new(),
        questions,
        output: Vec::new(),
    }
}

/// Question of `kind` with no module type, protocol, or choices.
pub fn question(id: &str, kind: QuestionType) -> QuestionSpec {
    QuestionSpec {
        id: id.to_string(),
        title: None,
        kind,
        module_id: None,
        protocol: Vec::new(),
        choices: Vec::new(),
        min: None,
        max: None,
    }
}

/// `module` question answered by a sub-task of module `target`.
pub fn fixed_module_question(id: &str, target: &str) -> QuestionSpec {
    QuestionSpec {
        module_id: Some(target.to_string()),
        ..question(id, QuestionType::Module)
    }
}

/// `module`/`module-set` question answered by apps implementing `protocols`.
pub fn protocol_question(id: &str, kind: QuestionType, protocols: &[&str]) -> QuestionSpec {
    QuestionSpec {
        protocol: protocols.iter().map(|p| p.to_string()).collect(),
        ..question(id, kind)
    }
}

pub fn choice_question(id: &str, kind: QuestionType, keys: &[&str]) -> QuestionSpec {
    QuestionSpec {
        choices: keys
            .iter()
            .map(|key| Choice {
                key: key.to_string(),
                text: None,
            })
            .collect(),
        ..question(id, kind)
    }
}

pub fn app_definition(name: &str, modules: Vec<ModuleSpec>) -> AppDefinition {
    AppDefinition {
        name: name.to_string(),
        modules,
    }
}

/// Load `app` into `store` and start its `app` module as a root task.
pub fn root_task<S: Store>(store: &mut S, app: AppDefinition) -> (TaskId, UserId) {
    let org = store.create_organization("test-org").expect("organization");
    let user = store.create_user("test-user").expect("user");
    let source = store
        .create_app_source(
            &format!("test_source_{}", app.name),
            &serde_json::json!({"type": "test"}),
        )
        .expect("source");
    let instance = store.load_app(source, "test source", app).expect("load app");
    let module = store.find_module(instance, "app").expect("root module");
    let project = store.create_project(org).expect("project");
    let task = store.set_root_task(project, module, user).expect("root task");
    (task, user)
}

/// In-memory connector serving apps by name from any source spec.
///
/// Records how often sources are opened and which apps are fetched.
#[derive(Default)]
pub struct FakeConnector {
    apps: HashMap<String, AppDefinition>,
    opens: Cell<usize>,
    loads: RefCell<Vec<String>>,
}

impl FakeConnector {
    pub fn with_app(mut self, app: AppDefinition) -> Self {
        self.apps.insert(app.name.clone(), app);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    /// App names passed to `get_app`, in call order.
    pub fn loads(&self) -> Vec<String> {
        self.loads.borrow().clone()
    }
}

impl SourceConnector for FakeConnector {
    fn open(&self, spec: &Value) -> Result<Box<dyn SourceConnection + '_>> {
        self.opens.set(self.opens.get() + 1);
        Ok(Box::new(FakeConnection {
            connector: self,
            label: format!("fake source {spec}"),
        }))
    }
}

struct FakeConnection<'a> {
    connector: &'a FakeConnector,
    label: String,
}

impl SourceConnection for FakeConnection<'_> {
    fn description(&self) -> String {
        self.label.clone()
    }

    fn get_app(&self, name: &str) -> Result<AppDefinition> {
        self.connector.loads.borrow_mut().push(name.to_string());
        match self.connector.apps.get(name) {
            Some(app) => Ok(app.clone()),
            None => bail!("app '{name}' not found in {}", self.label),
        }
    }
}

/// Temporary directory for writing app sources and data files.
pub struct AppFixture {
    dir: TempDir,
}

impl AppFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `<rel_dir>/<module>.yaml` for every `(module, yaml)` pair.
    pub fn write_app(&self, rel_dir: &str, modules: &[(&str, &str)]) -> Result<()> {
        let dir = self.root().join(rel_dir);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        for (name, yaml) in modules {
            let path = dir.join(format!("{name}.yaml"));
            fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(())
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> Result<()> {
        let path = self.root().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }
}
