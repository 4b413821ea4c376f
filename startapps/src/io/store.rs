//! Persistence boundary for apps, tasks, and answers.
//!
//! The [`Store`] trait is the narrow repository interface the instantiation
//! and binding code talks to. [`MemoryStore`] keeps everything in memory for
//! the lifetime of one run; runs operate on disposable placeholder data, so
//! nothing needs to outlive the process.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tracing::debug;

use crate::core::module::{AppDefinition, ModuleSpec, QuestionSpec, QuestionType};

macro_rules! record_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " #{}"), self.0)
            }
        }
    };
}

record_id!(OrganizationId, "organization");
record_id!(UserId, "user");
record_id!(SourceId, "source");
record_id!(AppInstanceId, "app");
record_id!(ModuleId, "module");
record_id!(ProjectId, "project");
record_id!(TaskId, "task");

#[derive(Debug, Clone, PartialEq)]
pub struct AppSourceRecord {
    pub slug: String,
    pub spec: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppInstanceRecord {
    pub source: SourceId,
    pub name: String,
    pub source_description: String,
    pub modules: Vec<ModuleId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRecord {
    pub app: AppInstanceId,
    pub spec: ModuleSpec,
}

impl ModuleRecord {
    pub fn question(&self, key: &str) -> Option<&QuestionSpec> {
        self.spec.questions.iter().find(|q| q.id == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub project: ProjectId,
    pub module: ModuleId,
    pub owner: UserId,
}

/// Value persisted for one question of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    /// A validated scalar (or list, for multiple-choice) value.
    Value(Value),
    /// Sub-tasks answering a `module` or `module-set` question.
    Tasks(Vec<TaskId>),
}

/// One `save_answer` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAnswer {
    pub value: AnswerValue,
    pub actor: UserId,
    pub channel: String,
}

/// Answers as seen by renderers: module answers expose their bound task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedAnswer {
    Value(Value),
    Module { task: Option<TaskId> },
    ModuleSet { tasks: Vec<TaskId> },
}

/// Repository operations needed to instantiate apps and bind answers.
pub trait Store {
    fn create_organization(&mut self, subdomain: &str) -> Result<OrganizationId>;

    fn create_user(&mut self, username: &str) -> Result<UserId>;

    fn create_app_source(&mut self, slug: &str, spec: &Value) -> Result<SourceId>;

    fn app_source(&self, id: SourceId) -> Result<&AppSourceRecord>;

    /// Materialize an app definition loaded from `source`.
    ///
    /// Loading the same app name from the same source again returns the
    /// existing instance.
    fn load_app(
        &mut self,
        source: SourceId,
        source_description: &str,
        app: AppDefinition,
    ) -> Result<AppInstanceId>;

    fn app_instance(&self, id: AppInstanceId) -> Result<&AppInstanceRecord>;

    fn find_module(&self, app: AppInstanceId, name: &str) -> Result<ModuleId>;

    fn module(&self, id: ModuleId) -> Result<&ModuleRecord>;

    fn create_project(&mut self, organization: OrganizationId) -> Result<ProjectId>;

    fn set_root_task(&mut self, project: ProjectId, module: ModuleId, owner: UserId)
    -> Result<TaskId>;

    fn task(&self, id: TaskId) -> Result<&TaskRecord>;

    /// Return the sub-task for a fixed-module question, creating it on first use.
    fn get_or_create_subtask(&mut self, task: TaskId, question: &str, owner: UserId)
    -> Result<TaskId>;

    /// Record a new answer. Returns true if the stored value changed.
    fn save_answer(&mut self, task: TaskId, question: &str, save: SaveAnswer) -> Result<bool>;

    /// Current answers of `task` in question declaration order.
    fn answers(&self, task: TaskId) -> Result<Vec<(String, ExtendedAnswer)>>;

    /// Module backing `task`.
    fn task_module(&self, task: TaskId) -> Result<&ModuleRecord> {
        let module = self.task(task)?.module;
        self.module(module)
    }

    /// Human-readable task label for log lines.
    fn describe_task(&self, task: TaskId) -> Result<String> {
        let module = self.task_module(task)?;
        let app = self.app_instance(module.app)?;
        Ok(format!(
            "{} ({}/{}, {})",
            module.spec.display_title(),
            app.name,
            module.spec.id,
            task
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredAnswer {
    /// Every saved value, oldest first.
    history: Vec<SaveAnswer>,
}

/// In-memory [`Store`] scoped to a single run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    organizations: Vec<String>,
    users: Vec<String>,
    sources: Vec<AppSourceRecord>,
    apps: Vec<AppInstanceRecord>,
    modules: Vec<ModuleRecord>,
    projects: Vec<OrganizationId>,
    tasks: Vec<TaskRecord>,
    subtasks: HashMap<(TaskId, String), TaskId>,
    answers: HashMap<(TaskId, String), StoredAnswer>,
}

impl MemoryStore {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn app_instance_count(&self) -> usize {
        self.apps.len()
    }

    pub fn app_source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of saved values for one question, including superseded ones.
    pub fn answer_history_len(&self, task: TaskId, question: &str) -> usize {
        self.answers
            .get(&(task, question.to_string()))
            .map_or(0, |stored| stored.history.len())
    }

    /// Most recent save for one question, with who saved it and how.
    pub fn latest_save(&self, task: TaskId, question: &str) -> Option<&SaveAnswer> {
        self.answers
            .get(&(task, question.to_string()))
            .and_then(|stored| stored.history.last())
    }

    pub fn answer(&self, task: TaskId, question: &str) -> Option<&AnswerValue> {
        self.latest_save(task, question).map(|save| &save.value)
    }

    fn new_task(&mut self, project: ProjectId, module: ModuleId, owner: UserId) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(TaskRecord {
            project,
            module,
            owner,
        });
        debug!(task = %id, module = %module, "created task");
        id
    }
}

fn lookup<'a, T>(items: &'a [T], index: usize, what: &str) -> Result<&'a T> {
    items
        .get(index)
        .ok_or_else(|| anyhow!("unknown {what} #{index}"))
}

impl Store for MemoryStore {
    fn create_organization(&mut self, subdomain: &str) -> Result<OrganizationId> {
        self.organizations.push(subdomain.to_string());
        Ok(OrganizationId(self.organizations.len() - 1))
    }

    fn create_user(&mut self, username: &str) -> Result<UserId> {
        self.users.push(username.to_string());
        Ok(UserId(self.users.len() - 1))
    }

    fn create_app_source(&mut self, slug: &str, spec: &Value) -> Result<SourceId> {
        if self.sources.iter().any(|source| source.slug == slug) {
            bail!("app source slug '{slug}' already exists");
        }
        self.sources.push(AppSourceRecord {
            slug: slug.to_string(),
            spec: spec.clone(),
        });
        Ok(SourceId(self.sources.len() - 1))
    }

    fn app_source(&self, id: SourceId) -> Result<&AppSourceRecord> {
        lookup(&self.sources, id.0, "app source")
    }

    fn load_app(
        &mut self,
        source: SourceId,
        source_description: &str,
        app: AppDefinition,
    ) -> Result<AppInstanceId> {
        self.app_source(source)?;
        if let Some(pos) = self
            .apps
            .iter()
            .position(|existing| existing.source == source && existing.name == app.name)
        {
            debug!(app = %app.name, %source, "app already loaded");
            return Ok(AppInstanceId(pos));
        }

        let id = AppInstanceId(self.apps.len());
        let mut modules = Vec::with_capacity(app.modules.len());
        for spec in app.modules {
            modules.push(ModuleId(self.modules.len()));
            self.modules.push(ModuleRecord { app: id, spec });
        }
        self.apps.push(AppInstanceRecord {
            source,
            name: app.name,
            source_description: source_description.to_string(),
            modules,
        });
        Ok(id)
    }

    fn app_instance(&self, id: AppInstanceId) -> Result<&AppInstanceRecord> {
        lookup(&self.apps, id.0, "app instance")
    }

    fn find_module(&self, app: AppInstanceId, name: &str) -> Result<ModuleId> {
        let record = self.app_instance(app)?;
        record
            .modules
            .iter()
            .copied()
            .find(|id| self.modules[id.0].spec.id == name)
            .with_context(|| format!("app '{}' has no module '{name}'", record.name))
    }

    fn module(&self, id: ModuleId) -> Result<&ModuleRecord> {
        lookup(&self.modules, id.0, "module")
    }

    fn create_project(&mut self, organization: OrganizationId) -> Result<ProjectId> {
        lookup(&self.organizations, organization.0, "organization")?;
        self.projects.push(organization);
        Ok(ProjectId(self.projects.len() - 1))
    }

    fn set_root_task(
        &mut self,
        project: ProjectId,
        module: ModuleId,
        owner: UserId,
    ) -> Result<TaskId> {
        lookup(&self.projects, project.0, "project")?;
        self.module(module)?;
        Ok(self.new_task(project, module, owner))
    }

    fn task(&self, id: TaskId) -> Result<&TaskRecord> {
        lookup(&self.tasks, id.0, "task")
    }

    fn get_or_create_subtask(
        &mut self,
        task: TaskId,
        question: &str,
        owner: UserId,
    ) -> Result<TaskId> {
        let key = (task, question.to_string());
        if let Some(existing) = self.subtasks.get(&key) {
            return Ok(*existing);
        }

        let parent = self.task(task)?.clone();
        let module = self.module(parent.module)?;
        let spec = module
            .question(question)
            .with_context(|| format!("module '{}' has no question '{question}'", module.spec.id))?;
        let target = spec
            .module_id
            .clone()
            .with_context(|| format!("question '{question}' has no fixed module type"))?;
        let kind = spec.kind;
        let sub_module = self.find_module(module.app, &target)?;

        let sub = self.new_task(parent.project, sub_module, owner);
        self.subtasks.insert(key, sub);
        if kind == QuestionType::Module && self.answer(task, question).is_none() {
            self.save_answer(
                task,
                question,
                SaveAnswer {
                    value: AnswerValue::Tasks(vec![sub]),
                    actor: owner,
                    channel: "subtask".to_string(),
                },
            )?;
        }
        Ok(sub)
    }

    fn save_answer(&mut self, task: TaskId, question: &str, save: SaveAnswer) -> Result<bool> {
        if self.task_module(task)?.question(question).is_none() {
            bail!("{task} has no question '{question}'");
        }
        let stored = self
            .answers
            .entry((task, question.to_string()))
            .or_insert_with(|| StoredAnswer {
                history: Vec::new(),
            });
        if stored.history.last().map(|last| &last.value) == Some(&save.value) {
            return Ok(false);
        }
        debug!(%task, question, channel = %save.channel, "saved answer");
        stored.history.push(save);
        Ok(true)
    }

    fn answers(&self, task: TaskId) -> Result<Vec<(String, ExtendedAnswer)>> {
        let module = self.task_module(task)?;
        let mut out = Vec::new();
        for question in &module.spec.questions {
            let Some(value) = self.answer(task, &question.id) else {
                continue;
            };
            let extended = match (question.kind, value) {
                (QuestionType::Module, AnswerValue::Tasks(tasks)) => ExtendedAnswer::Module {
                    task: tasks.first().copied(),
                },
                (_, AnswerValue::Tasks(tasks)) => ExtendedAnswer::ModuleSet {
                    tasks: tasks.clone(),
                },
                (_, AnswerValue::Value(value)) => ExtendedAnswer::Value(value.clone()),
            };
            out.push((question.id.clone(), extended));
        }
        Ok(out)
    }
}
