//! Binding answer data onto a task tree.
//!
//! [`RunContext::set_answers`] visits every question of a task's module in
//! declaration order and hands each one, with its answer record if any, to
//! [`RunContext::set_answer`]. Module questions recurse into sub-tasks, which
//! may belong to other apps started on the fly.
//!
//! Bad values and protocol mismatches leave the question unanswered and the
//! run continues; malformed answer structure and app loading failures are
//! fatal.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::answer_record::{AnswerRecord, ModuleItem, decode_answer_list};
use crate::core::module::{QuestionSpec, QuestionType};
use crate::core::protocol::unsatisfied_protocols;
use crate::error::InputError;
use crate::io::source::SourceConnector;
use crate::io::store::{AnswerValue, SaveAnswer, Store, TaskId};
use crate::io::validator::AnswerValidator;
use crate::run_context::RunContext;

/// What happened to the questions of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindSummary {
    /// Every question key, in declaration order.
    pub visited: Vec<String>,
    /// Questions whose stored answer changed.
    pub bound: Vec<String>,
    /// Questions left without an answer (fixed-module questions excluded,
    /// since their sub-task always exists).
    pub not_answered: Vec<String>,
}

impl<S: Store, C: SourceConnector, V: AnswerValidator> RunContext<'_, S, C, V> {
    /// Bind an answer list onto `task`.
    ///
    /// `answers` must be a sequence. Entries without a usable `id` are dropped
    /// with a warning; a later entry for the same id replaces an earlier one.
    pub fn set_answers(&mut self, task: TaskId, answers: &Value) -> Result<BindSummary> {
        let label = self.store.describe_task(task)?;
        let decoded =
            decode_answer_list(answers).with_context(|| format!("answers for {label}"))?;
        for rejected in &decoded.rejected {
            warn!(
                task = %label,
                index = rejected.index,
                reason = %rejected.reason,
                "dropped answer record"
            );
        }

        info!(task = %label, "answering");
        let questions = self.store.task_module(task)?.spec.questions.clone();

        let known: BTreeSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        let unknown: BTreeSet<&str> = decoded
            .by_id
            .keys()
            .map(String::as_str)
            .filter(|id| !known.contains(id))
            .collect();
        if !unknown.is_empty() {
            warn!(
                task = %label,
                ids = %unknown.into_iter().collect::<Vec<_>>().join(", "),
                "answers given for questions this module does not have"
            );
        }

        let mut summary = BindSummary::default();
        for question in &questions {
            summary.visited.push(question.id.clone());
            if self.set_answer(task, question, decoded.get(&question.id))? {
                summary.bound.push(question.id.clone());
            } else if !question.has_fixed_module() {
                summary.not_answered.push(question.id.clone());
            }
        }
        if !summary.not_answered.is_empty() {
            info!(
                task = %label,
                questions = %summary.not_answered.join(", "),
                "there were no answers for some questions"
            );
        }
        Ok(summary)
    }

    /// Bind one question. Returns true if an answer was recorded.
    pub fn set_answer(
        &mut self,
        task: TaskId,
        question: &QuestionSpec,
        answer: Option<&AnswerRecord>,
    ) -> Result<bool> {
        // A fixed sub-module may render documents with no questions answered,
        // so its sub-task is started even when there is no answer.
        if question.has_fixed_module() {
            info!(question = %question.id, "starting sub-task");
            let sub = self
                .store
                .get_or_create_subtask(task, &question.id, self.placeholders.user)?;
            return match answer {
                Some(record) => {
                    self.set_answers(sub, &record.questions)?;
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        let Some(answer) = answer else {
            return Ok(false);
        };

        match question.kind {
            QuestionType::Module | QuestionType::ModuleSet => {
                self.set_module_answer(task, question, answer)
            }
            _ => self.set_value_answer(task, question, answer),
        }
    }

    fn set_module_answer(
        &mut self,
        task: TaskId,
        question: &QuestionSpec,
        answer: &AnswerRecord,
    ) -> Result<bool> {
        let items: Vec<ModuleItem> = if question.kind == QuestionType::Module {
            vec![answer.as_module_item()]
        } else {
            answer.module_set_items()?
        };

        let mut tasks = Vec::with_capacity(items.len());
        for item in &items {
            let sub = if question.module_id.is_some() {
                self.store
                    .get_or_create_subtask(task, &question.id, self.placeholders.user)?
            } else {
                let app = item.app.as_ref().ok_or_else(|| {
                    InputError::InvalidReference(format!(
                        "answer to '{}' needs an 'app'",
                        question.id
                    ))
                })?;
                let sub = self.start_app(app)?;

                let module = self.store.task_module(sub)?;
                let missing = unsatisfied_protocols(&question.protocol, &module.spec.protocol);
                if !missing.is_empty() {
                    let app_name = &self.store.app_instance(module.app)?.name;
                    warn!(
                        app = %app_name,
                        missing = %missing.into_iter().collect::<Vec<_>>().join(", "),
                        question = %question.id,
                        "app does not implement the protocols required to answer the question"
                    );
                    return Ok(false);
                }
                sub
            };

            self.set_answers(sub, &item.questions)?;
            tasks.push(sub);
        }

        let actor = self.store.task(task)?.owner;
        let changed = self.store.save_answer(
            task,
            &question.id,
            SaveAnswer {
                value: AnswerValue::Tasks(tasks.clone()),
                actor,
                channel: self.config.answer_channel.clone(),
            },
        )?;
        if changed {
            let ids: Vec<String> = tasks.iter().map(ToString::to_string).collect();
            info!(question = %question.id, tasks = %ids.join(", "), "answered");
        }
        Ok(changed)
    }

    fn set_value_answer(
        &mut self,
        task: TaskId,
        question: &QuestionSpec,
        answer: &AnswerRecord,
    ) -> Result<bool> {
        let raw = answer.answer.clone().unwrap_or(Value::Null);
        let value = match self.validator.validate(question, &raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(question = %question.id, reason = %err, "answer rejected");
                return Ok(false);
            }
        };

        let actor = self.store.task(task)?.owner;
        let changed = self.store.save_answer(
            task,
            &question.id,
            SaveAnswer {
                value: AnswerValue::Value(value.clone()),
                actor,
                channel: self.config.answer_channel.clone(),
            },
        )?;
        if changed {
            info!(question = %question.id, %value, "answered");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::module::ModuleSpec;
    use crate::io::config::DriverConfig;
    use crate::io::store::{ExtendedAnswer, MemoryStore};
    use crate::io::validator::BuiltinValidator;
    use crate::test_support::{
        FakeConnector, app_definition, fixed_module_question, module, protocol_question,
        question,
    };
    use serde_json::json;

    fn sample_modules() -> Vec<ModuleSpec> {
        vec![
            module(
                "app",
                vec![
                    question("q1", QuestionType::Text),
                    fixed_module_question("q2", "sub"),
                    question("size", QuestionType::Integer),
                    protocol_question("owner", QuestionType::Module, &["person"]),
                    protocol_question("members", QuestionType::ModuleSet, &["person"]),
                ],
            ),
            module("sub", vec![question("note", QuestionType::Text)]),
        ]
    }

    fn person(name: &str, protocols: &[&str]) -> crate::core::module::AppDefinition {
        let mut root = module("app", vec![question("email", QuestionType::Email)]);
        root.protocol = protocols.iter().map(|p| p.to_string()).collect();
        app_definition(name, vec![root])
    }

    fn connector() -> FakeConnector {
        FakeConnector::default()
            .with_app(app_definition("sample", sample_modules()))
            .with_app(person("alice", &["person"]))
            .with_app(person("bob", &["person"]))
            .with_app(person("robot", &[]))
    }

    #[test]
    fn visits_every_question_even_without_answers() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let summary = ctx.set_answers(root, &json!([])).expect("bind");
        assert_eq!(summary.visited, vec!["q1", "q2", "size", "owner", "members"]);
        assert!(summary.bound.is_empty());
        assert_eq!(summary.not_answered, vec!["q1", "size", "owner", "members"]);

        let answers = ctx.store().answers(root).expect("answers");
        assert!(matches!(
            answers.as_slice(),
            [(key, ExtendedAnswer::Module { task: Some(_) })] if key == "q2"
        ));
    }

    #[test]
    fn fixed_module_answer_recurses_into_subtask() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let summary = ctx
            .set_answers(
                root,
                &json!([{"id": "q2", "questions": [{"id": "note", "answer": "hello"}]}]),
            )
            .expect("bind");
        assert!(summary.bound.contains(&"q2".to_string()));

        let user = ctx.placeholders().user;
        let sub = ctx
            .store
            .get_or_create_subtask(root, "q2", user)
            .expect("sub");
        assert_eq!(
            store.answer(sub, "note"),
            Some(&AnswerValue::Value(json!("hello")))
        );
    }

    #[test]
    fn invalid_value_is_skipped_and_run_continues() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let summary = ctx
            .set_answers(
                root,
                &json!([
                    {"id": "size", "answer": "many"},
                    {"id": "q1", "answer": "yes"},
                ]),
            )
            .expect("bind");
        assert_eq!(summary.bound, vec!["q1"]);
        assert!(summary.not_answered.contains(&"size".to_string()));
        assert_eq!(store.answer(root, "size"), None);
        assert_eq!(store.answer_history_len(root, "size"), 0);
    }

    #[test]
    fn protocol_module_answer_starts_app_and_binds_it() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let summary = ctx
            .set_answers(
                root,
                &json!([{
                    "id": "owner",
                    "app": "people/alice",
                    "questions": [{"id": "email", "answer": "alice@example.gov"}],
                }]),
            )
            .expect("bind");
        assert_eq!(summary.bound, vec!["owner"]);

        let Some(AnswerValue::Tasks(tasks)) = store.answer(root, "owner").cloned() else {
            panic!("owner should hold a task");
        };
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            store.answer(tasks[0], "email"),
            Some(&AnswerValue::Value(json!("alice@example.gov")))
        );
        let owner = store.task(root).expect("root").owner;
        let save = store.latest_save(root, "owner").expect("saved");
        assert_eq!(save.actor, owner);
        assert_eq!(save.channel, "api");
        assert_eq!(
            store.latest_save(tasks[0], "email").expect("saved").actor,
            store.task(tasks[0]).expect("sub").owner
        );
    }

    #[test]
    fn module_set_fails_as_a_whole_on_protocol_mismatch() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let summary = ctx
            .set_answers(
                root,
                &json!([{
                    "id": "members",
                    "answers": [
                        {"app": "people/alice"},
                        {"app": "people/robot"},
                        {"app": "people/bob"},
                    ],
                }]),
            )
            .expect("bind");
        assert!(summary.not_answered.contains(&"members".to_string()));
        assert_eq!(store.answer(root, "members"), None);
        assert_eq!(connector.loads(), vec!["sample", "alice", "robot"]);
    }

    #[test]
    fn module_set_binds_all_items_in_order() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        ctx.set_answers(
            root,
            &json!([{
                "id": "members",
                "answers": [{"app": "people/alice"}, {"app": "people/bob"}],
            }]),
        )
        .expect("bind");

        let Some(AnswerValue::Tasks(tasks)) = store.answer(root, "members").cloned() else {
            panic!("members should hold tasks");
        };
        let apps: Vec<String> = tasks
            .iter()
            .map(|t| {
                let module = store.task_module(*t).expect("module");
                store.app_instance(module.app).expect("app").name.clone()
            })
            .collect();
        assert_eq!(apps, vec!["alice", "bob"]);
    }

    #[test]
    fn module_answer_without_app_is_fatal() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let err = ctx
            .set_answers(root, &json!([{"id": "owner"}]))
            .expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::InvalidReference(_))
        ));
    }

    #[test]
    fn non_list_answers_are_fatal() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");

        let err = ctx
            .set_answers(root, &json!({"q1": "yes"}))
            .expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::MalformedAnswers(_))
        ));
    }

    #[test]
    fn rebinding_same_answers_reports_no_change() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");
        let root = ctx.start_app(&json!("apps/sample")).expect("start");
        let answers = json!([{"id": "q1", "answer": "yes"}]);

        let first = ctx.set_answers(root, &answers).expect("first");
        let second = ctx.set_answers(root, &answers).expect("second");
        assert_eq!(first.bound, vec!["q1"]);
        assert!(second.bound.is_empty());
        assert_eq!(store.answer_history_len(root, "q1"), 1);
    }
}
