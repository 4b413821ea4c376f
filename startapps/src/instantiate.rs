//! Starting apps: resolve an app reference to a fresh root task.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::app_ref::AppReference;
use crate::core::canonical_key::canonical_key;
use crate::io::source::SourceConnector;
use crate::io::store::{AppInstanceId, SourceId, Store, TaskId};
use crate::io::validator::AnswerValidator;
use crate::run_context::{RunContext, random_string};

impl<S: Store, C: SourceConnector, V: AnswerValidator> RunContext<'_, S, C, V> {
    /// Start the app named by `app` and return its new root task.
    ///
    /// The app instance behind a reference is loaded once per run; every call
    /// still creates a new project and root task.
    #[instrument(skip_all)]
    pub fn start_app(&mut self, app: &Value) -> Result<TaskId> {
        let reference = AppReference::decode(app)?;
        let instance = self.resolve_instance(&reference, canonical_key(app))?;

        let record = self.store.app_instance(instance)?;
        info!(
            app = %record.name,
            source = %record.source_description,
            "starting compliance app"
        );
        let module = self
            .store
            .find_module(instance, &self.config.root_module)
            .with_context(|| format!("start app '{}'", reference.name()))?;
        let project = self.store.create_project(self.placeholders.organization)?;
        self.store
            .set_root_task(project, module, self.placeholders.user)
    }

    fn resolve_instance(
        &mut self,
        reference: &AppReference,
        key: String,
    ) -> Result<AppInstanceId> {
        if let Some(existing) = self.instances.get(&key) {
            debug!(app = reference.name(), instance = %existing, "reusing app instance");
            return Ok(*existing);
        }

        let spec = reference.source_spec();
        let source = self.resolve_source(&spec)?;

        let conn = self
            .connector
            .open(&spec)
            .with_context(|| format!("open app source {spec}"))?;
        let description = conn.description();
        info!(app = reference.name(), source = %description, "loading compliance app");
        let definition = conn
            .get_app(reference.name())
            .with_context(|| format!("load app '{}' from {description}", reference.name()))?;
        drop(conn);

        let instance = self.store.load_app(source, &description, definition)?;
        self.instances.insert(key, instance);
        Ok(instance)
    }

    fn resolve_source(&mut self, spec: &Value) -> Result<SourceId> {
        let key = canonical_key(spec);
        if let Some(existing) = self.sources.get(&key) {
            return Ok(*existing);
        }
        let slug = format!("source_{}_{}", self.sources.len(), random_string(6));
        let source = self.store.create_app_source(&slug, spec)?;
        info!(%slug, %spec, "created app source");
        self.sources.insert(key, source);
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::module::QuestionType;
    use crate::error::InputError;
    use crate::io::config::DriverConfig;
    use crate::io::store::{MemoryStore, Store};
    use crate::io::validator::BuiltinValidator;
    use crate::run_context::RunContext;
    use crate::test_support::{FakeConnector, app_definition, module, question};
    use serde_json::json;

    fn connector() -> FakeConnector {
        FakeConnector::default()
            .with_app(app_definition(
                "sample",
                vec![module("app", vec![question("q1", QuestionType::Text)])],
            ))
            .with_app(app_definition(
                "other",
                vec![module("app", Vec::new())],
            ))
    }

    #[test]
    fn equal_references_share_instance_but_not_task() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");

        let first = ctx.start_app(&json!("apps/sample")).expect("first");
        let second = ctx.start_app(&json!("apps/sample")).expect("second");

        assert_ne!(first, second);
        let a = ctx.store().task_module(first).expect("module").app;
        let b = ctx.store().task_module(second).expect("module").app;
        assert_eq!(a, b);
        assert_eq!(connector.loads(), vec!["sample".to_string()]);
        assert_eq!(connector.opens(), 1);
        assert_eq!(ctx.instance_count(), 1);
    }

    #[test]
    fn one_source_for_equal_specs() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");

        ctx.start_app(&json!({"source": {"type": "local", "path": "apps"}, "name": "sample"}))
            .expect("structured");
        ctx.start_app(&json!({"name": "other", "source": {"path": "apps", "type": "local"}}))
            .expect("structured, reordered keys");
        ctx.start_app(&json!("apps/sample")).expect("path form");

        assert_eq!(ctx.source_count(), 1);
        assert_eq!(store.app_source_count(), 1);
        assert_eq!(store.app_instance_count(), 2);
    }

    #[test]
    fn malformed_reference_fails_before_side_effects() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");

        let err = ctx
            .start_app(&json!({"name": "sample"}))
            .expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::InvalidReference(_))
        ));
        assert_eq!(connector.opens(), 0);
        assert_eq!(store.app_source_count(), 0);
        assert_eq!(store.task_count(), 0);
    }

    #[test]
    fn load_failure_is_fatal() {
        let connector = connector();
        let config = DriverConfig::default();
        let mut store = MemoryStore::default();
        let mut ctx = RunContext::new(&mut store, &connector, &BuiltinValidator, &config)
            .expect("context");

        let err = ctx.start_app(&json!("apps/missing")).expect_err("should fail");
        assert!(format!("{err:#}").contains("load app 'missing'"));
    }
}
