//! Run-scoped state shared by instantiation and answer binding.

use std::collections::HashMap;

use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use tracing::debug;

use crate::io::config::DriverConfig;
use crate::io::source::SourceConnector;
use crate::io::store::{AppInstanceId, OrganizationId, SourceId, Store, UserId};
use crate::io::validator::AnswerValidator;

/// Stand-in owner records required by the store; never user-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholders {
    pub organization: OrganizationId,
    pub user: UserId,
}

/// Everything one run needs: collaborators, caches, and placeholder owners.
///
/// Create a fresh context per run. The source and instance caches are keyed
/// by [`canonical_key`](crate::core::canonical_key::canonical_key), so each
/// distinct source spec and each distinct app reference is resolved once.
pub struct RunContext<'a, S, C, V> {
    pub(crate) store: &'a mut S,
    pub(crate) connector: &'a C,
    pub(crate) validator: &'a V,
    pub(crate) config: &'a DriverConfig,
    pub(crate) placeholders: Placeholders,
    pub(crate) sources: HashMap<String, SourceId>,
    pub(crate) instances: HashMap<String, AppInstanceId>,
}

impl<'a, S: Store, C: SourceConnector, V: AnswerValidator> RunContext<'a, S, C, V> {
    pub fn new(
        store: &'a mut S,
        connector: &'a C,
        validator: &'a V,
        config: &'a DriverConfig,
    ) -> Result<Self> {
        let organization = store.create_organization(&random_string(12))?;
        let user = store.create_user(&random_string(12))?;
        debug!(%organization, %user, "created placeholder owners");
        Ok(Self {
            store,
            connector,
            validator,
            config,
            placeholders: Placeholders { organization, user },
            sources: HashMap::new(),
            instances: HashMap::new(),
        })
    }

    pub fn store(&self) -> &S {
        self.store
    }

    pub fn placeholders(&self) -> Placeholders {
        self.placeholders
    }

    /// Number of distinct app sources resolved so far.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of distinct app references resolved so far.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

pub(crate) fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
