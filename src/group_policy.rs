//! Group Policy facade
//! Core Principle: One logical operation = one fresh STA thread, one session, one open, one dispose

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::gpo::{
    run_on_sta_thread, CriticalPolicySection, DeleteMultipleGroupPolicyRequest,
    GroupPolicyDeleteResult, GroupPolicyLocation, GroupPolicyProvider, GroupPolicyQueryResult,
    GroupPolicySession, GroupPolicyUpdateResult, MultipleGroupPolicyQueryResult, OpenFlags,
    PolicySection, SetMultipleGroupPolicyRequest, Sleeper,
};
use crate::value::Value;

/// Per-call save settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Overrides the configured save retry count.
    pub retry_count: Option<u32>,
    /// Client extension GUID reported to `Save`; the GPE snap-in GUID when unset.
    pub client_guid: Option<Uuid>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_client(mut self, client_guid: Uuid) -> Self {
        self.client_guid = Some(client_guid);
        self
    }
}

/// Get/Set/Delete over any GPO location.
pub struct GroupPolicy<P: GroupPolicyProvider> {
    provider: Arc<P>,
    config: EngineConfig,
    sleeper: Option<Sleeper>,
}

impl<P: GroupPolicyProvider> Clone for GroupPolicy<P> {
    fn clone(&self) -> Self {
        GroupPolicy {
            provider: self.provider.clone(),
            config: self.config.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<P: GroupPolicyProvider> GroupPolicy<P> {
    /// Create new facade over `provider`
    pub fn new(provider: P, config: EngineConfig) -> Self {
        GroupPolicy {
            provider: Arc::new(provider),
            config,
            sleeper: None,
        }
    }

    /// Replace the wait between save retries.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run `work` against a session opened at `location` on a dedicated STA thread.
    ///
    /// A caller already inside the critical section for `section` is not bracketed again; the
    /// worker thread would wait on its own caller.
    fn run<T, F>(
        &self,
        operation: &'static str,
        location: GroupPolicyLocation,
        section: PolicySection,
        retry_count: Option<u32>,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut GroupPolicySession<P::Object>) -> Result<T> + Send + 'static,
    {
        let provider = self.provider.clone();
        let retry = self.config.retry_policy(retry_count);
        let sleeper = self.sleeper.clone();
        let use_critical_section = self.config.use_critical_policy_section
            && !CriticalPolicySection::is_held_on_current_thread(section);

        debug!(operation, %location, "dispatching to STA worker");
        run_on_sta_thread(operation, move || {
            let backend = provider.create()?;
            let mut session = GroupPolicySession::new(backend)
                .with_retry_policy(retry)
                .with_sleeper(sleeper)
                .with_critical_section(use_critical_section);
            session.open(location, OpenFlags::LOAD_REGISTRY)?;
            let result = work(&mut session);
            session.dispose();
            result
        })
    }

    pub fn get_policy(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<GroupPolicyQueryResult> {
        let (key, value_name) = (key.to_string(), value_name.to_string());
        self.run("gpo-get", location, section, None, move |session| {
            session.get_value(section, &key, &value_name)
        })
    }

    pub fn get_policies(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_prefix: Option<&str>,
    ) -> Result<MultipleGroupPolicyQueryResult> {
        let key = key.to_string();
        let prefix = value_prefix.map(str::to_string);
        self.run("gpo-get-many", location, section, None, move |session| {
            session.get_values(section, &key, prefix.as_deref())
        })
    }

    /// Write one value. A `Delete` or otherwise unstorable value is rejected before any thread
    /// is spawned.
    #[allow(clippy::too_many_arguments)]
    pub fn set_policy(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_name: &str,
        value: &Value,
        expandable: bool,
        options: SaveOptions,
    ) -> Result<GroupPolicyUpdateResult> {
        value.to_registry_data(expandable)?;
        let (key, value_name, value) = (key.to_string(), value_name.to_string(), value.clone());
        let result = self.run("gpo-set", location, section, options.retry_count, move |session| {
            let client = options.client_guid.as_ref();
            session.set_value(section, &key, &value_name, &value, expandable, client)
        })?;
        info!(%section, ?result, "set policy value");
        Ok(result)
    }

    pub fn delete_policy(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_name: &str,
        options: SaveOptions,
    ) -> Result<GroupPolicyDeleteResult> {
        let (key, value_name) = (key.to_string(), value_name.to_string());
        let result = self.run("gpo-delete", location, section, options.retry_count, move |session| {
            session.delete_value(section, &key, &value_name, options.client_guid.as_ref())
        })?;
        info!(%section, ?result, "deleted policy value");
        Ok(result)
    }

    /// Batched writes under one session; results are in request order.
    pub fn set_policies(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        requests: Vec<SetMultipleGroupPolicyRequest>,
        options: SaveOptions,
    ) -> Result<Vec<GroupPolicyUpdateResult>> {
        for request in &requests {
            request.value.to_registry_data(request.require_expand_string)?;
        }
        self.run("gpo-set-many", location, section, options.retry_count, move |session| {
            session.set_many(section, &requests, options.client_guid.as_ref())
        })
    }

    /// Batched deletes under one session; results are in request order.
    pub fn delete_policies(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        requests: Vec<DeleteMultipleGroupPolicyRequest>,
        options: SaveOptions,
    ) -> Result<Vec<GroupPolicyDeleteResult>> {
        self.run("gpo-delete-many", location, section, options.retry_count, move |session| {
            session.delete_many(section, &requests, options.client_guid.as_ref())
        })
    }

    pub fn get_machine_policy(
        &self,
        key: &str,
        value_name: &str,
    ) -> Result<GroupPolicyQueryResult> {
        self.get_policy(GroupPolicyLocation::ThisComputer, PolicySection::Machine, key, value_name)
    }

    pub fn get_user_policy(&self, key: &str, value_name: &str) -> Result<GroupPolicyQueryResult> {
        self.get_policy(GroupPolicyLocation::ThisComputer, PolicySection::User, key, value_name)
    }

    pub fn set_machine_policy(
        &self,
        key: &str,
        value_name: &str,
        value: &Value,
    ) -> Result<GroupPolicyUpdateResult> {
        self.set_policy(
            GroupPolicyLocation::ThisComputer,
            PolicySection::Machine,
            key,
            value_name,
            value,
            false,
            SaveOptions::default(),
        )
    }

    pub fn set_user_policy(
        &self,
        key: &str,
        value_name: &str,
        value: &Value,
    ) -> Result<GroupPolicyUpdateResult> {
        self.set_policy(
            GroupPolicyLocation::ThisComputer,
            PolicySection::User,
            key,
            value_name,
            value,
            false,
            SaveOptions::default(),
        )
    }

    pub fn delete_machine_policy(
        &self,
        key: &str,
        value_name: &str,
    ) -> Result<GroupPolicyDeleteResult> {
        self.delete_policy(
            GroupPolicyLocation::ThisComputer,
            PolicySection::Machine,
            key,
            value_name,
            SaveOptions::default(),
        )
    }

    pub fn delete_user_policy(
        &self,
        key: &str,
        value_name: &str,
    ) -> Result<GroupPolicyDeleteResult> {
        self.delete_policy(
            GroupPolicyLocation::ThisComputer,
            PolicySection::User,
            key,
            value_name,
            SaveOptions::default(),
        )
    }
}
