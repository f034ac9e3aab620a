//! GPO Session
//! Core Principle: Created -> Ready -> Disposed, and nothing touches the registry outside Ready

use uuid::Uuid;

use tracing::{debug, info, warn};

use crate::error::{GroupPolicyError, Result};
use crate::value::Value;

use super::apartment::is_sta_thread;
use super::backend::{GroupPolicyBackend, RegistryLookup, RegistryWriteError};
use super::critical_section::CriticalPolicySection;
use super::location::{GroupPolicyLocation, OpenFlags, PolicySection};
use super::registry::{
    DeleteMultipleGroupPolicyRequest, GroupPolicyDeleteResult, GroupPolicyQueryResult,
    GroupPolicyUpdateResult, MultipleGroupPolicyQueryResult, RegistryData,
    SetMultipleGroupPolicyRequest,
};
use super::retry::{SaveOutcome, SaveRetryPolicy, Sleeper};
use super::CLSID_GPE_SNAP_IN;

/// One opened GPO, bound to the thread that created it.
pub struct GroupPolicySession<B: GroupPolicyBackend> {
    backend: Option<B>,
    location: Option<GroupPolicyLocation>,
    retry: SaveRetryPolicy,
    sleeper: Option<Sleeper>,
    use_critical_section: bool,
}

impl<B: GroupPolicyBackend> GroupPolicySession<B> {
    /// Create new session around an unopened backend
    pub fn new(backend: B) -> Self {
        GroupPolicySession {
            backend: Some(backend),
            location: None,
            retry: SaveRetryPolicy::default(),
            sleeper: None,
            use_critical_section: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: SaveRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Option<Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Bracket reads with the critical policy section.
    pub fn with_critical_section(mut self, enabled: bool) -> Self {
        self.use_critical_section = enabled;
        self
    }

    pub fn retry_policy(&self) -> SaveRetryPolicy {
        self.retry
    }

    pub fn set_retry_policy(&mut self, retry: SaveRetryPolicy) {
        self.retry = retry;
    }

    pub fn location(&self) -> Option<&GroupPolicyLocation> {
        self.location.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    /// Direct access to the backend, for inspection.
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    fn check_environment(&self) -> Result<&B> {
        let backend = self.backend.as_ref().ok_or(GroupPolicyError::Disposed)?;
        if !is_sta_thread() {
            return Err(GroupPolicyError::NotStaThread);
        }
        if !backend.is_administrator() {
            return Err(GroupPolicyError::NotAdministrator);
        }
        Ok(backend)
    }

    fn ensure_ready(&self) -> Result<&B> {
        let backend = self.check_environment()?;
        if self.location.is_none() {
            return Err(GroupPolicyError::NotInitialized);
        }
        Ok(backend)
    }

    fn ensure_ready_mut(&mut self) -> Result<&mut B> {
        self.ensure_ready()?;
        self.backend.as_mut().ok_or(GroupPolicyError::Disposed)
    }

    /// Open the GPO at `location`. A session opens exactly once.
    pub fn open(&mut self, location: GroupPolicyLocation, flags: OpenFlags) -> Result<()> {
        self.check_environment()?;
        if let Some(current) = &self.location {
            return Err(GroupPolicyError::AlreadyOpened(current.to_string()));
        }

        let backend = self.backend.as_mut().ok_or(GroupPolicyError::Disposed)?;
        backend.open(&location, flags)?;

        info!(%location, flags = flags.bits(), "opened group policy object");
        self.location = Some(location);
        Ok(())
    }

    pub fn get_value(
        &self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<GroupPolicyQueryResult> {
        let backend = self.ensure_ready()?;
        let _section = CriticalPolicySection::enter_if(self.use_critical_section, section)?;

        Ok(match backend.read_value(section, key, value_name)? {
            RegistryLookup::KeyMissing => GroupPolicyQueryResult::key_missing(key, value_name),
            RegistryLookup::ValueMissing => GroupPolicyQueryResult::value_missing(key, value_name),
            RegistryLookup::Found(data) => GroupPolicyQueryResult::found(key, value_name, data),
        })
    }

    /// Every value under `key` whose name starts with `prefix` (ignoring case). A blank prefix
    /// matches all. A failed enumeration comes back with `succeed` unset and its error code.
    pub fn get_values(
        &self,
        section: PolicySection,
        key: &str,
        prefix: Option<&str>,
    ) -> Result<MultipleGroupPolicyQueryResult> {
        let backend = self.ensure_ready()?;
        let _section = CriticalPolicySection::enter_if(self.use_critical_section, section)?;

        let mut list = MultipleGroupPolicyQueryResult::new(prefix);
        let names = match backend.enumerate_values(section, key) {
            Ok(Some(names)) => names,
            Ok(None) => return Ok(list),
            Err(err) => {
                warn!(key, error = %err, "value enumeration failed");
                list.succeed = false;
                list.last_error_code = err.code().unwrap_or(-1);
                return Ok(list);
            }
        };

        let prefix = prefix.map(str::trim).filter(|p| !p.is_empty()).map(str::to_lowercase);

        for name in names {
            if let Some(prefix) = &prefix {
                if !name.to_lowercase().starts_with(prefix.as_str()) {
                    continue;
                }
            }

            let result = match backend.read_value(section, key, &name)? {
                RegistryLookup::Found(data) => GroupPolicyQueryResult::found(key, &name, data),
                RegistryLookup::ValueMissing => GroupPolicyQueryResult::value_missing(key, &name),
                RegistryLookup::KeyMissing => GroupPolicyQueryResult::key_missing(key, &name),
            };
            list.results.push(result);
        }

        Ok(list)
    }

    /// Persist `section`, retrying on sharing violations.
    pub fn save(
        &mut self,
        section: PolicySection,
        is_add: bool,
        client: Option<&Uuid>,
    ) -> Result<SaveOutcome> {
        let retry = self.retry;
        let sleeper = self.sleeper.clone();
        let client = client.copied().unwrap_or(CLSID_GPE_SNAP_IN);
        let backend = self.ensure_ready_mut()?;

        let op = || backend.save(section, is_add, &client);
        let outcome = match sleeper {
            Some(sleeper) => retry.run(op, |d| sleeper(d)),
            None => retry.run_blocking(op),
        };

        match &outcome {
            SaveOutcome::Saved { attempts } => {
                debug!(%section, attempts, "saved group policy section")
            }
            SaveOutcome::Exhausted { attempts, last_code } => {
                warn!(%section, attempts, last_code, "save retries exhausted")
            }
            SaveOutcome::Failed { attempts, error } => {
                warn!(%section, attempts, %error, "save failed")
            }
        }
        Ok(outcome)
    }

    /// Write one value and save. Delete or unrepresentable values are rejected before any native
    /// call.
    pub fn set_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        value: &Value,
        expandable: bool,
        client: Option<&Uuid>,
    ) -> Result<GroupPolicyUpdateResult> {
        let data = value.to_registry_data(expandable)?;
        self.set_data(section, key, value_name, &data, client)
    }

    fn set_data(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        data: &RegistryData,
        client: Option<&Uuid>,
    ) -> Result<GroupPolicyUpdateResult> {
        let backend = self.ensure_ready_mut()?;

        if let Err(err) = backend.write_value(section, key, value_name, data) {
            warn!(key, value_name, ?err, "registry write failed");
            return Ok(match err {
                RegistryWriteError::CreateOrOpen(_) => GroupPolicyUpdateResult::CreateOrOpenFailed,
                RegistryWriteError::Set(_) => GroupPolicyUpdateResult::SetFailed,
            });
        }
        let value_type = data.value_type();
        debug!(%section, key, value_name, ?value_type, "registry value written");

        if !self.save(section, true, client)?.is_saved() {
            return Ok(GroupPolicyUpdateResult::SaveFailed);
        }
        Ok(GroupPolicyUpdateResult::UpdateSucceed)
    }

    /// Remove one value and save.
    pub fn delete_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        client: Option<&Uuid>,
    ) -> Result<GroupPolicyDeleteResult> {
        let backend = self.ensure_ready_mut()?;

        match backend.delete_value(section, key, value_name) {
            Ok(true) => debug!(%section, key, value_name, "registry value deleted"),
            Ok(false) => return Ok(GroupPolicyDeleteResult::NoItemFound),
            Err(err) => {
                warn!(key, value_name, error = %err, "registry delete failed");
                return Ok(GroupPolicyDeleteResult::CreateOrOpenFailed);
            }
        }

        if !self.save(section, false, client)?.is_saved() {
            return Ok(GroupPolicyDeleteResult::SaveFailed);
        }
        Ok(GroupPolicyDeleteResult::DeleteSucceed)
    }

    /// Apply writes in order, one result per request.
    pub fn set_many(
        &mut self,
        section: PolicySection,
        requests: &[SetMultipleGroupPolicyRequest],
        client: Option<&Uuid>,
    ) -> Result<Vec<GroupPolicyUpdateResult>> {
        let payloads = requests
            .iter()
            .map(|r| r.value.to_registry_data(r.require_expand_string))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(requests.len());
        for (request, data) in requests.iter().zip(&payloads) {
            let (key, value_name) = (&request.sub_key, &request.value_name);
            let result = self.set_data(section, key, value_name, data, client)?;
            results.push(result);
        }
        Ok(results)
    }

    /// Apply deletes in order, one result per request.
    pub fn delete_many(
        &mut self,
        section: PolicySection,
        requests: &[DeleteMultipleGroupPolicyRequest],
        client: Option<&Uuid>,
    ) -> Result<Vec<GroupPolicyDeleteResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.delete_value(section, &request.sub_key, &request.value_name, client)?;
            results.push(result);
        }
        Ok(results)
    }

    /// Release the native handle. Further calls fail with `Disposed`.
    pub fn dispose(&mut self) {
        if self.backend.take().is_some() {
            debug!(location = ?self.location, "disposed group policy object");
        }
    }
}

impl<B: GroupPolicyBackend> Drop for GroupPolicySession<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpo::apartment::{ApartmentGuard, ApartmentState};
    use crate::gpo::backend::GroupPolicyProvider;
    use crate::gpo::memory::InMemoryProvider;
    use crate::gpo::ERROR_SHARING_VIOLATION;
    use std::sync::Arc;
    use std::time::Duration;

    const KEY: &str = r"Software\Policies\Contoso";

    fn opened(provider: &InMemoryProvider) -> GroupPolicySession<crate::gpo::InMemoryGroupPolicy> {
        let backend = provider.create().unwrap();
        let mut session = GroupPolicySession::new(backend).with_sleeper(Some(Arc::new(|_| {})));
        session.open(GroupPolicyLocation::ThisComputer, OpenFlags::default()).unwrap();
        session
    }

    #[test]
    fn requires_sta_then_administrator_then_open() {
        let provider = InMemoryProvider::new();
        let session = GroupPolicySession::new(provider.create().unwrap());
        assert!(matches!(
            session.get_value(PolicySection::Machine, KEY, "A"),
            Err(GroupPolicyError::NotStaThread)
        ));

        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        provider.set_administrator(false);
        assert!(matches!(
            session.get_value(PolicySection::Machine, KEY, "A"),
            Err(GroupPolicyError::NotAdministrator)
        ));

        provider.set_administrator(true);
        assert!(matches!(
            session.get_value(PolicySection::Machine, KEY, "A"),
            Err(GroupPolicyError::NotInitialized)
        ));
    }

    #[test]
    fn opens_once_and_rejects_use_after_dispose() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider);

        assert!(matches!(
            session.open(GroupPolicyLocation::ThisComputer, OpenFlags::default()),
            Err(GroupPolicyError::AlreadyOpened(_))
        ));

        session.dispose();
        assert!(session.is_disposed());
        assert!(matches!(
            session.get_value(PolicySection::Machine, KEY, "A"),
            Err(GroupPolicyError::Disposed)
        ));
    }

    #[test]
    fn set_get_delete_cycle() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider);

        let missing = session.get_value(PolicySection::Machine, KEY, "Level").unwrap();
        assert!(!missing.key_exists);

        let result = session
            .set_value(PolicySection::Machine, KEY, "Level", &Value::LongDecimal(7), false, None)
            .unwrap();
        assert_eq!(result, GroupPolicyUpdateResult::UpdateSucceed);

        let read = session.get_value(PolicySection::Machine, KEY, "Level").unwrap();
        assert_eq!(read.value, Some(RegistryData::QWord(7)));
        assert_eq!(read.value_type, crate::gpo::RegistryValueType::QWord);

        let absent = session.get_value(PolicySection::Machine, KEY, "Other").unwrap();
        assert!(absent.key_exists && !absent.value_exists);

        assert_eq!(
            session.delete_value(PolicySection::Machine, KEY, "Level", None).unwrap(),
            GroupPolicyDeleteResult::DeleteSucceed
        );
        assert_eq!(
            session.delete_value(PolicySection::Machine, KEY, "Level", None).unwrap(),
            GroupPolicyDeleteResult::NoItemFound
        );
    }

    #[test]
    fn delete_sentinel_is_rejected_before_write() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider);

        let requests = vec![
            SetMultipleGroupPolicyRequest::new(KEY, "A", 1u32),
            SetMultipleGroupPolicyRequest::new(KEY, "B", Value::Delete),
        ];
        assert!(matches!(
            session.set_many(PolicySection::Machine, &requests, None),
            Err(GroupPolicyError::DeleteValueNotStorable)
        ));
        assert_eq!(provider.save_attempts(), 0);
        assert!(!session.get_value(PolicySection::Machine, KEY, "A").unwrap().value_exists);
    }

    #[test]
    fn prefix_filter_ignores_case() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider);

        for (name, value) in [("Item1", "a"), ("item2", "b"), ("Other", "c")] {
            session
                .set_value(PolicySection::User, KEY, name, &Value::from(value), false, None)
                .unwrap();
        }

        let items = session.get_values(PolicySection::User, KEY, Some("ITEM")).unwrap();
        assert!(items.succeed);
        let names: Vec<_> = items.results.iter().map(|r| r.value_name.as_str()).collect();
        assert_eq!(names, vec!["Item1", "item2"]);

        let blank = session.get_values(PolicySection::User, KEY, Some("  ")).unwrap();
        assert_eq!(blank.results.len(), 3);
        let missing = session.get_values(PolicySection::User, "Missing", None).unwrap();
        assert!(missing.succeed && missing.results.is_empty());
    }

    #[test]
    fn enumeration_failure_is_reported_not_raised() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider);
        session
            .set_value(PolicySection::User, KEY, "Item1", &Value::Decimal(1), false, None)
            .unwrap();

        provider.fail_enumeration(Some(5));
        let items = session.get_values(PolicySection::User, KEY, Some("Item")).unwrap();
        assert!(!items.succeed);
        assert_eq!(items.last_error_code, 5);
        assert!(items.results.is_empty());

        provider.fail_enumeration(None);
        assert!(session.get_values(PolicySection::User, KEY, Some("Item")).unwrap().succeed);
    }

    #[test]
    fn failed_save_leaves_working_copy_mutated() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let mut session = opened(&provider).with_retry_policy(SaveRetryPolicy::new(2));
        provider.fail_next_saves(2, ERROR_SHARING_VIOLATION);

        let result = session
            .set_value(PolicySection::Machine, KEY, "A", &Value::Decimal(1), false, None)
            .unwrap();
        assert_eq!(result, GroupPolicyUpdateResult::SaveFailed);
        assert_eq!(provider.save_attempts(), 2);

        assert!(session.get_value(PolicySection::Machine, KEY, "A").unwrap().value_exists);
        assert_eq!(
            provider.persisted_value(
                &GroupPolicyLocation::ThisComputer,
                PolicySection::Machine,
                KEY,
                "A"
            ),
            None
        );
    }

    #[test]
    fn save_uses_injected_sleeper() {
        let _sta = ApartmentGuard::enter(ApartmentState::Sta).unwrap();
        let provider = InMemoryProvider::new();
        let slept = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = slept.clone();
        let mut session = opened(&provider)
            .with_retry_policy(SaveRetryPolicy::new(3))
            .with_sleeper(Some(Arc::new(move |d| record.lock().push(d))));
        provider.fail_next_saves(1, ERROR_SHARING_VIOLATION);

        let outcome = session.save(PolicySection::Machine, true, None).unwrap();
        assert!(outcome.is_saved());
        assert_eq!(*slept.lock(), vec![Duration::from_secs(1)]);
        assert_eq!(provider.last_save_client(), Some(CLSID_GPE_SNAP_IN));
    }
}
