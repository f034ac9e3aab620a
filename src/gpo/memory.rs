//! In-memory GPO backend
//! Core Principle: Opened objects work on a copy; only a successful save reaches the shared store

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{GroupPolicyError, Result};

use super::backend::{GroupPolicyBackend, GroupPolicyProvider, RegistryLookup, RegistryWriteError};
use super::location::{GroupPolicyLocation, OpenFlags, PolicySection};
use super::registry::RegistryData;

/// Values of one key, in insertion order. Names compare without case.
#[derive(Debug, Clone, Default)]
struct KeyStore {
    name: String,
    values: Vec<(String, RegistryData)>,
}

impl KeyStore {
    fn position(&self, value_name: &str) -> Option<usize> {
        self.values.iter().position(|(n, _)| n.eq_ignore_ascii_case(value_name))
    }
}

#[derive(Debug, Clone, Default)]
struct SectionStore {
    keys: Vec<KeyStore>,
}

impl SectionStore {
    fn key(&self, key: &str) -> Option<&KeyStore> {
        self.keys.iter().find(|k| k.name.eq_ignore_ascii_case(key))
    }

    fn key_mut(&mut self, key: &str) -> Option<&mut KeyStore> {
        self.keys.iter_mut().find(|k| k.name.eq_ignore_ascii_case(key))
    }

    fn key_or_create(&mut self, key: &str) -> &mut KeyStore {
        match self.keys.iter().position(|k| k.name.eq_ignore_ascii_case(key)) {
            Some(index) => &mut self.keys[index],
            None => {
                self.keys.push(KeyStore {
                    name: key.to_string(),
                    values: Vec::new(),
                });
                let last = self.keys.len() - 1;
                &mut self.keys[last]
            }
        }
    }

    fn set(&mut self, key: &str, value_name: &str, data: RegistryData) {
        let store = self.key_or_create(key);
        match store.position(value_name) {
            Some(index) => store.values[index].1 = data,
            None => store.values.push((value_name.to_string(), data)),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LocationStore {
    machine: SectionStore,
    user: SectionStore,
}

impl LocationStore {
    fn section(&self, section: PolicySection) -> &SectionStore {
        match section {
            PolicySection::Machine => &self.machine,
            PolicySection::User => &self.user,
        }
    }

    fn section_mut(&mut self, section: PolicySection) -> &mut SectionStore {
        match section {
            PolicySection::Machine => &mut self.machine,
            PolicySection::User => &mut self.user,
        }
    }
}

#[derive(Debug)]
struct ProviderState {
    persisted: HashMap<String, LocationStore>,
    administrator: bool,
    pending_save_failures: u32,
    save_failure_code: i32,
    save_attempts: u32,
    committed_saves: u32,
    last_save_client: Option<Uuid>,
    enumeration_failure: Option<i32>,
}

/// Shared store standing in for the native GPO.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    /// Create new empty store, running as administrator
    pub fn new() -> Self {
        InMemoryProvider {
            state: Arc::new(Mutex::new(ProviderState {
                persisted: HashMap::new(),
                administrator: true,
                pending_save_failures: 0,
                save_failure_code: 0,
                save_attempts: 0,
                committed_saves: 0,
                last_save_client: None,
                enumeration_failure: None,
            })),
        }
    }

    pub fn set_administrator(&self, administrator: bool) {
        self.state.lock().administrator = administrator;
    }

    /// Make the next `count` saves fail with `code`.
    pub fn fail_next_saves(&self, count: u32, code: i32) {
        let mut state = self.state.lock();
        state.pending_save_failures = count;
        state.save_failure_code = code;
    }

    /// Make every value enumeration fail with `code` until cleared with `None`.
    pub fn fail_enumeration(&self, code: Option<i32>) {
        self.state.lock().enumeration_failure = code;
    }

    pub fn save_attempts(&self) -> u32 {
        self.state.lock().save_attempts
    }

    pub fn committed_saves(&self) -> u32 {
        self.state.lock().committed_saves
    }

    pub fn last_save_client(&self) -> Option<Uuid> {
        self.state.lock().last_save_client
    }

    /// Seed the persisted store directly.
    pub fn seed(
        &self,
        location: &GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_name: &str,
        data: RegistryData,
    ) {
        let mut state = self.state.lock();
        state
            .persisted
            .entry(location.to_string())
            .or_default()
            .section_mut(section)
            .set(key, value_name, data);
    }

    pub fn persisted_value(
        &self,
        location: &GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Option<RegistryData> {
        let state = self.state.lock();
        let store = state.persisted.get(&location.to_string())?.section(section).key(key)?;
        store.position(value_name).map(|i| store.values[i].1.clone())
    }

    pub fn persisted_value_names(
        &self,
        location: &GroupPolicyLocation,
        section: PolicySection,
        key: &str,
    ) -> Vec<String> {
        let state = self.state.lock();
        state
            .persisted
            .get(&location.to_string())
            .and_then(|l| l.section(section).key(key))
            .map(|k| k.values.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }
}

impl GroupPolicyProvider for InMemoryProvider {
    type Object = InMemoryGroupPolicy;

    fn create(&self) -> Result<InMemoryGroupPolicy> {
        Ok(InMemoryGroupPolicy {
            state: self.state.clone(),
            location: None,
            working: LocationStore::default(),
        })
    }
}

/// One opened object over [`InMemoryProvider`].
#[derive(Debug)]
pub struct InMemoryGroupPolicy {
    state: Arc<Mutex<ProviderState>>,
    location: Option<String>,
    working: LocationStore,
}

impl InMemoryGroupPolicy {
    fn working(&self) -> Result<&LocationStore> {
        match self.location {
            Some(_) => Ok(&self.working),
            None => Err(GroupPolicyError::NotOpened),
        }
    }
}

impl GroupPolicyBackend for InMemoryGroupPolicy {
    fn is_administrator(&self) -> bool {
        self.state.lock().administrator
    }

    fn open(&mut self, location: &GroupPolicyLocation, _flags: OpenFlags) -> Result<()> {
        let name = location.to_string();
        self.working = self.state.lock().persisted.get(&name).cloned().unwrap_or_default();
        self.location = Some(name);
        Ok(())
    }

    fn read_value(
        &self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<RegistryLookup> {
        let Some(store) = self.working()?.section(section).key(key) else {
            return Ok(RegistryLookup::KeyMissing);
        };
        Ok(match store.position(value_name) {
            Some(index) => RegistryLookup::Found(store.values[index].1.clone()),
            None => RegistryLookup::ValueMissing,
        })
    }

    fn enumerate_values(&self, section: PolicySection, key: &str) -> Result<Option<Vec<String>>> {
        if let Some(code) = self.state.lock().enumeration_failure {
            return Err(GroupPolicyError::native("Cannot enumerate registry values.", code));
        }
        Ok(self
            .working()?
            .section(section)
            .key(key)
            .map(|k| k.values.iter().map(|(n, _)| n.clone()).collect()))
    }

    fn write_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        data: &RegistryData,
    ) -> std::result::Result<(), RegistryWriteError> {
        if self.location.is_none() {
            return Err(RegistryWriteError::CreateOrOpen(-1));
        }
        self.working.section_mut(section).set(key, value_name, data.clone());
        Ok(())
    }

    fn delete_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<bool> {
        if self.location.is_none() {
            return Err(GroupPolicyError::NotOpened);
        }
        let Some(store) = self.working.section_mut(section).key_mut(key) else {
            return Ok(false);
        };
        match store.position(value_name) {
            Some(index) => {
                store.values.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn save(&mut self, section: PolicySection, _is_add: bool, client: &Uuid) -> Result<()> {
        let location = self.location.clone().ok_or(GroupPolicyError::NotOpened)?;
        let mut state = self.state.lock();
        state.save_attempts += 1;
        state.last_save_client = Some(*client);

        if state.pending_save_failures > 0 {
            state.pending_save_failures -= 1;
            let code = state.save_failure_code;
            return Err(GroupPolicyError::native("Cannot save the group policy object.", code));
        }

        let committed = self.working.section(section).clone();
        *state.persisted.entry(location).or_default().section_mut(section) = committed;
        state.committed_saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = r"Software\Policies\Contoso";

    #[test]
    fn open_snapshots_persisted_state() {
        let provider = InMemoryProvider::new();
        let location = GroupPolicyLocation::ThisComputer;
        provider.seed(&location, PolicySection::Machine, KEY, "A", RegistryData::DWord(1));

        let mut gpo = provider.create().unwrap();
        assert!(matches!(
            gpo.read_value(PolicySection::Machine, KEY, "A"),
            Err(GroupPolicyError::NotOpened)
        ));
        gpo.open(&location, OpenFlags::default()).unwrap();
        assert_eq!(
            gpo.read_value(PolicySection::Machine, &KEY.to_uppercase(), "a").unwrap(),
            RegistryLookup::Found(RegistryData::DWord(1))
        );
        assert_eq!(
            gpo.read_value(PolicySection::User, KEY, "A").unwrap(),
            RegistryLookup::KeyMissing
        );
    }

    #[test]
    fn save_commits_only_the_requested_section() {
        let provider = InMemoryProvider::new();
        let location = GroupPolicyLocation::ThisComputer;
        let mut gpo = provider.create().unwrap();
        gpo.open(&location, OpenFlags::default()).unwrap();

        gpo.write_value(PolicySection::Machine, KEY, "M", &RegistryData::DWord(1)).unwrap();
        gpo.write_value(PolicySection::User, KEY, "U", &RegistryData::DWord(2)).unwrap();
        gpo.save(PolicySection::Machine, true, &Uuid::nil()).unwrap();

        assert_eq!(
            provider.persisted_value(&location, PolicySection::Machine, KEY, "M"),
            Some(RegistryData::DWord(1))
        );
        assert_eq!(provider.persisted_value(&location, PolicySection::User, KEY, "U"), None);
        assert_eq!(provider.committed_saves(), 1);
    }

    #[test]
    fn locations_are_isolated() {
        let provider = InMemoryProvider::new();
        provider.seed(
            &GroupPolicyLocation::RemoteComputer("HOST01".into()),
            PolicySection::Machine,
            KEY,
            "A",
            RegistryData::DWord(1),
        );
        assert!(provider
            .persisted_value_names(&GroupPolicyLocation::ThisComputer, PolicySection::Machine, KEY)
            .is_empty());
    }
}
