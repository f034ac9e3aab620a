//! Backend seam
//! Core Principle: Everything the session needs from a GPO fits in one trait

use uuid::Uuid;

use crate::error::Result;

use super::location::{GroupPolicyLocation, OpenFlags, PolicySection};
use super::registry::RegistryData;

/// Outcome of looking up one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLookup {
    KeyMissing,
    ValueMissing,
    Found(RegistryData),
}

/// Which half of a write failed, with the OS code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryWriteError {
    CreateOrOpen(i32),
    Set(i32),
}

/// One opened Group Policy Object.
///
/// Implementations are apartment-affine: they are created, used and dropped on a single thread.
pub trait GroupPolicyBackend {
    fn is_administrator(&self) -> bool;

    fn open(&mut self, location: &GroupPolicyLocation, flags: OpenFlags) -> Result<()>;

    fn read_value(
        &self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<RegistryLookup>;

    /// Value names under `key` in storage order. `None` when the key does not exist.
    fn enumerate_values(&self, section: PolicySection, key: &str) -> Result<Option<Vec<String>>>;

    fn write_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        data: &RegistryData,
    ) -> std::result::Result<(), RegistryWriteError>;

    /// Remove one value. `Ok(false)` when the key or the value was not there.
    fn delete_value(&mut self, section: PolicySection, key: &str, value_name: &str) -> Result<bool>;

    /// Persist one section. Contention surfaces as a `Native` error carrying
    /// `ERROR_SHARING_VIOLATION`.
    fn save(&mut self, section: PolicySection, is_add: bool, client: &Uuid) -> Result<()>;
}

/// Factory for backends, shared across threads. The object itself is built on the worker thread.
pub trait GroupPolicyProvider: Send + Sync + 'static {
    type Object: GroupPolicyBackend;

    fn create(&self) -> Result<Self::Object>;
}

impl<P: GroupPolicyProvider> GroupPolicyProvider for std::sync::Arc<P> {
    type Object = P::Object;

    fn create(&self) -> Result<Self::Object> {
        (**self).create()
    }
}
