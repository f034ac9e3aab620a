//! GPO Session & Threading Core
//! Core Principle: A native GPO handle never leaves the STA thread that opened it

pub mod apartment;
pub mod backend;
pub mod context;
pub mod critical_section;
pub mod environment;
pub mod location;
pub mod memory;
pub mod registry;
pub mod retry;
pub mod session;
pub mod sid;

#[cfg(windows)]
pub mod native;

use uuid::Uuid;

pub use apartment::{is_sta_thread, run_on_sta_thread, ApartmentGuard, ApartmentState};
pub use backend::{GroupPolicyBackend, GroupPolicyProvider, RegistryLookup, RegistryWriteError};
pub use context::GroupPolicyContext;
pub use critical_section::CriticalPolicySection;
pub use location::{GroupPolicyLocation, OpenFlags, PolicySection};
pub use memory::{InMemoryGroupPolicy, InMemoryProvider};
pub use registry::{
    DeleteMultipleGroupPolicyRequest, GroupPolicyDeleteResult, GroupPolicyQueryResult,
    GroupPolicyUpdateResult, MultipleGroupPolicyQueryResult, RegistryData, RegistryValueType,
    SetMultipleGroupPolicyRequest,
};
pub use retry::{SaveOutcome, SaveRetryPolicy, Sleeper};
pub use session::GroupPolicySession;
pub use sid::assert_valid_sid;

#[cfg(windows)]
pub use native::NativeProvider;

/// Client-side extension GUID of the registry policy extension.
pub const REGISTRY_EXTENSION_GUID: Uuid = Uuid::from_u128(0x35378EAC_683F_11D2_A89A_00C04FBBCFA2);

/// Snap-in GUID reported alongside registry extension saves.
pub const CLSID_GPE_SNAP_IN: Uuid = Uuid::from_u128(0x8FC0B734_A0E1_11D1_A7D3_0000F87571E3);

/// HRESULT raised when another process holds `registry.pol`.
pub const ERROR_SHARING_VIOLATION: i32 = 0x8007_0020_u32 as i32;
pub const ERROR_MORE_DATA: i32 = 234;
pub const ERROR_NO_MORE_ITEMS: i32 = 259;
pub const MAX_REG_VALUE_NAME_SIZE: usize = 16383;
pub const DEFAULT_SAVE_RETRY_COUNT: u32 = 5;
