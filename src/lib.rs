//! ADMX Policy Engine
//! Core Principle: Read what an ADMX policy means, then make the local GPO say exactly that

pub mod config;
pub mod error;
pub mod gpo;
pub mod group_policy;
pub mod logging;
pub mod policy;
pub mod value;

pub use config::EngineConfig;
pub use error::{GroupPolicyError, Result};
pub use group_policy::{GroupPolicy, SaveOptions};
pub use logging::init_logging;
pub use policy::{
    ElementInput, PolicyCatalog, PolicyDefinition, PolicyEngine, PolicyModifyResult,
    PolicyRegistryValue, PolicyStatus, PolicyValueStatus,
};
pub use value::Value;
