//! Policy Model & Application Engine
//! Core Principle: Definitions are immutable once loaded; only the engine touches the registry

pub mod admx;
mod catalog;
mod definition;
mod elements;
mod loader;
mod policy_engine;
mod presentation;
mod registry_value;
mod resources;
mod supported_on;

pub use catalog::PolicyCatalog;
pub use definition::{
    CategoryInfo, PolicyClass, PolicyDefinition, PolicyDefinitionFile, PolicyNamespace,
};
pub use elements::{
    effective_item_key, effective_key, BooleanElement, DecimalElement, EnumerationElement,
    EnumerationItem, ListElement, LongDecimalElement, MultiTextElement, PolicyElement,
    PolicyElementType, TextElement,
};
pub use loader::load_definition_file;
pub use policy_engine::{
    ElementInput, ModifiedValues, PolicyEngine, PolicyModifyResult, PolicyStatus, PolicyValueStatus,
};
pub use presentation::{PolicyPresentation, PresentationControl};
pub use registry_value::PolicyRegistryValue;
pub use resources::{EntityReference, PolicyResourceInfo, ResourceKeyReference, FALLBACK_CULTURE};
pub use supported_on::{SupportedCriteria, SupportedOnDefinition, SupportedOnProduct};
