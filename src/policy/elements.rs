//! Policy Element Models
//! Core Principle: Seven closed variants behind one capability; keys are resolved once, at load

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

use super::registry_value::PolicyRegistryValue;
use super::resources::ResourceKeyReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyElementType {
    Boolean,
    Decimal,
    Enumeration,
    List,
    LongDecimal,
    MultiText,
    Text,
}

/// Element key if present, else the owning policy key.
pub fn effective_key(element_key: Option<&str>, policy_key: &str) -> String {
    element_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or(policy_key)
        .to_string()
}

/// Item key if present, else the list default key, else the owner key.
pub fn effective_item_key(
    item_key: Option<&str>,
    default_key: Option<&str>,
    owner_key: &str,
) -> String {
    let default_key = default_key.filter(|k| !k.trim().is_empty());
    effective_key(item_key, default_key.unwrap_or(owner_key))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub true_value: Option<Value>,
    pub false_value: Option<Value>,
    pub true_list: Vec<PolicyRegistryValue>,
    pub false_list: Vec<PolicyRegistryValue>,
    /// `None` when the presentation has no check box for this element.
    pub default_checked: Option<bool>,
    pub registry_value: Option<PolicyRegistryValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub min_value: u32,
    pub max_value: u32,
    pub store_as_text: bool,
    pub soft: bool,
    pub default_value: Option<u32>,
    pub registry_value: Option<PolicyRegistryValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongDecimalElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub min_value: u64,
    pub max_value: u64,
    pub store_as_text: bool,
    pub soft: bool,
    pub default_value: Option<u64>,
    pub registry_value: Option<PolicyRegistryValue>,
}

/// One selectable entry of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationItem {
    pub id: String,
    pub display_name_key: Option<ResourceKeyReference>,
    pub display_name: String,
    pub value: Option<Value>,
    /// Secondary values written alongside the item.
    pub item_values: Vec<PolicyRegistryValue>,
}

impl fmt::Display for EnumerationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub items: Vec<EnumerationItem>,
    pub default_index: Option<usize>,
    pub registry_value: Option<PolicyRegistryValue>,
}

impl EnumerationElement {
    pub fn item(&self, id: &str) -> Option<&EnumerationItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }
}

/// Writes `{value_prefix}1..N` under its key; owns no single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
    pub id: String,
    pub key: String,
    pub value_prefix: String,
    pub additive: bool,
    pub expandable: bool,
    pub explicit_value: bool,
}

impl ListElement {
    pub fn value_names(&self, count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("{}{}", self.value_prefix, i)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTextElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub max_length: u32,
    pub max_strings: u32,
    pub registry_value: Option<PolicyRegistryValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub max_length: u32,
    pub expandable: bool,
    pub soft: bool,
    pub default_value: Option<String>,
    pub registry_value: Option<PolicyRegistryValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyElement {
    Boolean(BooleanElement),
    Decimal(DecimalElement),
    Enumeration(EnumerationElement),
    List(ListElement),
    LongDecimal(LongDecimalElement),
    MultiText(MultiTextElement),
    Text(TextElement),
}

impl PolicyElement {
    pub fn id(&self) -> &str {
        match self {
            PolicyElement::Boolean(e) => &e.id,
            PolicyElement::Decimal(e) => &e.id,
            PolicyElement::Enumeration(e) => &e.id,
            PolicyElement::List(e) => &e.id,
            PolicyElement::LongDecimal(e) => &e.id,
            PolicyElement::MultiText(e) => &e.id,
            PolicyElement::Text(e) => &e.id,
        }
    }

    pub fn element_type(&self) -> PolicyElementType {
        match self {
            PolicyElement::Boolean(_) => PolicyElementType::Boolean,
            PolicyElement::Decimal(_) => PolicyElementType::Decimal,
            PolicyElement::Enumeration(_) => PolicyElementType::Enumeration,
            PolicyElement::List(_) => PolicyElementType::List,
            PolicyElement::LongDecimal(_) => PolicyElementType::LongDecimal,
            PolicyElement::MultiText(_) => PolicyElementType::MultiText,
            PolicyElement::Text(_) => PolicyElementType::Text,
        }
    }

    /// Effective key, already resolved against the policy.
    pub fn registry_key_path(&self) -> &str {
        match self {
            PolicyElement::Boolean(e) => &e.key,
            PolicyElement::Decimal(e) => &e.key,
            PolicyElement::Enumeration(e) => &e.key,
            PolicyElement::List(e) => &e.key,
            PolicyElement::LongDecimal(e) => &e.key,
            PolicyElement::MultiText(e) => &e.key,
            PolicyElement::Text(e) => &e.key,
        }
    }

    /// List elements name their values by prefix instead.
    pub fn value_name(&self) -> Option<&str> {
        match self {
            PolicyElement::Boolean(e) => Some(&e.value_name),
            PolicyElement::Decimal(e) => Some(&e.value_name),
            PolicyElement::Enumeration(e) => Some(&e.value_name),
            PolicyElement::List(_) => None,
            PolicyElement::LongDecimal(e) => Some(&e.value_name),
            PolicyElement::MultiText(e) => Some(&e.value_name),
            PolicyElement::Text(e) => Some(&e.value_name),
        }
    }

    pub fn registry_value(&self) -> Option<&PolicyRegistryValue> {
        match self {
            PolicyElement::Boolean(e) => e.registry_value.as_ref(),
            PolicyElement::Decimal(e) => e.registry_value.as_ref(),
            PolicyElement::Enumeration(e) => e.registry_value.as_ref(),
            PolicyElement::List(_) => None,
            PolicyElement::LongDecimal(e) => e.registry_value.as_ref(),
            PolicyElement::MultiText(e) => e.registry_value.as_ref(),
            PolicyElement::Text(e) => e.registry_value.as_ref(),
        }
    }

    /// What this element adds to the policy's default-value list, in order.
    pub fn default_values(&self) -> Vec<PolicyRegistryValue> {
        let mut values: Vec<PolicyRegistryValue> =
            self.registry_value().into_iter().cloned().collect();
        if let PolicyElement::Boolean(e) = self {
            match e.default_checked {
                Some(true) => values.extend(e.true_list.iter().cloned()),
                Some(false) => values.extend(e.false_list.iter().cloned()),
                None => {}
            }
        }
        values
    }

    pub fn is_list(&self) -> bool {
        matches!(self, PolicyElement::List(_))
    }

    /// Text and list elements may store `ExpandString`.
    pub fn is_expandable(&self) -> bool {
        match self {
            PolicyElement::List(e) => e.expandable,
            PolicyElement::Text(e) => e.expandable,
            _ => false,
        }
    }
}
