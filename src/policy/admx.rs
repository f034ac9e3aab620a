//! Parsed ADMX/ADML input
//! Core Principle: The XML parser is a collaborator; this is the tree it hands over, as JSON

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

use super::definition::{PolicyClass, PolicyNamespace};
use super::resources::PolicyResourceInfo;
use super::supported_on::SupportedCriteria;

/// One ADMX file plus its ADML resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxContent {
    #[serde(default)]
    pub file_path: String,
    pub target_namespace: PolicyNamespace,
    #[serde(default)]
    pub using_namespaces: Vec<PolicyNamespace>,
    #[serde(default)]
    pub superseded_adm: Vec<String>,
    #[serde(default)]
    pub supported_on: Option<AdmxSupportedOnTable>,
    #[serde(default)]
    pub categories: Vec<AdmxCategory>,
    #[serde(default)]
    pub policies: Vec<AdmxPolicy>,
    #[serde(default)]
    pub resources: Vec<PolicyResourceInfo>,
}

impl AdmxContent {
    /// Load one parsed file, or an array of them.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Vec<AdmxContent>> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Vec<AdmxContent>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.is_array() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(vec![serde_json::from_value(value)?])
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxCategory {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub explain_text: Option<String>,
    #[serde(default)]
    pub parent_category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxPolicy {
    pub name: String,
    pub class: PolicyClass,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub explain_text: Option<String>,
    #[serde(default)]
    pub presentation: Option<String>,
    pub key: String,
    #[serde(default)]
    pub value_name: Option<String>,
    #[serde(default)]
    pub parent_category: Option<String>,
    #[serde(default)]
    pub supported_on: Option<String>,
    #[serde(default)]
    pub enabled_value: Option<Value>,
    #[serde(default)]
    pub disabled_value: Option<Value>,
    #[serde(default)]
    pub enabled_list: Option<AdmxValueList>,
    #[serde(default)]
    pub disabled_list: Option<AdmxValueList>,
    #[serde(default)]
    pub elements: Vec<AdmxElement>,
}

/// `<enabledList>`, `<trueList>` and friends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxValueList {
    #[serde(default)]
    pub default_key: Option<String>,
    #[serde(default)]
    pub items: Vec<AdmxValueItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxValueItem {
    #[serde(default)]
    pub key: Option<String>,
    pub value_name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

fn default_max_decimal() -> u32 {
    9999
}

fn default_max_long_decimal() -> u64 {
    9999
}

fn default_max_length() -> u32 {
    1023
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AdmxElement {
    Boolean(AdmxBooleanElement),
    Decimal(AdmxDecimalElement),
    Enum(AdmxEnumElement),
    List(AdmxListElement),
    LongDecimal(AdmxLongDecimalElement),
    MultiText(AdmxMultiTextElement),
    Text(AdmxTextElement),
}

impl AdmxElement {
    pub fn id(&self) -> &str {
        match self {
            AdmxElement::Boolean(e) => &e.id,
            AdmxElement::Decimal(e) => &e.id,
            AdmxElement::Enum(e) => &e.id,
            AdmxElement::List(e) => &e.id,
            AdmxElement::LongDecimal(e) => &e.id,
            AdmxElement::MultiText(e) => &e.id,
            AdmxElement::Text(e) => &e.id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxBooleanElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub true_value: Option<Value>,
    #[serde(default)]
    pub false_value: Option<Value>,
    #[serde(default)]
    pub true_list: Option<AdmxValueList>,
    #[serde(default)]
    pub false_list: Option<AdmxValueList>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxDecimalElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_value: u32,
    #[serde(default = "default_max_decimal")]
    pub max_value: u32,
    #[serde(default)]
    pub store_as_text: bool,
    #[serde(default)]
    pub soft: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxLongDecimalElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_value: u64,
    #[serde(default = "default_max_long_decimal")]
    pub max_value: u64,
    #[serde(default)]
    pub store_as_text: bool,
    #[serde(default)]
    pub soft: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxEnumElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub items: Vec<AdmxEnumItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxEnumItem {
    pub display_name: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub value_list: Option<AdmxValueList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxListElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_prefix: String,
    #[serde(default)]
    pub additive: bool,
    #[serde(default)]
    pub expandable: bool,
    #[serde(default)]
    pub explicit_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxMultiTextElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default)]
    pub max_strings: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxTextElement {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default)]
    pub expandable: bool,
    #[serde(default)]
    pub soft: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxSupportedOnTable {
    #[serde(default)]
    pub products: Vec<AdmxProduct>,
    #[serde(default)]
    pub definitions: Vec<AdmxSupportedOnDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxProduct {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub major_versions: Vec<AdmxMajorVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxMajorVersion {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version_index: u32,
    #[serde(default)]
    pub minor_versions: Vec<AdmxMinorVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxMinorVersion {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmxSupportedOnDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub and: Vec<SupportedCriteria>,
    #[serde(default)]
    pub or: Vec<SupportedCriteria>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_defaults_apply_when_omitted() {
        let json = r#"{ "kind": "decimal", "id": "Port", "valueName": "Port" }"#;
        let element: AdmxElement = serde_json::from_str(json).unwrap();
        match element {
            AdmxElement::Decimal(d) => {
                assert_eq!(d.min_value, 0);
                assert_eq!(d.max_value, 9999);
                assert!(!d.store_as_text);
                assert_eq!(d.key, None);
            }
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn values_use_tagged_form() {
        let item: AdmxValueItem =
            serde_json::from_str(r#"{ "valueName": "A", "value": { "type": "delete" } }"#).unwrap();
        assert_eq!(item.value, Some(Value::Delete));

        let json = r#"{ "valueName": "B", "value": { "type": "longDecimal", "value": 7 } }"#;
        let item: AdmxValueItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.value, Some(Value::LongDecimal(7)));
    }

    #[test]
    fn single_object_or_array_both_load() {
        let single = r#"{ "targetNamespace": { "prefix": "a", "namespace": "A.Policies" } }"#;
        assert_eq!(AdmxContent::from_json_str(single).unwrap().len(), 1);

        let many = format!("[{single}, {single}]");
        assert_eq!(AdmxContent::from_json_str(&many).unwrap().len(), 2);
    }
}
