//! Model Loader
//! Core Principle: Key fallbacks and default rules are applied here once; the engine never
//! re-derives them

use tracing::{debug, trace};

use crate::error::{GroupPolicyError, Result};
use crate::value::Value;

use super::admx::{
    AdmxBooleanElement, AdmxContent, AdmxDecimalElement, AdmxElement, AdmxEnumElement,
    AdmxListElement, AdmxLongDecimalElement, AdmxMultiTextElement, AdmxPolicy,
    AdmxSupportedOnTable, AdmxTextElement, AdmxValueList,
};
use super::definition::{CategoryInfo, PolicyDefinition, PolicyDefinitionFile};
use super::elements::{
    effective_item_key, effective_key, BooleanElement, DecimalElement, EnumerationElement,
    EnumerationItem, ListElement, LongDecimalElement, MultiTextElement, PolicyElement, TextElement,
};
use super::presentation::PolicyPresentation;
use super::registry_value::PolicyRegistryValue;
use super::resources::{EntityReference, ResourceKeyReference};
use super::supported_on::{SupportedOnDefinition, SupportedOnProduct};

/// Build the unresolved model of one ADMX file.
pub fn load_definition_file(content: &AdmxContent) -> Result<PolicyDefinitionFile> {
    let mut file = PolicyDefinitionFile {
        file_path: content.file_path.clone(),
        target_namespace: content.target_namespace.clone(),
        using_namespaces: content.using_namespaces.clone(),
        superseded_files: content.superseded_adm.clone(),
        resources: content.resources.clone(),
        categories: content
            .categories
            .iter()
            .map(|c| CategoryInfo {
                name: c.name.clone(),
                display_name_key: ResourceKeyReference::parse_optional(c.display_name.as_deref()),
                explain_text_key: ResourceKeyReference::parse_optional(c.explain_text.as_deref()),
                parent: c.parent_category.as_deref().map(EntityReference::parse),
            })
            .collect(),
        ..Default::default()
    };

    if let Some(table) = &content.supported_on {
        file.supported_on_products = load_products(table);
        file.supported_on_definitions = load_supported_on_definitions(table);
    }

    let fallback = file.fallback_resource();
    let mut policies = Vec::with_capacity(content.policies.len());
    for policy in &content.policies {
        let presentation = fallback.and_then(|r| r.presentation(&presentation_id(policy)));
        let category_keys = category_chain(content, policy);
        for &section in policy.class.sections() {
            let mut definition = load_policy(policy, presentation)?;
            definition.section = section;
            definition.file_path = content.file_path.clone();
            definition.category_keys = category_keys.clone();
            policies.push(definition);
        }
    }
    file.policies = policies;

    debug!(file = %file, "loaded policy definition file");
    Ok(file)
}

/// Presentation id named by `$(presentation.X)`, else the policy name.
fn presentation_id(policy: &AdmxPolicy) -> String {
    ResourceKeyReference::parse_optional(policy.presentation.as_deref())
        .filter(ResourceKeyReference::is_presentation_reference)
        .map(|r| r.resource_key().to_string())
        .unwrap_or_else(|| policy.name.clone())
}

/// Parent categories, outermost first. The walk stops at a category declared in another file.
fn category_chain(content: &AdmxContent, policy: &AdmxPolicy) -> Vec<EntityReference> {
    let mut chain: Vec<EntityReference> = Vec::new();
    let mut parent = policy.parent_category.clone();

    while let Some(reference) = parent.filter(|r| !r.trim().is_empty()) {
        let entity = EntityReference::parse(&reference);
        if chain.contains(&entity) {
            break;
        }
        chain.insert(0, entity);
        parent = content
            .categories
            .iter()
            .find(|c| c.name == reference)
            .and_then(|c| c.parent_category.clone());
    }
    chain
}

fn load_products(table: &AdmxSupportedOnTable) -> Vec<SupportedOnProduct> {
    let mut products = Vec::new();
    for product in &table.products {
        for major in &product.major_versions {
            let base = SupportedOnProduct {
                product_name: product.name.clone(),
                major_version_name: major.name.clone(),
                minor_version_name: None,
                major_version_index: major.version_index,
                minor_version_index: None,
                product_display_name_key: display_key(product.display_name.as_deref()),
                major_version_display_name_key: display_key(major.display_name.as_deref()),
                minor_version_display_name_key: None,
                product_display_name: String::new(),
                major_version_display_name: String::new(),
                minor_version_display_name: String::new(),
            };
            if major.minor_versions.is_empty() {
                products.push(base);
                continue;
            }
            for minor in &major.minor_versions {
                products.push(SupportedOnProduct {
                    minor_version_name: Some(minor.name.clone()),
                    minor_version_index: Some(minor.version_index),
                    minor_version_display_name_key: display_key(minor.display_name.as_deref()),
                    ..base.clone()
                });
            }
        }
    }
    products
}

fn display_key(text: Option<&str>) -> Option<ResourceKeyReference> {
    ResourceKeyReference::parse_optional(text)
}

fn load_supported_on_definitions(table: &AdmxSupportedOnTable) -> Vec<SupportedOnDefinition> {
    table
        .definitions
        .iter()
        .map(|d| SupportedOnDefinition {
            name: d.name.clone(),
            display_name_key: ResourceKeyReference::parse_optional(d.display_name.as_deref()),
            display_name: String::new(),
            and_conditions: d.and.clone(),
            or_conditions: d.or.clone(),
        })
        .collect()
}

fn load_policy(
    policy: &AdmxPolicy,
    presentation: Option<&PolicyPresentation>,
) -> Result<PolicyDefinition> {
    if policy.key.trim().is_empty() {
        return Err(GroupPolicyError::UnsupportedDefinition(format!(
            "policy '{}' has no registry key",
            policy.name
        )));
    }
    let key = policy.key.as_str();

    let enabled_list =
        policy_value_list(policy, policy.enabled_value.as_ref(), 1, policy.enabled_list.as_ref());
    let disabled_list =
        policy_value_list(policy, policy.disabled_value.as_ref(), 0, policy.disabled_list.as_ref());

    let elements = policy
        .elements
        .iter()
        .map(|e| load_element(e, presentation, key))
        .collect::<Vec<_>>();
    let default_value_list = elements.iter().flat_map(PolicyElement::default_values).collect();

    trace!(policy = %policy.name, elements = elements.len(), "loaded policy");
    Ok(PolicyDefinition {
        name: policy.name.clone(),
        class: policy.class,
        section: crate::gpo::PolicySection::Machine,
        file_path: String::new(),
        key: key.to_string(),
        value_name: policy.value_name.clone(),
        display_name_key: ResourceKeyReference::parse_optional(policy.display_name.as_deref()),
        explain_text_key: ResourceKeyReference::parse_optional(policy.explain_text.as_deref()),
        presentation_id: presentation_id(policy),
        category_keys: Vec::new(),
        supported_on_key: policy.supported_on.as_deref().map(EntityReference::parse),
        enabled_list,
        disabled_list,
        default_value_list,
        elements,
        display_name: String::new(),
        explain_text: String::new(),
        category_display_names: Vec::new(),
        supported_on: None,
        resolved: false,
    })
}

/// Policy-level value first (`implicit` when only a value name is declared), then the list items.
/// An item without a value removes its entry.
fn policy_value_list(
    policy: &AdmxPolicy,
    explicit: Option<&Value>,
    implicit: u32,
    list: Option<&AdmxValueList>,
) -> Vec<PolicyRegistryValue> {
    let mut values = Vec::new();
    let value_name = policy.value_name.clone().unwrap_or_default();

    match explicit {
        Some(value) => {
            values.push(PolicyRegistryValue::new(&policy.key, value_name, value.clone()))
        }
        None if policy.value_name.is_some() => {
            values.push(PolicyRegistryValue::new(&policy.key, value_name, Value::Decimal(implicit)))
        }
        None => {}
    }

    if let Some(list) = list {
        for item in &list.items {
            let key =
                effective_item_key(item.key.as_deref(), list.default_key.as_deref(), &policy.key);
            let value = item.value.clone().unwrap_or(Value::Delete);
            values.push(PolicyRegistryValue::new(key, item.value_name.clone(), value));
        }
    }
    values
}

/// Item values of a boolean or enumeration list. Items without a value are dropped.
fn element_value_list(list: Option<&AdmxValueList>, owner_key: &str) -> Vec<PolicyRegistryValue> {
    let Some(list) = list else {
        return Vec::new();
    };
    list.items
        .iter()
        .filter_map(|item| {
            let value = item.value.clone()?;
            let key =
                effective_item_key(item.key.as_deref(), list.default_key.as_deref(), owner_key);
            Some(PolicyRegistryValue::new(key, item.value_name.clone(), value))
        })
        .collect()
}

fn load_element(
    element: &AdmxElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> PolicyElement {
    match element {
        AdmxElement::Boolean(e) => {
            PolicyElement::Boolean(load_boolean(e, presentation, policy_key))
        }
        AdmxElement::Decimal(e) => {
            PolicyElement::Decimal(load_decimal(e, presentation, policy_key))
        }
        AdmxElement::Enum(e) => {
            PolicyElement::Enumeration(load_enumeration(e, presentation, policy_key))
        }
        AdmxElement::List(e) => PolicyElement::List(load_list(e, policy_key)),
        AdmxElement::LongDecimal(e) => {
            PolicyElement::LongDecimal(load_long_decimal(e, presentation, policy_key))
        }
        AdmxElement::MultiText(e) => PolicyElement::MultiText(load_multi_text(e, policy_key)),
        AdmxElement::Text(e) => PolicyElement::Text(load_text(e, presentation, policy_key)),
    }
}

fn load_boolean(
    e: &AdmxBooleanElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> BooleanElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    let default_checked = presentation.and_then(|p| p.check_box_default(&e.id));
    let registry_value = PolicyRegistryValue::for_boolean(
        &key,
        &e.value_name,
        default_checked,
        e.true_value.as_ref(),
        e.false_value.as_ref(),
    );
    BooleanElement {
        id: e.id.clone(),
        true_list: element_value_list(e.true_list.as_ref(), &key),
        false_list: element_value_list(e.false_list.as_ref(), &key),
        value_name: e.value_name.clone(),
        true_value: e.true_value.clone(),
        false_value: e.false_value.clone(),
        default_checked,
        registry_value,
        key,
    }
}

fn load_decimal(
    e: &AdmxDecimalElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> DecimalElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    let default_value = presentation.and_then(|p| p.decimal_default(&e.id));
    let registry_value =
        PolicyRegistryValue::for_decimal(&key, &e.value_name, default_value, e.store_as_text);
    DecimalElement {
        id: e.id.clone(),
        registry_value,
        value_name: e.value_name.clone(),
        required: e.required,
        min_value: e.min_value,
        max_value: e.max_value,
        store_as_text: e.store_as_text,
        soft: e.soft,
        default_value,
        key,
    }
}

fn load_long_decimal(
    e: &AdmxLongDecimalElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> LongDecimalElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    let default_value = presentation.and_then(|p| p.long_decimal_default(&e.id));
    let registry_value =
        PolicyRegistryValue::for_long_decimal(&key, &e.value_name, default_value, e.store_as_text);
    LongDecimalElement {
        id: e.id.clone(),
        registry_value,
        value_name: e.value_name.clone(),
        required: e.required,
        min_value: e.min_value,
        max_value: e.max_value,
        store_as_text: e.store_as_text,
        soft: e.soft,
        default_value,
        key,
    }
}

/// Identifier-safe id taken from the item's display name key.
fn item_id(display_name: &str) -> String {
    let source = ResourceKeyReference::parse(display_name)
        .map(|r| r.resource_key().to_string())
        .unwrap_or_else(|_| display_name.to_string());
    source
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn load_enumeration(
    e: &AdmxEnumElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> EnumerationElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    let items: Vec<EnumerationItem> = e
        .items
        .iter()
        .map(|item| EnumerationItem {
            id: item_id(&item.display_name),
            display_name_key: ResourceKeyReference::parse_optional(Some(&item.display_name)),
            display_name: String::new(),
            value: item.value.clone(),
            item_values: element_value_list(item.value_list.as_ref(), &key),
        })
        .collect();

    let default_index = presentation.and_then(|p| p.dropdown_default(&e.id));
    let item_values: Vec<Option<Value>> = items.iter().map(|i| i.value.clone()).collect();
    let registry_value =
        PolicyRegistryValue::for_enumeration(&key, &e.value_name, &item_values, default_index);
    EnumerationElement {
        id: e.id.clone(),
        registry_value,
        value_name: e.value_name.clone(),
        required: e.required,
        items,
        default_index,
        key,
    }
}

fn load_list(e: &AdmxListElement, policy_key: &str) -> ListElement {
    ListElement {
        id: e.id.clone(),
        key: effective_key(e.key.as_deref(), policy_key),
        value_prefix: e.value_prefix.clone(),
        additive: e.additive,
        expandable: e.expandable,
        explicit_value: e.explicit_value,
    }
}

fn load_multi_text(e: &AdmxMultiTextElement, policy_key: &str) -> MultiTextElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    MultiTextElement {
        id: e.id.clone(),
        registry_value: Some(PolicyRegistryValue::for_multi_text(&key, &e.value_name)),
        value_name: e.value_name.clone(),
        required: e.required,
        max_length: e.max_length,
        max_strings: e.max_strings,
        key,
    }
}

fn load_text(
    e: &AdmxTextElement,
    presentation: Option<&PolicyPresentation>,
    policy_key: &str,
) -> TextElement {
    let key = effective_key(e.key.as_deref(), policy_key);
    let default_value = presentation.and_then(|p| p.text_default(&e.id)).map(str::to_string);
    let registry_value =
        PolicyRegistryValue::for_text(&key, &e.value_name, default_value.as_deref());
    TextElement {
        id: e.id.clone(),
        registry_value,
        value_name: e.value_name.clone(),
        required: e.required,
        max_length: e.max_length,
        expandable: e.expandable,
        soft: e.soft,
        default_value,
        key,
    }
}
