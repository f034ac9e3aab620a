//! Policy Application Engine
//! Core Principle: Read, compare, then write; a value already in place is never rewritten

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GroupPolicyError, Result};
use crate::gpo::{
    DeleteMultipleGroupPolicyRequest, GroupPolicyDeleteResult, GroupPolicyLocation,
    GroupPolicyProvider, GroupPolicyQueryResult, GroupPolicyUpdateResult,
    MultipleGroupPolicyQueryResult, PolicySection, SetMultipleGroupPolicyRequest,
};
use crate::group_policy::{GroupPolicy, SaveOptions};
use crate::value::Value;

use super::definition::PolicyDefinition;
use super::elements::{ListElement, PolicyElement};
use super::registry_value::PolicyRegistryValue;

/// Aggregate state of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyStatus {
    NotConfigured,
    ConfiguredAndEnabled,
    ConfiguredAndDisabled,
}

/// State of one registry value against its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyValueStatus {
    NotConfigured,
    ConfiguredAndMatches,
    ConfiguredButDifferent,
}

/// What happened to one registry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyModifyResult {
    NotChanged,
    Updated,
    Deleted,
    Skipped,
    /// The registry was changed in memory but `Save` kept failing; retry the whole operation.
    SaveFailed,
}

impl fmt::Display for PolicyModifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PolicyModifyResult::NotChanged => "not changed",
            PolicyModifyResult::Updated => "updated",
            PolicyModifyResult::Deleted => "deleted",
            PolicyModifyResult::Skipped => "skipped",
            PolicyModifyResult::SaveFailed => "save failed",
        };
        f.write_str(text)
    }
}

/// Input for `set_element`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ElementInput {
    Single(Value),
    Multiple(Vec<Value>),
}

/// Registry changes made by one engine call, in the order they were made.
pub type ModifiedValues = Vec<(PolicyRegistryValue, PolicyModifyResult)>;

/// Reads, applies and resets policies through a `GroupPolicy` facade.
pub struct PolicyEngine<P: GroupPolicyProvider> {
    group_policy: GroupPolicy<P>,
}

impl<P: GroupPolicyProvider> Clone for PolicyEngine<P> {
    fn clone(&self) -> Self {
        PolicyEngine {
            group_policy: self.group_policy.clone(),
        }
    }
}

impl<P: GroupPolicyProvider> PolicyEngine<P> {
    pub fn new(group_policy: GroupPolicy<P>) -> Self {
        PolicyEngine { group_policy }
    }

    pub fn group_policy(&self) -> &GroupPolicy<P> {
        &self.group_policy
    }

    fn save_options(subject_id: Uuid, retry_count: Option<u32>) -> SaveOptions {
        SaveOptions {
            retry_count,
            client_guid: Some(subject_id),
        }
    }

    fn query(
        &self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        sid: Option<&str>,
    ) -> Result<GroupPolicyQueryResult> {
        let location = GroupPolicyLocation::for_principal(sid)?;
        self.group_policy.get_policy(location, section, key, value_name)
    }

    /// Prefix enumeration that refuses to pass off a failed read as an empty key.
    fn enumerate(
        &self,
        location: GroupPolicyLocation,
        section: PolicySection,
        key: &str,
        prefix: &str,
    ) -> Result<MultipleGroupPolicyQueryResult> {
        let list = self.group_policy.get_policies(location, section, key, Some(prefix))?;
        if !list.succeed {
            warn!(key, prefix, code = list.last_error_code, "prefix enumeration failed");
            return Err(GroupPolicyError::native(
                format!("Cannot enumerate '{prefix}' values under '{key}'."),
                list.last_error_code,
            ));
        }
        Ok(list)
    }

    /// Stored value of `target`'s slot; `None` when unset or not representable as a `Value`.
    pub fn read_raw_value(
        &self,
        target: &PolicyRegistryValue,
        section: PolicySection,
        sid: Option<&str>,
    ) -> Result<Option<Value>> {
        let result = self.query(section, target.registry_key_path(), target.value_name(), sid)?;
        Ok(result.policy_value())
    }

    /// Every value under `key` whose name starts with `prefix`, ignoring case, in enumeration
    /// order.
    pub fn read_raw_values(
        &self,
        section: PolicySection,
        key: &str,
        prefix: &str,
        sid: Option<&str>,
    ) -> Result<Vec<(String, Value)>> {
        let location = GroupPolicyLocation::for_principal(sid)?;
        let list = self.enumerate(location, section, key, prefix)?;
        Ok(list
            .results
            .into_iter()
            .filter_map(|r| {
                let value = r.policy_value()?;
                Some((r.value_name, value))
            })
            .collect())
    }

    pub fn is_applied(
        &self,
        target: &PolicyRegistryValue,
        section: PolicySection,
        sid: Option<&str>,
    ) -> Result<PolicyValueStatus> {
        let status = match self.read_raw_value(target, section, sid)? {
            None => PolicyValueStatus::NotConfigured,
            Some(current) if current == *target.value() => PolicyValueStatus::ConfiguredAndMatches,
            Some(_) => PolicyValueStatus::ConfiguredButDifferent,
        };
        Ok(status)
    }

    /// Bring one slot to `target`'s value.
    pub fn apply(
        &self,
        target: &PolicyRegistryValue,
        section: PolicySection,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<PolicyModifyResult> {
        self.apply_with(target, false, section, subject_id, sid, retry_count)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_with(
        &self,
        target: &PolicyRegistryValue,
        expandable: bool,
        section: PolicySection,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<PolicyModifyResult> {
        let current = self.query(section, target.registry_key_path(), target.value_name(), sid)?;
        let options = Self::save_options(subject_id, retry_count);

        let result = if !current.value_exists {
            if target.is_delete_value() {
                PolicyModifyResult::NotChanged
            } else {
                self.write(target, expandable, section, sid, options)?
            }
        } else if target.is_delete_value() {
            self.delete(target, section, sid, options)?
        } else if current.policy_value().as_ref() == Some(target.value()) {
            PolicyModifyResult::Skipped
        } else {
            self.write(target, expandable, section, sid, options)?
        };

        debug!(%section, value = %target, %result, "applied registry value");
        Ok(result)
    }

    /// Remove one slot if it is set.
    pub fn reset_value(
        &self,
        target: &PolicyRegistryValue,
        section: PolicySection,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<PolicyModifyResult> {
        let current = self.query(section, target.registry_key_path(), target.value_name(), sid)?;
        if !current.value_exists {
            return Ok(PolicyModifyResult::NotChanged);
        }
        let options = Self::save_options(subject_id, retry_count);
        let result = self.delete(target, section, sid, options)?;
        debug!(%section, value = %target, %result, "reset registry value");
        Ok(result)
    }

    fn write(
        &self,
        target: &PolicyRegistryValue,
        expandable: bool,
        section: PolicySection,
        sid: Option<&str>,
        options: SaveOptions,
    ) -> Result<PolicyModifyResult> {
        let location = GroupPolicyLocation::for_principal(sid)?;
        let result = self.group_policy.set_policy(
            location,
            section,
            target.registry_key_path(),
            target.value_name(),
            target.value(),
            expandable,
            options,
        )?;
        update_outcome(target.registry_key_path(), target.value_name(), result)
    }

    fn delete(
        &self,
        target: &PolicyRegistryValue,
        section: PolicySection,
        sid: Option<&str>,
        options: SaveOptions,
    ) -> Result<PolicyModifyResult> {
        let location = GroupPolicyLocation::for_principal(sid)?;
        let result = self.group_policy.delete_policy(
            location,
            section,
            target.registry_key_path(),
            target.value_name(),
            options,
        )?;
        delete_outcome(target.registry_key_path(), target.value_name(), result)
    }

    /// Enabled when every enabled-list value matches, else disabled when every disabled-list
    /// value matches.
    pub fn query_status(
        &self,
        policy: &PolicyDefinition,
        sid: Option<&str>,
    ) -> Result<PolicyStatus> {
        let section = policy.section();
        if self.all_match(&policy.enabled_list, section, sid)? {
            return Ok(PolicyStatus::ConfiguredAndEnabled);
        }
        if self.all_match(&policy.disabled_list, section, sid)? {
            return Ok(PolicyStatus::ConfiguredAndDisabled);
        }
        Ok(PolicyStatus::NotConfigured)
    }

    fn all_match(
        &self,
        values: &[PolicyRegistryValue],
        section: PolicySection,
        sid: Option<&str>,
    ) -> Result<bool> {
        if values.is_empty() {
            return Ok(false);
        }
        for value in values {
            if self.is_applied(value, section, sid)? != PolicyValueStatus::ConfiguredAndMatches {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reset, then the enabled list, then element defaults.
    pub fn enable_policy(
        &self,
        policy: &PolicyDefinition,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let mut modified = self.reset_policy(policy, subject_id, sid, retry_count)?;
        let section = policy.section();
        for value in policy.enabled_list.iter().chain(&policy.default_value_list) {
            let result = self.apply(value, section, subject_id, sid, retry_count)?;
            modified.push((value.clone(), result));
        }
        info!(policy = %policy.name, %section, changes = modified.len(), "enabled policy");
        Ok(modified)
    }

    /// Reset, then the disabled list.
    pub fn disable_policy(
        &self,
        policy: &PolicyDefinition,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let mut modified = self.reset_policy(policy, subject_id, sid, retry_count)?;
        let section = policy.section();
        for value in &policy.disabled_list {
            let result = self.apply(value, section, subject_id, sid, retry_count)?;
            modified.push((value.clone(), result));
        }
        info!(policy = %policy.name, %section, changes = modified.len(), "disabled policy");
        Ok(modified)
    }

    /// Delete every slot the enabled, default and disabled lists name.
    pub fn reset_policy(
        &self,
        policy: &PolicyDefinition,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let section = policy.section();
        let mut modified = Vec::new();
        for value in policy
            .enabled_list
            .iter()
            .chain(&policy.default_value_list)
            .chain(&policy.disabled_list)
        {
            let result = self.reset_value(value, section, subject_id, sid, retry_count)?;
            modified.push((value.clone(), result));
        }
        debug!(policy = %policy.name, %section, "reset policy");
        Ok(modified)
    }

    /// Current value of a scalar element; `None` when the element is unknown or its slot is unset.
    pub fn get_element(
        &self,
        policy: &PolicyDefinition,
        element_id: &str,
        sid: Option<&str>,
    ) -> Result<Option<Value>> {
        let Some(element) = policy.element(element_id) else {
            return Ok(None);
        };
        let value_name = element
            .value_name()
            .ok_or_else(|| GroupPolicyError::UseListAccessor(element_id.to_string()))?;
        let result = self.query(policy.section(), element.registry_key_path(), value_name, sid)?;
        Ok(result.policy_value())
    }

    /// Current items of a list element, ordered by their numeric suffix.
    pub fn get_list_element(
        &self,
        policy: &PolicyDefinition,
        element_id: &str,
        sid: Option<&str>,
    ) -> Result<Vec<Value>> {
        let list = match policy.element(element_id) {
            None => return Ok(Vec::new()),
            Some(PolicyElement::List(list)) => list,
            Some(_) => return Err(GroupPolicyError::UseScalarAccessor(element_id.to_string())),
        };
        let mut items: Vec<(u32, Value)> = self
            .read_raw_values(policy.section(), &list.key, &list.value_prefix, sid)?
            .into_iter()
            .filter_map(|(name, value)| Some((list_index(&list.value_prefix, &name)?, value)))
            .collect();
        items.sort_by_key(|(index, _)| *index);
        Ok(items.into_iter().map(|(_, value)| value).collect())
    }

    /// Write an element. A boolean or enumeration value also applies the registry list tied to it.
    pub fn set_element(
        &self,
        policy: &PolicyDefinition,
        element_id: &str,
        input: ElementInput,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let element = policy
            .element(element_id)
            .ok_or_else(|| GroupPolicyError::ElementNotFound(element_id.to_string()))?;
        let section = policy.section();

        let modified = match (element, input) {
            (PolicyElement::List(list), ElementInput::Multiple(values)) => {
                self.rewrite_list(list, values, section, subject_id, sid, retry_count)?
            }
            (PolicyElement::List(_), ElementInput::Single(_)) => {
                return Err(GroupPolicyError::UseListAccessor(element_id.to_string()))
            }
            (_, ElementInput::Multiple(_)) => {
                return Err(GroupPolicyError::UseScalarAccessor(element_id.to_string()))
            }
            (element, ElementInput::Single(value)) => {
                let value_name = element
                    .value_name()
                    .ok_or_else(|| GroupPolicyError::UseListAccessor(element_id.to_string()))?;
                let key = element.registry_key_path();
                let target = PolicyRegistryValue::new(key, value_name, value);
                let expandable = element.is_expandable();
                let mut modified = Vec::new();
                let result =
                    self.apply_with(&target, expandable, section, subject_id, sid, retry_count)?;
                modified.push((target.clone(), result));
                for secondary in linked_values(element, target.value()) {
                    let result = self.apply(&secondary, section, subject_id, sid, retry_count)?;
                    modified.push((secondary, result));
                }
                modified
            }
        };

        info!(
            policy = %policy.name,
            element = element_id,
            changes = modified.len(),
            "set policy element"
        );
        Ok(modified)
    }

    /// Select an enumeration item by id and write its value.
    pub fn select_enum_item(
        &self,
        policy: &PolicyDefinition,
        element_id: &str,
        item_id: &str,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let element = match policy.element(element_id) {
            Some(PolicyElement::Enumeration(element)) => element,
            Some(_) => {
                return Err(GroupPolicyError::UnsupportedDefinition(format!(
                    "element '{element_id}' is not an enumeration"
                )))
            }
            None => return Err(GroupPolicyError::ElementNotFound(element_id.to_string())),
        };
        let value = element
            .item(item_id)
            .and_then(|item| item.value.clone())
            .ok_or_else(|| GroupPolicyError::ElementNotFound(format!("{element_id}/{item_id}")))?;
        let input = ElementInput::Single(value);
        self.set_element(policy, element_id, input, subject_id, sid, retry_count)
    }

    /// Delete whatever the element may have written.
    pub fn reset_element(
        &self,
        policy: &PolicyDefinition,
        element_id: &str,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        let element = policy
            .element(element_id)
            .ok_or_else(|| GroupPolicyError::ElementNotFound(element_id.to_string()))?;
        let section = policy.section();

        if let PolicyElement::List(list) = element {
            return self.rewrite_list(list, Vec::new(), section, subject_id, sid, retry_count);
        }

        let mut targets = Vec::new();
        if let Some(value_name) = element.value_name() {
            let key = element.registry_key_path();
            targets.push(PolicyRegistryValue::new(key, value_name, Value::Delete));
        }
        targets.extend(all_linked_values(element));

        let mut modified = Vec::new();
        for target in targets {
            let result = self.reset_value(&target, section, subject_id, sid, retry_count)?;
            modified.push((target, result));
        }
        info!(policy = %policy.name, element = element_id, "reset policy element");
        Ok(modified)
    }

    /// Delete every `{prefix}N` value, then write `{prefix}1..{prefix}K`.
    ///
    /// Nothing is written unless the existing entries could be enumerated.
    fn rewrite_list(
        &self,
        list: &ListElement,
        values: Vec<Value>,
        section: PolicySection,
        subject_id: Uuid,
        sid: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<ModifiedValues> {
        for value in &values {
            value.to_registry_data(list.expandable)?;
        }
        let options = Self::save_options(subject_id, retry_count);
        let location = GroupPolicyLocation::for_principal(sid)?;
        let mut modified = Vec::new();

        let stale: Vec<String> = self
            .enumerate(location.clone(), section, &list.key, &list.value_prefix)?
            .results
            .into_iter()
            .map(|r| r.value_name)
            .filter(|name| list_index(&list.value_prefix, name).is_some())
            .collect();

        if !stale.is_empty() {
            let requests = stale
                .iter()
                .map(|name| DeleteMultipleGroupPolicyRequest::new(list.key.as_str(), name.as_str()))
                .collect();
            let results =
                self.group_policy
                    .delete_policies(location.clone(), section, requests, options)?;
            for (name, result) in stale.into_iter().zip(results) {
                let outcome = delete_outcome(&list.key, &name, result)?;
                let removed = PolicyRegistryValue::new(list.key.as_str(), name, Value::Delete);
                modified.push((removed, outcome));
            }
        }

        if !values.is_empty() {
            let targets: Vec<PolicyRegistryValue> = list
                .value_names(values.len())
                .into_iter()
                .zip(values)
                .map(|(name, value)| PolicyRegistryValue::new(list.key.as_str(), name, value))
                .collect();
            let requests = targets
                .iter()
                .map(|t| SetMultipleGroupPolicyRequest {
                    sub_key: t.registry_key_path().to_string(),
                    value_name: t.value_name().to_string(),
                    value: t.value().clone(),
                    require_expand_string: list.expandable,
                })
                .collect();
            let results = self.group_policy.set_policies(location, section, requests, options)?;
            for (target, result) in targets.into_iter().zip(results) {
                let outcome =
                    update_outcome(target.registry_key_path(), target.value_name(), result)?;
                modified.push((target, outcome));
            }
        }

        debug!(
            key = %list.key,
            prefix = %list.value_prefix,
            changes = modified.len(),
            "rewrote list element"
        );
        Ok(modified)
    }
}

fn update_outcome(
    key: &str,
    value_name: &str,
    result: GroupPolicyUpdateResult,
) -> Result<PolicyModifyResult> {
    match result {
        GroupPolicyUpdateResult::UpdateSucceed => Ok(PolicyModifyResult::Updated),
        GroupPolicyUpdateResult::SaveFailed => {
            warn!(key, value_name, "registry value written but not saved");
            Ok(PolicyModifyResult::SaveFailed)
        }
        GroupPolicyUpdateResult::CreateOrOpenFailed | GroupPolicyUpdateResult::SetFailed => {
            Err(GroupPolicyError::WriteFailed {
                key: key.to_string(),
                value_name: value_name.to_string(),
                result,
            })
        }
    }
}

fn delete_outcome(
    key: &str,
    value_name: &str,
    result: GroupPolicyDeleteResult,
) -> Result<PolicyModifyResult> {
    match result {
        GroupPolicyDeleteResult::DeleteSucceed => Ok(PolicyModifyResult::Deleted),
        GroupPolicyDeleteResult::NoItemFound => Ok(PolicyModifyResult::NotChanged),
        GroupPolicyDeleteResult::SaveFailed => {
            warn!(key, value_name, "registry value deleted but not saved");
            Ok(PolicyModifyResult::SaveFailed)
        }
        GroupPolicyDeleteResult::CreateOrOpenFailed => Err(GroupPolicyError::DeleteFailed {
            key: key.to_string(),
            value_name: value_name.to_string(),
            result,
        }),
    }
}

/// Numeric suffix of a `{prefix}N` value name, prefix compared ignoring case.
fn list_index(prefix: &str, name: &str) -> Option<u32> {
    let head = name.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let suffix = &name[prefix.len()..];
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Registry list tied to the value a boolean or enumeration element was set to.
fn linked_values(element: &PolicyElement, value: &Value) -> Vec<PolicyRegistryValue> {
    match element {
        PolicyElement::Boolean(e) if e.true_value.as_ref() == Some(value) => e.true_list.clone(),
        PolicyElement::Boolean(e) if e.false_value.as_ref() == Some(value) => e.false_list.clone(),
        PolicyElement::Enumeration(e) => e
            .items
            .iter()
            .find(|item| item.value.as_ref() == Some(value))
            .map(|item| item.item_values.clone())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn all_linked_values(element: &PolicyElement) -> Vec<PolicyRegistryValue> {
    match element {
        PolicyElement::Boolean(e) => e.true_list.iter().chain(&e.false_list).cloned().collect(),
        PolicyElement::Enumeration(e) => {
            e.items.iter().flat_map(|i| i.item_values.iter().cloned()).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::gpo::{InMemoryProvider, RegistryData};
    use crate::policy::definition::PolicyClass;
    use crate::policy::elements::{
        BooleanElement, EnumerationElement, EnumerationItem, TextElement,
    };

    const KEY: &str = r"Software\Policies\Contoso";

    fn engine() -> (InMemoryProvider, PolicyEngine<InMemoryProvider>) {
        let provider = InMemoryProvider::new();
        let gp = GroupPolicy::new(provider.clone(), EngineConfig::default());
        (provider, PolicyEngine::new(gp))
    }

    fn stored(provider: &InMemoryProvider, name: &str) -> Option<RegistryData> {
        let location = GroupPolicyLocation::ThisComputer;
        provider.persisted_value(&location, PolicySection::Machine, KEY, name)
    }

    fn policy(elements: Vec<PolicyElement>) -> PolicyDefinition {
        PolicyDefinition {
            name: "Sample".into(),
            class: PolicyClass::Machine,
            section: PolicySection::Machine,
            file_path: "contoso.admx".into(),
            key: KEY.into(),
            value_name: Some("Enabled".into()),
            display_name_key: None,
            explain_text_key: None,
            presentation_id: String::new(),
            category_keys: Vec::new(),
            supported_on_key: None,
            enabled_list: vec![PolicyRegistryValue::new(KEY, "Enabled", Value::Decimal(1))],
            disabled_list: vec![PolicyRegistryValue::new(KEY, "Enabled", Value::Decimal(0))],
            default_value_list: Vec::new(),
            elements,
            display_name: String::new(),
            explain_text: String::new(),
            category_display_names: Vec::new(),
            supported_on: None,
            resolved: false,
        }
    }

    fn list_policy() -> PolicyDefinition {
        policy(vec![PolicyElement::List(ListElement {
            id: "Hosts".into(),
            key: KEY.into(),
            value_prefix: "Host".into(),
            additive: false,
            expandable: false,
            explicit_value: false,
        })])
    }

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::String(s.to_string())).collect()
    }

    #[test]
    fn apply_follows_the_comparison_table() {
        let (provider, engine) = engine();
        let id = Uuid::new_v4();
        let section = PolicySection::Machine;
        let one = PolicyRegistryValue::new(KEY, "Level", Value::Decimal(1));
        let two = one.with_value(Value::Decimal(2));
        let gone = one.with_value(Value::Delete);

        let apply = |v: &PolicyRegistryValue| engine.apply(v, section, id, None, None).unwrap();
        assert_eq!(apply(&gone), PolicyModifyResult::NotChanged);
        assert_eq!(apply(&one), PolicyModifyResult::Updated);
        assert_eq!(apply(&one), PolicyModifyResult::Skipped);
        assert_eq!(apply(&two), PolicyModifyResult::Updated);
        assert_eq!(apply(&gone), PolicyModifyResult::Deleted);
        assert_eq!(stored(&provider, "Level"), None);
        assert_eq!(provider.last_save_client(), Some(id));
    }

    #[test]
    fn cross_kind_values_never_match() {
        let (_provider, engine) = engine();
        let id = Uuid::new_v4();
        let dword = PolicyRegistryValue::new(KEY, "Level", Value::Decimal(1));
        engine.apply(&dword, PolicySection::Machine, id, None, None).unwrap();

        let qword = dword.with_value(Value::LongDecimal(1));
        assert_eq!(
            engine.is_applied(&qword, PolicySection::Machine, None).unwrap(),
            PolicyValueStatus::ConfiguredButDifferent
        );
        assert_eq!(
            engine.is_applied(&dword, PolicySection::User, None).unwrap(),
            PolicyValueStatus::NotConfigured
        );
    }

    #[test]
    fn reset_value_is_idempotent() {
        let (_provider, engine) = engine();
        let id = Uuid::new_v4();
        let section = PolicySection::Machine;
        let value = PolicyRegistryValue::new(KEY, "Level", Value::String("x".into()));
        engine.apply(&value, section, id, None, None).unwrap();
        assert_eq!(
            engine.reset_value(&value, section, id, None, None).unwrap(),
            PolicyModifyResult::Deleted
        );
        assert_eq!(
            engine.reset_value(&value, section, id, None, None).unwrap(),
            PolicyModifyResult::NotChanged
        );
    }

    #[test]
    fn empty_lists_never_report_a_configured_state() {
        let (_provider, engine) = engine();
        let mut sample = policy(Vec::new());
        sample.enabled_list.clear();
        sample.disabled_list.clear();
        assert_eq!(engine.query_status(&sample, None).unwrap(), PolicyStatus::NotConfigured);
    }

    #[test]
    fn invalid_sid_is_rejected_before_any_read() {
        let (provider, engine) = engine();
        let sample = policy(Vec::new());
        assert!(matches!(
            engine.query_status(&sample, Some("S-1-1-0")),
            Err(GroupPolicyError::InvalidSid { .. })
        ));
        assert_eq!(provider.save_attempts(), 0);
    }

    #[test]
    fn text_element_honours_expandable() {
        let (provider, engine) = engine();
        let sample = policy(vec![PolicyElement::Text(TextElement {
            id: "Path".into(),
            key: KEY.into(),
            value_name: "Path".into(),
            required: false,
            max_length: 1023,
            expandable: true,
            soft: false,
            default_value: None,
            registry_value: None,
        })]);
        let id = Uuid::new_v4();
        let path = Value::String(r"%SystemRoot%\Temp".into());
        engine
            .set_element(&sample, "Path", ElementInput::Single(path.clone()), id, None, None)
            .unwrap();

        assert_eq!(
            stored(&provider, "Path"),
            Some(RegistryData::ExpandString(r"%SystemRoot%\Temp".into()))
        );
        assert_eq!(engine.get_element(&sample, "Path", None).unwrap(), Some(path));
        assert_eq!(engine.get_element(&sample, "Missing", None).unwrap(), None);
        assert!(matches!(
            engine.get_list_element(&sample, "Path", None),
            Err(GroupPolicyError::UseScalarAccessor(_))
        ));
        assert!(matches!(
            engine.set_element(&sample, "Path", ElementInput::Multiple(vec![]), id, None, None),
            Err(GroupPolicyError::UseScalarAccessor(_))
        ));
    }

    #[test]
    fn enumeration_item_writes_its_linked_values() {
        let (provider, engine) = engine();
        let mode = |n: u32| vec![PolicyRegistryValue::new(KEY, "Mode", Value::Decimal(n))];
        let sample = policy(vec![PolicyElement::Enumeration(EnumerationElement {
            id: "Level".into(),
            key: KEY.into(),
            value_name: "Level".into(),
            required: false,
            items: vec![
                EnumerationItem {
                    id: "Low".into(),
                    display_name_key: None,
                    display_name: "Low".into(),
                    value: Some(Value::Decimal(0)),
                    item_values: mode(10),
                },
                EnumerationItem {
                    id: "High".into(),
                    display_name_key: None,
                    display_name: "High".into(),
                    value: Some(Value::Decimal(2)),
                    item_values: mode(20),
                },
            ],
            default_index: None,
            registry_value: None,
        })]);
        let id = Uuid::new_v4();

        let modified = engine.select_enum_item(&sample, "Level", "High", id, None, None).unwrap();
        assert_eq!(modified.len(), 2);
        assert_eq!(stored(&provider, "Level"), Some(RegistryData::DWord(2)));
        assert_eq!(stored(&provider, "Mode"), Some(RegistryData::DWord(20)));

        let reset = engine.reset_element(&sample, "Level", id, None, None).unwrap();
        let results: Vec<PolicyModifyResult> = reset.iter().map(|(_, r)| *r).collect();
        assert_eq!(
            results,
            vec![
                PolicyModifyResult::Deleted,
                PolicyModifyResult::Deleted,
                PolicyModifyResult::NotChanged
            ]
        );
        assert_eq!(stored(&provider, "Mode"), None);
    }

    #[test]
    fn boolean_element_writes_the_matching_list() {
        let (provider, engine) = engine();
        let sample = policy(vec![PolicyElement::Boolean(BooleanElement {
            id: "Audit".into(),
            key: KEY.into(),
            value_name: "Audit".into(),
            true_value: Some(Value::Decimal(1)),
            false_value: Some(Value::Decimal(0)),
            true_list: vec![PolicyRegistryValue::new(KEY, "AuditLevel", Value::Decimal(3))],
            false_list: vec![PolicyRegistryValue::new(KEY, "AuditLevel", Value::Delete)],
            default_checked: None,
            registry_value: None,
        })]);
        let id = Uuid::new_v4();
        let set = |v: u32| {
            let input = ElementInput::Single(Value::Decimal(v));
            engine.set_element(&sample, "Audit", input, id, None, None).unwrap()
        };

        set(1);
        assert_eq!(stored(&provider, "AuditLevel"), Some(RegistryData::DWord(3)));

        set(0);
        assert_eq!(stored(&provider, "Audit"), Some(RegistryData::DWord(0)));
        assert_eq!(stored(&provider, "AuditLevel"), None);
    }

    #[test]
    fn unknown_element_is_an_error_for_writes() {
        let (_provider, engine) = engine();
        let sample = policy(Vec::new());
        assert!(matches!(
            engine.reset_element(&sample, "Nope", Uuid::new_v4(), None, None),
            Err(GroupPolicyError::ElementNotFound(_))
        ));
        assert_eq!(engine.get_list_element(&sample, "Nope", None).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn list_is_not_rewritten_when_its_entries_cannot_be_enumerated() {
        let (provider, engine) = engine();
        let sample = list_policy();
        let id = Uuid::new_v4();
        let abc = ElementInput::Multiple(strings(&["a", "b", "c"]));
        engine.set_element(&sample, "Hosts", abc, id, None, None).unwrap();
        let saves = provider.committed_saves();

        provider.fail_enumeration(Some(5));
        let x = ElementInput::Multiple(strings(&["x"]));
        match engine.set_element(&sample, "Hosts", x, id, None, None) {
            Err(GroupPolicyError::Native { code, .. }) => assert_eq!(code, 5),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            engine.get_list_element(&sample, "Hosts", None),
            Err(GroupPolicyError::Native { code: 5, .. })
        ));
        assert!(engine.reset_element(&sample, "Hosts", id, None, None).is_err());

        assert_eq!(provider.committed_saves(), saves);
        let location = GroupPolicyLocation::ThisComputer;
        assert_eq!(
            provider.persisted_value_names(&location, PolicySection::Machine, KEY),
            vec!["Host1", "Host2", "Host3"]
        );
        assert_eq!(stored(&provider, "Host1"), Some(RegistryData::String("a".into())));

        provider.fail_enumeration(None);
        assert_eq!(
            engine.get_list_element(&sample, "Hosts", None).unwrap(),
            strings(&["a", "b", "c"])
        );
    }

    #[test]
    fn list_index_requires_a_numeric_suffix() {
        assert_eq!(list_index("Server", "server12"), Some(12));
        assert_eq!(list_index("Server", "Server"), None);
        assert_eq!(list_index("Server", "ServerName"), None);
        assert_eq!(list_index("Server", "Serv"), None);
    }
}
