//! Policy Registry Value
//! Core Principle: (key, value name, value) is fixed at construction, and so is its kind

use std::fmt;

use crate::error::{GroupPolicyError, Result};
use crate::value::{Value, ValueKind};

/// One registry value a policy reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRegistryValue {
    registry_key_path: String,
    value_name: String,
    value: Value,
    kind: ValueKind,
}

impl PolicyRegistryValue {
    pub fn new(
        registry_key_path: impl Into<String>,
        value_name: impl Into<String>,
        value: Value,
    ) -> Self {
        let kind = value.kind();
        PolicyRegistryValue {
            registry_key_path: registry_key_path.into(),
            value_name: value_name.into(),
            value,
            kind,
        }
    }

    pub fn registry_key_path(&self) -> &str {
        &self.registry_key_path
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_decimal_value(&self) -> bool {
        self.kind == ValueKind::Decimal
    }

    pub fn is_long_decimal_value(&self) -> bool {
        self.kind == ValueKind::LongDecimal
    }

    pub fn is_string_value(&self) -> bool {
        self.kind == ValueKind::String
    }

    pub fn is_delete_value(&self) -> bool {
        self.kind == ValueKind::Delete
    }

    pub fn decimal_value(&self) -> Option<u32> {
        match self.value {
            Value::Decimal(v) => Some(v),
            _ => None,
        }
    }

    pub fn long_decimal_value(&self) -> Option<u64> {
        match self.value {
            Value::LongDecimal(v) => Some(v),
            _ => None,
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn ensure_is_not_delete_value(&self) -> Result<()> {
        if self.is_delete_value() {
            return Err(GroupPolicyError::DeleteValueNotStorable);
        }
        Ok(())
    }

    /// Same slot, different value.
    pub fn with_value(&self, value: Value) -> Self {
        PolicyRegistryValue::new(self.registry_key_path.clone(), self.value_name.clone(), value)
    }

    /// Boolean element default: the true or false value picked by the check box.
    pub fn for_boolean(
        key: &str,
        value_name: &str,
        default_checked: Option<bool>,
        true_value: Option<&Value>,
        false_value: Option<&Value>,
    ) -> Option<Self> {
        let chosen = if default_checked? { true_value? } else { false_value? };
        Some(PolicyRegistryValue::new(key, value_name, chosen.clone()))
    }

    pub fn for_decimal(
        key: &str,
        value_name: &str,
        default: Option<u32>,
        store_as_text: bool,
    ) -> Option<Self> {
        let default = default?;
        let value = if store_as_text {
            Value::String(default.to_string())
        } else {
            Value::Decimal(default)
        };
        Some(PolicyRegistryValue::new(key, value_name, value))
    }

    pub fn for_long_decimal(
        key: &str,
        value_name: &str,
        default: Option<u64>,
        store_as_text: bool,
    ) -> Option<Self> {
        let default = default?;
        let value = if store_as_text {
            Value::String(default.to_string())
        } else {
            Value::LongDecimal(default)
        };
        Some(PolicyRegistryValue::new(key, value_name, value))
    }

    /// Value of the item at `default_index`; nothing when the index is out of range.
    pub fn for_enumeration(
        key: &str,
        value_name: &str,
        item_values: &[Option<Value>],
        default_index: Option<usize>,
    ) -> Option<Self> {
        let value = item_values.get(default_index?)?.clone()?;
        Some(PolicyRegistryValue::new(key, value_name, value))
    }

    pub fn for_multi_text(key: &str, value_name: &str) -> Self {
        PolicyRegistryValue::new(key, value_name, Value::String(String::new()))
    }

    pub fn for_text(key: &str, value_name: &str, default: Option<&str>) -> Option<Self> {
        Some(PolicyRegistryValue::new(key, value_name, Value::String(default?.to_string())))
    }
}

impl fmt::Display for PolicyRegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.value_name.is_empty() {
            "(Default)"
        } else {
            self.value_name.as_str()
        };
        write!(f, "{}, {}: {}", self.registry_key_path, name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = r"Software\Policies\Contoso";

    #[test]
    fn flags_follow_the_value_kind() {
        let decimal = PolicyRegistryValue::new(KEY, "A", Value::Decimal(1));
        assert!(decimal.is_decimal_value());
        assert!(!decimal.is_long_decimal_value());
        assert!(!decimal.is_string_value() && !decimal.is_delete_value());
        assert_eq!(decimal.decimal_value(), Some(1));
        assert_eq!(decimal.string_value(), None);

        let delete = decimal.with_value(Value::Delete);
        assert!(delete.is_delete_value());
        assert!(matches!(
            delete.ensure_is_not_delete_value(),
            Err(GroupPolicyError::DeleteValueNotStorable)
        ));
        assert!(decimal.ensure_is_not_delete_value().is_ok());
    }

    #[test]
    fn display_names_default_value_and_delete() {
        let unnamed = PolicyRegistryValue::new(KEY, "", Value::Delete);
        assert_eq!(unnamed.to_string(), r"Software\Policies\Contoso, (Default): (Delete)");

        let named = PolicyRegistryValue::new(KEY, "Mode", Value::Decimal(2));
        assert_eq!(named.to_string(), r"Software\Policies\Contoso, Mode: 2");
    }

    #[test]
    fn boolean_factory_picks_by_check_box() {
        let on = Value::Decimal(1);
        let off = Value::Decimal(0);
        assert_eq!(
            PolicyRegistryValue::for_boolean(KEY, "B", Some(true), Some(&on), Some(&off))
                .unwrap()
                .value(),
            &on
        );
        assert_eq!(
            PolicyRegistryValue::for_boolean(KEY, "B", Some(false), Some(&on), Some(&off))
                .unwrap()
                .value(),
            &off
        );
        assert_eq!(PolicyRegistryValue::for_boolean(KEY, "B", None, Some(&on), Some(&off)), None);
        assert_eq!(PolicyRegistryValue::for_boolean(KEY, "B", Some(true), None, Some(&off)), None);
    }

    #[test]
    fn numeric_factories_honour_store_as_text() {
        assert_eq!(
            PolicyRegistryValue::for_decimal(KEY, "D", Some(8080), true).unwrap().value(),
            &Value::String("8080".into())
        );
        assert_eq!(
            PolicyRegistryValue::for_long_decimal(KEY, "L", Some(5), false).unwrap().value(),
            &Value::LongDecimal(5)
        );
        assert_eq!(PolicyRegistryValue::for_decimal(KEY, "D", None, false), None);
    }

    #[test]
    fn enumeration_factory_uses_the_default_index() {
        let items = vec![Some(Value::Decimal(0)), None, Some(Value::String("x".into()))];
        assert_eq!(
            PolicyRegistryValue::for_enumeration(KEY, "E", &items, Some(2)).unwrap().value(),
            &Value::String("x".into())
        );
        assert_eq!(PolicyRegistryValue::for_enumeration(KEY, "E", &items, Some(1)), None);
        assert_eq!(PolicyRegistryValue::for_enumeration(KEY, "E", &items, Some(9)), None);
        assert_eq!(PolicyRegistryValue::for_enumeration(KEY, "E", &items, None), None);
    }

    #[test]
    fn text_factories() {
        assert_eq!(
            PolicyRegistryValue::for_multi_text(KEY, "M").value(),
            &Value::String(String::new())
        );
        assert_eq!(PolicyRegistryValue::for_text(KEY, "T", None), None);
        assert_eq!(
            PolicyRegistryValue::for_text(KEY, "T", Some("a")).unwrap().string_value(),
            Some("a")
        );
    }
}
