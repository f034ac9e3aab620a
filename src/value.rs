//! Value Model
//! Core Principle: A registry-storable value is exactly one of four shapes

use std::any::{type_name, Any};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GroupPolicyError, Result};
use crate::gpo::RegistryData;

/// Registry-storable value as declared by a policy template.
///
/// `Delete` is a sentinel meaning "remove this entry"; it never reaches the registry as a payload.
/// Equality is tag-aware: payloads are compared only within the same tag, and two `Delete` values
/// are always equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Decimal(u32),
    LongDecimal(u64),
    String(String),
    Delete,
}

/// Tag of a [`Value`], fixed when a registry value is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Decimal,
    LongDecimal,
    String,
    Delete,
}

/// Native form of a [`Value`], as handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    Int(i32),
    Long(i64),
    String(String),
    Delete,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Decimal(_) => ValueKind::Decimal,
            Value::LongDecimal(_) => ValueKind::LongDecimal,
            Value::String(_) => ValueKind::String,
            Value::Delete => ValueKind::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Value::Delete)
    }

    /// Registry payload for this value. Strings become `ExpandString` when `expandable` is set.
    pub fn to_registry_data(&self, expandable: bool) -> Result<RegistryData> {
        match self {
            Value::Decimal(v) => Ok(RegistryData::DWord(*v)),
            Value::LongDecimal(v) => Ok(RegistryData::QWord(*v)),
            Value::String(s) if expandable => Ok(RegistryData::ExpandString(s.clone())),
            Value::String(s) => Ok(RegistryData::String(s.clone())),
            Value::Delete => Err(GroupPolicyError::DeleteValueNotStorable),
        }
    }

    /// Value form of a registry payload. Types with no policy mapping yield `None`.
    pub fn from_registry_data(data: &RegistryData) -> Option<Value> {
        match data {
            RegistryData::DWord(v) | RegistryData::DWordBigEndian(v) => Some(Value::Decimal(*v)),
            RegistryData::QWord(v) => Some(Value::LongDecimal(*v)),
            RegistryData::String(s) | RegistryData::ExpandString(s) => {
                Some(Value::String(s.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Decimal(v) => write!(f, "{}", v),
            Value::LongDecimal(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Delete => f.write_str("(Delete)"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Decimal(v as u32)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Decimal(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::LongDecimal(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::LongDecimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Convert a runtime value into a [`Value`].
///
/// Accepts `i32`, `u32`, `i64`, `u64`, `String` and `&str`; signed integers are reinterpreted
/// bit-for-bit. Anything else fails with [`GroupPolicyError::UnsupportedType`].
pub fn to_value<T: Any>(value: &T) -> Result<Value> {
    let any = value as &dyn Any;

    if let Some(v) = any.downcast_ref::<i32>() {
        return Ok(Value::from(*v));
    }
    if let Some(v) = any.downcast_ref::<u32>() {
        return Ok(Value::from(*v));
    }
    if let Some(v) = any.downcast_ref::<i64>() {
        return Ok(Value::from(*v));
    }
    if let Some(v) = any.downcast_ref::<u64>() {
        return Ok(Value::from(*v));
    }
    if let Some(v) = any.downcast_ref::<String>() {
        return Ok(Value::String(v.clone()));
    }
    if let Some(v) = any.downcast_ref::<&str>() {
        return Ok(Value::String((*v).to_string()));
    }

    Err(GroupPolicyError::UnsupportedType {
        type_name: type_name::<T>(),
    })
}

/// Inverse of [`to_value`]. `Delete` comes back as [`NativeValue::Delete`].
pub fn from_value(value: &Value) -> NativeValue {
    match value {
        Value::Decimal(v) => NativeValue::Int(*v as i32),
        Value::LongDecimal(v) => NativeValue::Long(*v as i64),
        Value::String(s) => NativeValue::String(s.clone()),
        Value::Delete => NativeValue::Delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::Decimal(0),
            Value::Decimal(1),
            Value::LongDecimal(1),
            Value::LongDecimal(u64::MAX),
            Value::String(String::new()),
            Value::String("1".into()),
            Value::Delete,
        ]
    }

    #[test]
    fn equality_is_symmetric_and_tag_aware() {
        for a in samples() {
            for b in samples() {
                assert_eq!(a == b, b == a, "{:?} vs {:?}", a, b);
            }
        }

        assert_eq!(Value::Delete, Value::Delete);
        assert_eq!(Value::Decimal(7), Value::Decimal(7));
        assert_ne!(Value::Decimal(7), Value::Decimal(8));
        assert_ne!(Value::Decimal(1), Value::LongDecimal(1));
        assert_ne!(Value::Decimal(1), Value::String("1".into()));
        assert_ne!(Value::String(String::new()), Value::Delete);
    }

    #[test]
    fn signed_integers_wrap_into_unsigned_payloads() {
        assert_eq!(to_value(&-1i32).unwrap(), Value::Decimal(u32::MAX));
        assert_eq!(to_value(&-2i64).unwrap(), Value::LongDecimal(u64::MAX - 1));
        assert_eq!(to_value(&42u32).unwrap(), Value::Decimal(42));
        assert_eq!(to_value(&42u64).unwrap(), Value::LongDecimal(42));
        assert_eq!(to_value(&"text").unwrap(), Value::String("text".into()));
        assert_eq!(to_value(&String::from("text")).unwrap(), Value::String("text".into()));
    }

    #[test]
    fn unsupported_runtime_type_reports_its_name() {
        let err = to_value(&1.5f64).unwrap_err();
        match err {
            GroupPolicyError::UnsupportedType { type_name } => assert_eq!(type_name, "f64"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(to_value(&true), Err(GroupPolicyError::UnsupportedType { .. })));
    }

    #[test]
    fn from_value_restores_signed_forms_and_exposes_delete() {
        assert_eq!(from_value(&Value::Decimal(u32::MAX)), NativeValue::Int(-1));
        assert_eq!(from_value(&Value::LongDecimal(5)), NativeValue::Long(5));
        assert_eq!(from_value(&Value::String("x".into())), NativeValue::String("x".into()));
        assert_eq!(from_value(&Value::Delete), NativeValue::Delete);
    }

    #[test]
    fn delete_has_no_registry_payload() {
        assert!(matches!(
            Value::Delete.to_registry_data(false),
            Err(GroupPolicyError::DeleteValueNotStorable)
        ));
        assert_eq!(
            Value::String("%TEMP%".into()).to_registry_data(true).unwrap(),
            RegistryData::ExpandString("%TEMP%".into())
        );
        assert_eq!(Value::from_registry_data(&RegistryData::Binary(vec![1, 2])), None);
        assert_eq!(
            Value::from_registry_data(&RegistryData::QWord(9)),
            Some(Value::LongDecimal(9))
        );
    }
}
