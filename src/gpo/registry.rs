//! Registry shapes exchanged with a GPO
//! Core Principle: Every query returns a fresh, immutable result

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Native registry value type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RegistryValueType {
    None = 0,
    String = 1,
    ExpandString = 2,
    Binary = 3,
    DWord = 4,
    DWordBigEndian = 5,
    Link = 6,
    MultiString = 7,
    ResourceList = 8,
    QWord = 0xb,
}

impl RegistryValueType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RegistryValueType::String,
            2 => RegistryValueType::ExpandString,
            3 => RegistryValueType::Binary,
            4 => RegistryValueType::DWord,
            5 => RegistryValueType::DWordBigEndian,
            6 => RegistryValueType::Link,
            7 => RegistryValueType::MultiString,
            8 => RegistryValueType::ResourceList,
            0xb => RegistryValueType::QWord,
            _ => RegistryValueType::None,
        }
    }
}

/// Decoded registry payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryData {
    String(String),
    ExpandString(String),
    DWord(u32),
    DWordBigEndian(u32),
    QWord(u64),
    MultiString(Vec<String>),
    Binary(Vec<u8>),
    Other(RegistryValueType, Vec<u8>),
}

impl RegistryData {
    pub fn value_type(&self) -> RegistryValueType {
        match self {
            RegistryData::String(_) => RegistryValueType::String,
            RegistryData::ExpandString(_) => RegistryValueType::ExpandString,
            RegistryData::DWord(_) => RegistryValueType::DWord,
            RegistryData::DWordBigEndian(_) => RegistryValueType::DWordBigEndian,
            RegistryData::QWord(_) => RegistryValueType::QWord,
            RegistryData::MultiString(_) => RegistryValueType::MultiString,
            RegistryData::Binary(_) => RegistryValueType::Binary,
            RegistryData::Other(kind, _) => *kind,
        }
    }

    /// Decode raw bytes returned by the registry.
    pub fn decode(kind: RegistryValueType, data: &[u8]) -> RegistryData {
        match kind {
            RegistryValueType::DWord if data.len() >= 4 => {
                RegistryData::DWord(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
            }
            RegistryValueType::DWordBigEndian if data.len() >= 4 => {
                let bytes = [data[0], data[1], data[2], data[3]];
                RegistryData::DWordBigEndian(u32::from_be_bytes(bytes))
            }
            RegistryValueType::QWord if data.len() >= 8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data[..8]);
                RegistryData::QWord(u64::from_le_bytes(bytes))
            }
            RegistryValueType::String => RegistryData::String(decode_utf16(data)),
            RegistryValueType::ExpandString => RegistryData::ExpandString(decode_utf16(data)),
            RegistryValueType::MultiString => {
                let packed = decode_utf16_units(data);
                let strings = packed
                    .split(|unit| *unit == 0)
                    .take_while(|part| !part.is_empty())
                    .map(String::from_utf16_lossy)
                    .collect();
                RegistryData::MultiString(strings)
            }
            RegistryValueType::Binary => RegistryData::Binary(data.to_vec()),
            other => RegistryData::Other(other, data.to_vec()),
        }
    }

    /// Raw bytes to hand to the registry.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RegistryData::String(s) | RegistryData::ExpandString(s) => encode_utf16(s),
            RegistryData::DWord(v) => v.to_le_bytes().to_vec(),
            RegistryData::DWordBigEndian(v) => v.to_be_bytes().to_vec(),
            RegistryData::QWord(v) => v.to_le_bytes().to_vec(),
            RegistryData::MultiString(items) => {
                let mut units: Vec<u16> = Vec::new();
                for item in items {
                    units.extend(item.encode_utf16());
                    units.push(0);
                }
                units.push(0);
                units.iter().flat_map(|u| u.to_le_bytes()).collect()
            }
            RegistryData::Binary(bytes) | RegistryData::Other(_, bytes) => bytes.clone(),
        }
    }

    pub fn to_value(&self) -> Option<Value> {
        Value::from_registry_data(self)
    }
}

fn decode_utf16_units(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn decode_utf16(data: &[u8]) -> String {
    let units = decode_utf16_units(data);
    let end = units.iter().position(|u| *u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

fn encode_utf16(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(Some(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}

/// Result of reading one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupPolicyQueryResult {
    pub key_path: String,
    pub value_name: String,
    pub key_exists: bool,
    pub value_exists: bool,
    pub value: Option<RegistryData>,
    pub value_type: RegistryValueType,
}

impl GroupPolicyQueryResult {
    pub fn key_missing(key_path: &str, value_name: &str) -> Self {
        GroupPolicyQueryResult {
            key_path: key_path.to_string(),
            value_name: value_name.to_string(),
            key_exists: false,
            value_exists: false,
            value: None,
            value_type: RegistryValueType::None,
        }
    }

    pub fn value_missing(key_path: &str, value_name: &str) -> Self {
        GroupPolicyQueryResult {
            key_exists: true,
            ..Self::key_missing(key_path, value_name)
        }
    }

    pub fn found(key_path: &str, value_name: &str, data: RegistryData) -> Self {
        GroupPolicyQueryResult {
            key_path: key_path.to_string(),
            value_name: value_name.to_string(),
            key_exists: true,
            value_exists: true,
            value_type: data.value_type(),
            value: Some(data),
        }
    }

    /// Policy view of the stored payload.
    pub fn policy_value(&self) -> Option<Value> {
        self.value.as_ref().and_then(RegistryData::to_value)
    }
}

/// Result of reading every value under a key, optionally filtered by name prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultipleGroupPolicyQueryResult {
    pub value_prefix: Option<String>,
    pub results: Vec<GroupPolicyQueryResult>,
    pub succeed: bool,
    pub last_error_code: i32,
}

impl MultipleGroupPolicyQueryResult {
    pub fn new(value_prefix: Option<&str>) -> Self {
        MultipleGroupPolicyQueryResult {
            value_prefix: value_prefix.map(str::to_string),
            results: Vec::new(),
            succeed: true,
            last_error_code: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupPolicyUpdateResult {
    UpdateSucceed,
    CreateOrOpenFailed,
    SaveFailed,
    SetFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupPolicyDeleteResult {
    DeleteSucceed,
    NoItemFound,
    CreateOrOpenFailed,
    SaveFailed,
}

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMultipleGroupPolicyRequest {
    pub sub_key: String,
    pub value_name: String,
    pub value: Value,
    #[serde(default)]
    pub require_expand_string: bool,
}

impl SetMultipleGroupPolicyRequest {
    pub fn new(
        sub_key: impl Into<String>,
        value_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        SetMultipleGroupPolicyRequest {
            sub_key: sub_key.into(),
            value_name: value_name.into(),
            value: value.into(),
            require_expand_string: false,
        }
    }

    pub fn expandable(mut self) -> Self {
        self.require_expand_string = true;
        self
    }
}

/// One delete in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMultipleGroupPolicyRequest {
    pub sub_key: String,
    pub value_name: String,
}

impl DeleteMultipleGroupPolicyRequest {
    pub fn new(sub_key: impl Into<String>, value_name: impl Into<String>) -> Self {
        DeleteMultipleGroupPolicyRequest {
            sub_key: sub_key.into(),
            value_name: value_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dword_and_qword_decode_little_endian() {
        let dword = RegistryData::DWord(0x0102_0304);
        assert_eq!(RegistryData::decode(RegistryValueType::DWord, &dword.encode()), dword);

        let qword = RegistryData::QWord(0x0102_0304_0506_0708);
        assert_eq!(qword.encode()[0], 0x08);
        assert_eq!(RegistryData::decode(RegistryValueType::QWord, &qword.encode()), qword);

        assert_eq!(
            RegistryData::decode(RegistryValueType::DWordBigEndian, &[0, 0, 0, 7]),
            RegistryData::DWordBigEndian(7)
        );
    }

    #[test]
    fn strings_drop_the_terminator() {
        let bytes = RegistryData::String("abc".into()).encode();
        assert_eq!(bytes.len(), 8);
        assert_eq!(
            RegistryData::decode(RegistryValueType::String, &bytes),
            RegistryData::String("abc".into())
        );
    }

    #[test]
    fn multi_string_splits_on_nul() {
        let data = RegistryData::MultiString(vec!["a".into(), "bc".into()]);
        assert_eq!(RegistryData::decode(RegistryValueType::MultiString, &data.encode()), data);
    }

    #[test]
    fn value_type_codes_match_native_values() {
        assert_eq!(RegistryValueType::QWord as u32, 0xb);
        assert_eq!(RegistryValueType::from_raw(4), RegistryValueType::DWord);
        assert_eq!(RegistryValueType::from_raw(42), RegistryValueType::None);
    }
}
