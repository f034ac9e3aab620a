//! Supported-on metadata
//! Core Principle: Products flatten to one row per version; definitions combine criteria And/Or

use std::fmt;

use serde::{Deserialize, Serialize};

use super::resources::ResourceKeyReference;

/// One condition of a supported-on definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SupportedCriteria {
    #[serde(rename_all = "camelCase")]
    Range {
        #[serde(rename = "ref")]
        ref_id: String,
        #[serde(default)]
        min_version_index: Option<u32>,
        #[serde(default)]
        max_version_index: Option<u32>,
    },
    Reference {
        #[serde(rename = "ref")]
        ref_id: String,
    },
}

impl SupportedCriteria {
    pub fn ref_id(&self) -> &str {
        match self {
            SupportedCriteria::Range { ref_id, .. } | SupportedCriteria::Reference { ref_id } => {
                ref_id
            }
        }
    }
}

impl fmt::Display for SupportedCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportedCriteria::Range {
                ref_id,
                min_version_index,
                max_version_index,
            } => {
                let min = min_version_index.map(|v| v.to_string()).unwrap_or_default();
                let max = max_version_index.map(|v| v.to_string()).unwrap_or_default();
                write!(f, "{min} <= {ref_id} <= {max}")
            }
            SupportedCriteria::Reference { ref_id } => write!(f, "== {ref_id}"),
        }
    }
}

/// One product/major/minor combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedOnProduct {
    pub product_name: String,
    pub major_version_name: String,
    pub minor_version_name: Option<String>,
    pub major_version_index: u32,
    pub minor_version_index: Option<u32>,
    pub product_display_name_key: Option<ResourceKeyReference>,
    pub major_version_display_name_key: Option<ResourceKeyReference>,
    pub minor_version_display_name_key: Option<ResourceKeyReference>,
    pub product_display_name: String,
    pub major_version_display_name: String,
    pub minor_version_display_name: String,
}

impl SupportedOnProduct {
    /// `(major, minor)` with a missing minor read as zero.
    pub fn version(&self) -> (u32, u32) {
        (self.major_version_index, self.minor_version_index.unwrap_or(0))
    }

    pub fn has_minor_version(&self) -> bool {
        self.minor_version_index.is_some()
    }
}

/// Named supported-on definition referenced by policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedOnDefinition {
    pub name: String,
    pub display_name_key: Option<ResourceKeyReference>,
    pub display_name: String,
    pub and_conditions: Vec<SupportedCriteria>,
    pub or_conditions: Vec<SupportedCriteria>,
}

impl fmt::Display for SupportedOnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.display_name.is_empty() {
            return f.write_str(&self.display_name);
        }
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_display() {
        let range = SupportedCriteria::Range {
            ref_id: "windows:WIN10".into(),
            min_version_index: Some(1),
            max_version_index: Some(3),
        };
        assert_eq!(range.to_string(), "1 <= windows:WIN10 <= 3");

        let open = SupportedCriteria::Range {
            ref_id: "WIN".into(),
            min_version_index: None,
            max_version_index: Some(3),
        };
        assert_eq!(open.to_string(), " <= WIN <= 3");

        let reference = SupportedCriteria::Reference { ref_id: "WIN11".into() };
        assert_eq!(reference.to_string(), "== WIN11");
        assert_eq!(reference.ref_id(), "WIN11");
    }

    #[test]
    fn criteria_deserialize_with_ref_field() {
        let json = r#"[
            { "kind": "range", "ref": "WIN", "minVersionIndex": 2 },
            { "kind": "reference", "ref": "IE" }
        ]"#;
        let parsed: Vec<SupportedCriteria> = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed[0],
            SupportedCriteria::Range {
                ref_id: "WIN".into(),
                min_version_index: Some(2),
                max_version_index: None
            }
        );
        assert_eq!(parsed[1].ref_id(), "IE");
    }
}
