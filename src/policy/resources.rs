//! Resource references
//! Core Principle: `$(type.key)` and `prefix:key` are parsed once and resolved late per culture

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{GroupPolicyError, Result};

use super::definition::PolicyDefinitionFile;
use super::presentation::PolicyPresentation;

/// Culture every lookup falls back to.
pub const FALLBACK_CULTURE: &str = "en-US";

const EXPRESSION_PATTERN: &str = r"\$\((?P<type>[^.]+)\.(?P<key>[^\)]+)\)";

fn expression() -> Result<&'static Regex> {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    if let Some(regex) = EXPRESSION.get() {
        return Ok(regex);
    }
    let regex = RegexBuilder::new(EXPRESSION_PATTERN)
        .case_insensitive(true)
        .build()
        .map_err(|e| GroupPolicyError::InvalidExpression(e.to_string()))?;
    Ok(EXPRESSION.get_or_init(|| regex))
}

/// Parsed `$(type.key)` expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKeyReference {
    resource_type: String,
    resource_key: String,
}

impl ResourceKeyReference {
    pub fn parse(expression_text: &str) -> Result<Self> {
        let captures = expression()?
            .captures(expression_text)
            .ok_or_else(|| GroupPolicyError::InvalidExpression(expression_text.to_string()))?;
        Ok(ResourceKeyReference {
            resource_type: captures["type"].to_string(),
            resource_key: captures["key"].to_string(),
        })
    }

    /// Parse when present; blank or malformed text yields `None`.
    pub fn parse_optional(expression_text: Option<&str>) -> Option<Self> {
        expression_text
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| Self::parse(s).ok())
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    pub fn is_string_reference(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case("string")
    }

    pub fn is_presentation_reference(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case("presentation")
    }

    /// Look the key up in the string table of `culture`, or of the fallback culture when `None`.
    pub fn try_resolve_string<'a>(
        &self,
        file: &'a PolicyDefinitionFile,
        culture: Option<&str>,
    ) -> Option<&'a str> {
        if !self.is_string_reference() {
            return None;
        }
        let resource = match culture {
            Some(culture) => file.resource_by_culture(culture)?,
            None => file.fallback_resource()?,
        };
        resource.string(&self.resource_key)
    }

    pub fn try_resolve_string_from_fallback<'a>(
        &self,
        file: &'a PolicyDefinitionFile,
    ) -> Option<&'a str> {
        self.try_resolve_string(file, None)
    }
}

impl fmt::Display for ResourceKeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$({}.{})", self.resource_type, self.resource_key)
    }
}

/// `prefix:key` reference to an entity in this or another definition file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityReference {
    prefix: String,
    key: String,
}

impl EntityReference {
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((prefix, key)) => EntityReference {
                prefix: prefix.trim().to_string(),
                key: key.trim().to_string(),
            },
            None => EntityReference {
                prefix: String::new(),
                key: text.trim().to_string(),
            },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The reference points into the file that declares it.
    pub fn is_local(&self) -> bool {
        self.prefix.is_empty()
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.key)
        } else {
            write!(f, "{}:{}", self.prefix, self.key)
        }
    }
}

/// String table and presentations for one culture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResourceInfo {
    pub culture: String,
    #[serde(default)]
    pub strings: HashMap<String, String>,
    #[serde(default)]
    pub presentations: Vec<PolicyPresentation>,
}

impl PolicyResourceInfo {
    pub fn is_fallback(&self) -> bool {
        self.culture.eq_ignore_ascii_case(FALLBACK_CULTURE)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn presentation(&self, id: &str) -> Option<&PolicyPresentation> {
        self.presentations.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expressions_without_case_sensitivity() {
        let reference = ResourceKeyReference::parse("$(String.WindowsUpdate_Title)").unwrap();
        assert_eq!(reference.resource_type(), "String");
        assert_eq!(reference.resource_key(), "WindowsUpdate_Title");
        assert!(reference.is_string_reference());
        assert!(!reference.is_presentation_reference());
        assert_eq!(reference.to_string(), "$(String.WindowsUpdate_Title)");

        let presentation = ResourceKeyReference::parse("$(presentation.AutoUpdateCfg)").unwrap();
        assert!(presentation.is_presentation_reference());
        assert!(!presentation.is_string_reference());
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(matches!(
            ResourceKeyReference::parse("string.NoParens"),
            Err(GroupPolicyError::InvalidExpression(_))
        ));
        assert_eq!(ResourceKeyReference::parse_optional(Some("   ")), None);
        assert_eq!(ResourceKeyReference::parse_optional(None), None);
    }

    #[test]
    fn entity_reference_splits_on_first_colon() {
        let external = EntityReference::parse("windows:WindowsComponents");
        assert_eq!(external.prefix(), "windows");
        assert_eq!(external.key(), "WindowsComponents");
        assert!(!external.is_local());
        assert_eq!(external.to_string(), "windows:WindowsComponents");

        let local = EntityReference::parse("Network");
        assert!(local.is_local());
        assert_eq!(local.to_string(), "Network");
    }

    #[test]
    fn fallback_culture_ignores_case() {
        let resource = PolicyResourceInfo {
            culture: "EN-us".into(),
            ..Default::default()
        };
        assert!(resource.is_fallback());
        assert!(!PolicyResourceInfo {
            culture: "ko-KR".into(),
            ..Default::default()
        }
        .is_fallback());
    }
}
