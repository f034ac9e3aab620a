//! Policy Definition Model
//! Core Principle: Built once by the loader, resolved once by the catalog, read-only afterwards

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gpo::PolicySection;

use super::elements::{PolicyElement, PolicyElementType};
use super::registry_value::PolicyRegistryValue;
use super::resources::{EntityReference, PolicyResourceInfo, ResourceKeyReference};
use super::supported_on::{SupportedOnDefinition, SupportedOnProduct};

/// Class as declared in the template. `Both` is split into two definitions at load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyClass {
    User,
    #[default]
    Machine,
    Both,
}

impl PolicyClass {
    /// Sections a definition of this class is materialised for.
    pub fn sections(self) -> &'static [PolicySection] {
        match self {
            PolicyClass::User => &[PolicySection::User],
            PolicyClass::Machine => &[PolicySection::Machine],
            PolicyClass::Both => &[PolicySection::Machine, PolicySection::User],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyNamespace {
    pub prefix: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub name: String,
    pub display_name_key: Option<ResourceKeyReference>,
    pub explain_text_key: Option<ResourceKeyReference>,
    pub parent: Option<EntityReference>,
}

/// One policy, materialised for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDefinition {
    pub name: String,
    pub class: PolicyClass,
    pub section: PolicySection,
    pub file_path: String,
    pub key: String,
    pub value_name: Option<String>,
    pub display_name_key: Option<ResourceKeyReference>,
    pub explain_text_key: Option<ResourceKeyReference>,
    pub presentation_id: String,
    pub category_keys: Vec<EntityReference>,
    pub supported_on_key: Option<EntityReference>,
    pub enabled_list: Vec<PolicyRegistryValue>,
    pub disabled_list: Vec<PolicyRegistryValue>,
    pub default_value_list: Vec<PolicyRegistryValue>,
    pub elements: Vec<PolicyElement>,

    pub display_name: String,
    pub explain_text: String,
    pub category_display_names: Vec<String>,
    pub supported_on: Option<SupportedOnDefinition>,
    pub resolved: bool,
}

impl PolicyDefinition {
    pub fn section(&self) -> PolicySection {
        self.section
    }

    pub fn class(&self) -> PolicyClass {
        self.class
    }

    pub fn element_names(&self) -> Vec<&str> {
        self.elements.iter().map(PolicyElement::id).collect()
    }

    pub fn element(&self, id: &str) -> Option<&PolicyElement> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn element_type(&self, id: &str) -> Option<PolicyElementType> {
        self.element(id).map(PolicyElement::element_type)
    }

    /// Item ids of an enumeration element; `None` for any other element.
    pub fn element_enum_ids(&self, id: &str) -> Option<Vec<&str>> {
        match self.element(id)? {
            PolicyElement::Enumeration(e) => Some(e.item_ids()),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.resolved {
            return write!(
                f,
                "[{}] {} - {}",
                self.category_display_names.join(" > "),
                self.display_name,
                self.explain_text
            );
        }
        let categories: Vec<String> = self.category_keys.iter().map(ToString::to_string).collect();
        let key_text = |k: &Option<ResourceKeyReference>| {
            k.as_ref().map(ToString::to_string).unwrap_or_default()
        };
        write!(
            f,
            "[{}] {} - {}",
            categories.join(" > "),
            key_text(&self.display_name_key),
            key_text(&self.explain_text_key)
        )
    }
}

/// Everything loaded from one ADMX file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDefinitionFile {
    pub file_path: String,
    pub target_namespace: PolicyNamespace,
    pub using_namespaces: Vec<PolicyNamespace>,
    pub superseded_files: Vec<String>,
    pub resources: Vec<PolicyResourceInfo>,
    pub supported_on_products: Vec<SupportedOnProduct>,
    pub supported_on_definitions: Vec<SupportedOnDefinition>,
    pub categories: Vec<CategoryInfo>,
    pub policies: Vec<PolicyDefinition>,
}

impl PolicyDefinitionFile {
    pub fn resource_by_culture(&self, culture: &str) -> Option<&PolicyResourceInfo> {
        self.resources.iter().find(|r| r.culture.eq_ignore_ascii_case(culture))
    }

    pub fn fallback_resource(&self) -> Option<&PolicyResourceInfo> {
        self.resources.iter().find(|r| r.is_fallback())
    }

    pub fn supported_on_definition(&self, name: &str) -> Option<&SupportedOnDefinition> {
        self.supported_on_definitions.iter().find(|d| d.name == name)
    }

    pub fn supported_on_product(&self, name: &str) -> Option<&SupportedOnProduct> {
        self.supported_on_products
            .iter()
            .find(|p| p.product_name.eq_ignore_ascii_case(name))
    }

    pub fn category(&self, name: &str) -> Option<&CategoryInfo> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Distinct policy names, in declaration order.
    pub fn policy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for policy in &self.policies {
            if !names.contains(&policy.name.as_str()) {
                names.push(&policy.name);
            }
        }
        names
    }

    pub fn machine_policies(&self) -> impl Iterator<Item = &PolicyDefinition> {
        self.policies.iter().filter(|p| p.section == PolicySection::Machine)
    }

    pub fn user_policies(&self) -> impl Iterator<Item = &PolicyDefinition> {
        self.policies.iter().filter(|p| p.section == PolicySection::User)
    }

    pub fn policy(&self, name: &str, section: PolicySection) -> Option<&PolicyDefinition> {
        self.policies.iter().find(|p| p.name == name && p.section == section)
    }
}

impl fmt::Display for PolicyDefinitionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.machine_policies().count();
        let user = self.user_policies().count();
        write!(
            f,
            "{}, {} machine policies and {} user policies found. (Total {} policies found.)",
            self.file_path,
            machine,
            user,
            machine + user
        )
    }
}
