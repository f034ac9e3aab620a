//! Policy Definition Catalog
//! Core Principle: Files load independently; cross-file text resolves once all of them are in

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::gpo::PolicySection;

use super::admx::AdmxContent;
use super::definition::{PolicyDefinition, PolicyDefinitionFile};
use super::elements::PolicyElement;
use super::loader::load_definition_file;
use super::resources::{EntityReference, PolicyResourceInfo, ResourceKeyReference};
use super::supported_on::SupportedOnDefinition;

/// Resolved text for one policy, computed before it is written back.
struct ResolvedText {
    display_name: String,
    explain_text: String,
    category_display_names: Vec<String>,
    supported_on: Option<SupportedOnDefinition>,
    item_names: Vec<Vec<String>>,
}

/// All loaded definition files.
#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    source: String,
    files: Vec<PolicyDefinitionFile>,
}

impl PolicyCatalog {
    /// Load and resolve every file. `source` names where they came from.
    pub fn load(source: impl Into<String>, contents: &[AdmxContent]) -> Result<Self> {
        let files = contents.iter().map(load_definition_file).collect::<Result<Vec<_>>>()?;
        let mut catalog = PolicyCatalog {
            source: source.into(),
            files,
        };
        catalog.resolve();
        info!(catalog = %catalog, "policy catalog loaded");
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = AdmxContent::from_json_file(path)?;
        Self::load(path.display().to_string(), &contents)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn files(&self) -> &[PolicyDefinitionFile] {
        &self.files
    }

    pub fn prefixes(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.target_namespace.prefix.as_str()).collect()
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.target_namespace.namespace.as_str()).collect()
    }

    pub fn file_by_prefix(&self, prefix: &str) -> Option<&PolicyDefinitionFile> {
        self.files
            .iter()
            .find(|f| f.target_namespace.prefix.eq_ignore_ascii_case(prefix))
    }

    pub fn file_by_namespace(&self, namespace: &str) -> Option<&PolicyDefinitionFile> {
        self.files.iter().find(|f| f.target_namespace.namespace == namespace)
    }

    pub fn resource_by_prefix(&self, prefix: &str, culture: &str) -> Option<&PolicyResourceInfo> {
        self.file_by_prefix(prefix)?.resource_by_culture(culture)
    }

    pub fn fallback_resource_by_prefix(&self, prefix: &str) -> Option<&PolicyResourceInfo> {
        self.file_by_prefix(prefix)?.fallback_resource()
    }

    pub fn fallback_resource_by_namespace(&self, namespace: &str) -> Option<&PolicyResourceInfo> {
        self.file_by_namespace(namespace)?.fallback_resource()
    }

    pub fn supported_on_by_prefix(
        &self,
        prefix: &str,
        name: &str,
    ) -> Option<&SupportedOnDefinition> {
        self.file_by_prefix(prefix)?.supported_on_definition(name)
    }

    pub fn supported_on_by_namespace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<&SupportedOnDefinition> {
        self.file_by_namespace(namespace)?.supported_on_definition(name)
    }

    /// Files named by `file`'s using-namespace declarations that are present in this catalog.
    pub fn referenced_files(&self, file: &PolicyDefinitionFile) -> Vec<&PolicyDefinitionFile> {
        file.using_namespaces
            .iter()
            .filter_map(|ns| self.file_by_namespace(&ns.namespace))
            .collect()
    }

    /// The file a prefix means when written inside `file`.
    fn file_for_prefix<'a>(
        &'a self,
        file: &'a PolicyDefinitionFile,
        prefix: &str,
    ) -> Option<&'a PolicyDefinitionFile> {
        if prefix.is_empty() || file.target_namespace.prefix.eq_ignore_ascii_case(prefix) {
            return Some(file);
        }
        file.using_namespaces
            .iter()
            .find(|ns| ns.prefix.eq_ignore_ascii_case(prefix))
            .and_then(|ns| self.file_by_namespace(&ns.namespace))
            .or_else(|| self.file_by_prefix(prefix))
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyDefinition> {
        self.files.iter().flat_map(|f| f.policies.iter())
    }

    pub fn find_policy(&self, name: &str, section: PolicySection) -> Option<&PolicyDefinition> {
        self.policies().find(|p| p.name == name && p.section == section)
    }

    pub fn find_policies(&self, name: &str) -> Vec<&PolicyDefinition> {
        self.policies().filter(|p| p.name == name).collect()
    }

    fn resolve(&mut self) {
        for file in &mut self.files {
            resolve_supported_on(file);
        }

        let mut resolved = Vec::new();
        for (file_index, file) in self.files.iter().enumerate() {
            for (policy_index, policy) in file.policies.iter().enumerate() {
                resolved.push((file_index, policy_index, self.resolve_policy(file, policy)));
            }
        }

        for (file_index, policy_index, text) in resolved {
            let policy = &mut self.files[file_index].policies[policy_index];
            policy.display_name = text.display_name;
            policy.explain_text = text.explain_text;
            policy.category_display_names = text.category_display_names;
            policy.supported_on = text.supported_on;

            let enumerations = policy.elements.iter_mut().filter_map(|e| match e {
                PolicyElement::Enumeration(e) => Some(e),
                _ => None,
            });
            for (element, names) in enumerations.zip(text.item_names) {
                for (item, name) in element.items.iter_mut().zip(names) {
                    item.display_name = name;
                }
            }
            policy.resolved = true;
        }
    }

    fn resolve_policy(
        &self,
        file: &PolicyDefinitionFile,
        policy: &PolicyDefinition,
    ) -> ResolvedText {
        let display_name = resolve_text(file, policy.display_name_key.as_ref())
            .unwrap_or_else(|| policy.name.clone());
        let explain_text = resolve_text(file, policy.explain_text_key.as_ref()).unwrap_or_default();

        let category_display_names = policy
            .category_keys
            .iter()
            .map(|key| self.category_display_name(file, key))
            .collect();

        let supported_on = policy.supported_on_key.as_ref().and_then(|key| {
            if key.is_local() {
                file.supported_on_definition(key.key()).cloned()
            } else {
                self.file_for_prefix(file, key.prefix())?
                    .supported_on_definition(key.key())
                    .cloned()
            }
        });

        let item_names = policy
            .elements
            .iter()
            .filter_map(|e| match e {
                PolicyElement::Enumeration(e) => Some(
                    e.items
                        .iter()
                        .map(|item| {
                            resolve_text(file, item.display_name_key.as_ref())
                                .unwrap_or_else(|| item.id.clone())
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect();

        ResolvedText {
            display_name,
            explain_text,
            category_display_names,
            supported_on,
            item_names,
        }
    }

    /// Category display name: the category's own display name, then the string table by key,
    /// then the raw reference.
    fn category_display_name(&self, file: &PolicyDefinitionFile, key: &EntityReference) -> String {
        if let Some(target) = self.file_for_prefix(file, key.prefix()) {
            let declared = target
                .category(key.key())
                .and_then(|c| resolve_text(target, c.display_name_key.as_ref()));
            if let Some(text) = declared {
                return text;
            }
            if let Some(text) = target.fallback_resource().and_then(|r| r.string(key.key())) {
                return text.to_string();
            }
        }
        if let Some(text) = file.fallback_resource().and_then(|r| r.string(key.key())) {
            return text.to_string();
        }
        key.to_string()
    }
}

fn resolve_text(file: &PolicyDefinitionFile, key: Option<&ResourceKeyReference>) -> Option<String> {
    key?.try_resolve_string_from_fallback(file).map(str::to_string)
}

fn resolve_supported_on(file: &mut PolicyDefinitionFile) {
    let mut products = std::mem::take(&mut file.supported_on_products);
    for product in &mut products {
        product.product_display_name =
            resolve_text(file, product.product_display_name_key.as_ref()).unwrap_or_default();
        product.major_version_display_name =
            resolve_text(file, product.major_version_display_name_key.as_ref()).unwrap_or_default();
        product.minor_version_display_name =
            resolve_text(file, product.minor_version_display_name_key.as_ref()).unwrap_or_default();
    }
    file.supported_on_products = products;

    let mut definitions = std::mem::take(&mut file.supported_on_definitions);
    for definition in &mut definitions {
        definition.display_name =
            resolve_text(file, definition.display_name_key.as_ref()).unwrap_or_default();
    }
    file.supported_on_definitions = definitions;
}

impl fmt::Display for PolicyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} policy definition(s) found.", self.source, self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS: &str = r#"{
        "filePath": "windows.admx",
        "targetNamespace": { "prefix": "windows", "namespace": "Microsoft.Policies.Windows" },
        "categories": [
            { "name": "WindowsComponents", "displayName": "$(string.WindowsComponents)" }
        ],
        "supportedOn": {
            "products": [{
                "name": "Windows", "displayName": "$(string.Windows)",
                "majorVersions": [
                    { "name": "Windows10", "displayName": "$(string.Windows10)", "versionIndex": 10,
                      "minorVersions": [
                          { "name": "V1903", "versionIndex": 1903 },
                          { "name": "V2004", "versionIndex": 2004 }
                      ] },
                    { "name": "Windows11", "displayName": "$(string.Windows11)",
                      "versionIndex": 11 }
                ]
            }],
            "definitions": [{
                "name": "SUPPORTED_Windows10", "displayName": "$(string.SUPPORTED_Windows10)",
                "or": [{ "kind": "range", "ref": "Windows", "minVersionIndex": 10 }]
            }]
        },
        "resources": [{ "culture": "en-US", "strings": {
            "WindowsComponents": "Windows Components", "Windows": "Microsoft Windows",
            "Windows10": "Windows 10", "Windows11": "Windows 11",
            "SUPPORTED_Windows10": "At least Windows 10"
        } }]
    }"#;

    const CONTOSO: &str = r#"{
        "filePath": "contoso.admx",
        "targetNamespace": { "prefix": "contoso", "namespace": "Contoso.Policies" },
        "usingNamespaces": [{ "prefix": "win", "namespace": "Microsoft.Policies.Windows" }],
        "categories": [{
            "name": "Contoso", "displayName": "$(string.ContosoCategory)",
            "parentCategory": "win:WindowsComponents"
        }],
        "policies": [{
            "name": "Telemetry", "class": "user", "key": "Software\\Policies\\Contoso",
            "valueName": "Telemetry", "parentCategory": "Contoso",
            "supportedOn": "win:SUPPORTED_Windows10",
            "displayName": "$(string.Telemetry)", "explainText": "$(string.Telemetry_Help)",
            "elements": [{ "kind": "enum", "id": "Level", "valueName": "Level", "items": [
                { "displayName": "$(string.Level_Basic)",
                  "value": { "type": "decimal", "value": 1 } },
                { "displayName": "$(string.Level_Missing)",
                  "value": { "type": "decimal", "value": 2 } }
            ] }]
        }],
        "resources": [
            { "culture": "ko-KR", "strings": { "Telemetry": "원격 분석" } },
            { "culture": "en-US", "strings": {
                "ContosoCategory": "Contoso", "Telemetry": "Telemetry",
                "Telemetry_Help": "Controls telemetry.", "Level_Basic": "Basic"
            } }
        ]
    }"#;

    fn catalog() -> PolicyCatalog {
        let mut contents = AdmxContent::from_json_str(WINDOWS).unwrap();
        contents.extend(AdmxContent::from_json_str(CONTOSO).unwrap());
        PolicyCatalog::load("PolicyDefinitions", &contents).unwrap()
    }

    #[test]
    fn policy_text_resolves_across_files() {
        let catalog = catalog();
        let policy = catalog.find_policy("Telemetry", PolicySection::User).unwrap();
        assert!(policy.resolved);
        assert_eq!(policy.display_name, "Telemetry");
        assert_eq!(policy.category_display_names, vec!["Windows Components", "Contoso"]);
        assert_eq!(
            policy.to_string(),
            "[Windows Components > Contoso] Telemetry - Controls telemetry."
        );

        let supported = policy.supported_on.as_ref().unwrap();
        assert_eq!(supported.display_name, "At least Windows 10");
        assert_eq!(supported.or_conditions[0].to_string(), "10 <= Windows <= ");
    }

    #[test]
    fn enumeration_items_fall_back_to_their_id() {
        let catalog = catalog();
        let policy = catalog.find_policy("Telemetry", PolicySection::User).unwrap();
        match policy.element("Level") {
            Some(PolicyElement::Enumeration(e)) => {
                assert_eq!(e.items[0].to_string(), "Basic (Level_Basic)");
                assert_eq!(e.items[1].display_name, "Level_Missing");
            }
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn products_are_flattened_per_version() {
        let catalog = catalog();
        let windows = catalog.file_by_prefix("WINDOWS").unwrap();
        let versions: Vec<(u32, u32)> =
            windows.supported_on_products.iter().map(|p| p.version()).collect();
        assert_eq!(versions, vec![(10, 1903), (10, 2004), (11, 0)]);
        assert_eq!(windows.supported_on_products[0].product_display_name, "Microsoft Windows");
        assert_eq!(windows.supported_on_products[2].major_version_display_name, "Windows 11");
        assert!(!windows.supported_on_products[2].has_minor_version());
        assert!(windows.supported_on_product("windows").is_some());
    }

    #[test]
    fn lookups_and_display() {
        let catalog = catalog();
        assert_eq!(catalog.prefixes(), vec!["windows", "contoso"]);
        assert!(catalog.file_by_namespace("Contoso.Policies").is_some());
        assert!(catalog.supported_on_by_prefix("windows", "SUPPORTED_Windows10").is_some());
        assert_eq!(
            catalog.fallback_resource_by_namespace("Contoso.Policies").unwrap().string("Telemetry"),
            Some("Telemetry")
        );
        assert_eq!(
            catalog.resource_by_prefix("contoso", "ko-kr").unwrap().string("Telemetry"),
            Some("원격 분석")
        );

        let contoso = catalog.file_by_prefix("contoso").unwrap();
        let referenced = catalog.referenced_files(contoso);
        assert_eq!(referenced.len(), 1);
        assert_eq!(referenced[0].file_path, "windows.admx");

        assert_eq!(catalog.to_string(), "PolicyDefinitions, 2 policy definition(s) found.");
        assert_eq!(
            contoso.to_string(),
            "contoso.admx, 0 machine policies and 1 user policies found. (Total 1 policies found.)"
        );
        assert_eq!(catalog.find_policies("Telemetry").len(), 1);
    }
}
