//! Catalog of the access policies the coordinator manages.

use nfc_id::ProcessGroupId;

use crate::config::PolicyAction;

/// Placeholder for the component id in component resource templates.
const ID_PLACEHOLDER: &str = "{id}";

/// One manageable policy: a named action on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicyDescriptor {
    /// Human name, as used in the configuration document.
    pub name: &'static str,

    /// Resource path without the leading slash; component templates contain `{id}`.
    pub resource: &'static str,

    pub action: PolicyAction,

    /// The coordinator identity must always hold this policy.
    pub required_by_coordinator: bool,
}

impl AccessPolicyDescriptor {
    const fn new(
        name: &'static str,
        resource: &'static str,
        action: PolicyAction,
        required_by_coordinator: bool,
    ) -> Self {
        Self {
            name,
            resource,
            action,
            required_by_coordinator,
        }
    }

    /// The remote resource path, with a leading slash and the component id filled in.
    pub fn resource_for(&self, component: Option<&ProcessGroupId>) -> String {
        match component {
            Some(id) => format!("/{}", self.resource.replace(ID_PLACEHOLDER, id.as_str())),
            None => format!("/{}", self.resource),
        }
    }

    /// Returns true if a configured policy named `name` refers to this descriptor.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

/// Immutable table of global and component policy descriptors.
#[derive(Debug, Clone)]
pub struct AccessPolicyCatalog {
    pub global: Vec<AccessPolicyDescriptor>,
    pub component: Vec<AccessPolicyDescriptor>,
}

impl AccessPolicyCatalog {
    /// The policies NiFi exposes in its policy management dialog.
    pub fn standard() -> Self {
        use PolicyAction::{Read, Write};

        let global = vec![
            AccessPolicyDescriptor::new("view the UI", "flow", Read, true),
            AccessPolicyDescriptor::new("access the controller", "controller", Read, true),
            AccessPolicyDescriptor::new("access the controller", "controller", Write, true),
            AccessPolicyDescriptor::new("access parameter contexts", "parameter-contexts", Read, true),
            AccessPolicyDescriptor::new("access parameter contexts", "parameter-contexts", Write, true),
            AccessPolicyDescriptor::new("query provenance", "provenance", Read, false),
            AccessPolicyDescriptor::new("access restricted components", "restricted-components", Read, false),
            AccessPolicyDescriptor::new("access restricted components", "restricted-components", Write, false),
            AccessPolicyDescriptor::new("access all policies", "policies", Read, true),
            AccessPolicyDescriptor::new("access all policies", "policies", Write, true),
            AccessPolicyDescriptor::new("access users/user groups", "tenants", Read, true),
            AccessPolicyDescriptor::new("access users/user groups", "tenants", Write, true),
            AccessPolicyDescriptor::new("retrieve site-to-site details", "site-to-site", Read, false),
            AccessPolicyDescriptor::new("view system diagnostics", "system", Read, false),
            AccessPolicyDescriptor::new("proxy user requests", "proxy", Read, false),
            AccessPolicyDescriptor::new("access counters", "counters", Read, false),
            AccessPolicyDescriptor::new("access counters", "counters", Write, false),
        ];

        let component = vec![
            AccessPolicyDescriptor::new("view the component", "process-groups/{id}", Read, true),
            AccessPolicyDescriptor::new("modify the component", "process-groups/{id}", Write, true),
            AccessPolicyDescriptor::new("operate the component", "operation/process-groups/{id}", Write, false),
            AccessPolicyDescriptor::new("view provenance", "provenance-data/process-groups/{id}", Read, false),
            AccessPolicyDescriptor::new("view the data", "data/process-groups/{id}", Read, false),
            AccessPolicyDescriptor::new("modify the data", "data/process-groups/{id}", Write, false),
            AccessPolicyDescriptor::new("view the policies", "policies/process-groups/{id}", Read, true),
            AccessPolicyDescriptor::new("modify the policies", "policies/process-groups/{id}", Write, true),
        ];

        Self { global, component }
    }
}

impl Default for AccessPolicyCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("view the component", "/process-groups/pg-1")]
    #[case("operate the component", "/operation/process-groups/pg-1")]
    #[case("modify the policies", "/policies/process-groups/pg-1")]
    fn test_component_resource_rendering(#[case] name: &str, #[case] expected: &str) {
        let catalog = AccessPolicyCatalog::standard();
        let descriptor = catalog
            .component
            .iter()
            .find(|d| d.matches_name(name))
            .unwrap();
        let id = ProcessGroupId::parse("pg-1").unwrap();

        assert_eq!(descriptor.resource_for(Some(&id)), expected);
    }

    #[test]
    fn test_global_resource_rendering() {
        let catalog = AccessPolicyCatalog::standard();
        assert_eq!(catalog.global[0].resource_for(None), "/flow");
    }

    #[test]
    fn test_catalog_keys_are_unique() {
        let catalog = AccessPolicyCatalog::standard();
        for table in [&catalog.global, &catalog.component] {
            let mut keys: Vec<_> = table.iter().map(|d| (d.name, d.action)).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), total);
        }
    }

    #[test]
    fn test_required_policies_keep_coordinator_in_control() {
        let catalog = AccessPolicyCatalog::standard();
        let required: Vec<_> = catalog
            .global
            .iter()
            .filter(|d| d.required_by_coordinator)
            .map(|d| d.resource)
            .collect();

        for resource in ["flow", "controller", "policies", "tenants"] {
            assert!(required.contains(&resource), "{resource} must be required");
        }
    }
}
