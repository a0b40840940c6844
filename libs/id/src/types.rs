//! Typed ID definitions for every remote record the coordinator touches.

use crate::define_id;

// =============================================================================
// Flow structure
// =============================================================================

define_id!(ProcessGroupId, "process group");
define_id!(RegistryClientId, "registry client");
define_id!(ParameterContextId, "parameter context");

// =============================================================================
// Tenants and authorization
// =============================================================================

define_id!(UserId, "user");
define_id!(UserGroupId, "user group");
define_id!(AccessPolicyId, "access policy");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_process_group_id_parse() {
        let id: ProcessGroupId = "3f2c1a9e-0174-1000-8a3b-5c4d1e2f3a4b".parse().unwrap();
        assert_eq!(id.as_str(), "3f2c1a9e-0174-1000-8a3b-5c4d1e2f3a4b");
        assert_eq!(id.to_string(), "3f2c1a9e-0174-1000-8a3b-5c4d1e2f3a4b");
    }

    #[test]
    fn test_id_empty() {
        let result: Result<UserId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_id_rejects_path_separator() {
        let result: Result<AccessPolicyId, _> = "abc/def".parse();
        assert_eq!(result.unwrap_err(), crate::IdError::InvalidCharacter('/'));
    }

    #[test]
    fn test_id_rejects_whitespace() {
        let result: Result<RegistryClientId, _> = "abc def".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidCharacter(' ')
        ));
    }

    #[test]
    fn test_id_json_roundtrip() {
        let id = ParameterContextId::parse("pc-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pc-1\"");
        let parsed: ParameterContextId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_json_rejects_invalid() {
        let result: Result<UserGroupId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_all_kinds_unique() {
        let kinds = vec![
            ProcessGroupId::KIND,
            RegistryClientId::KIND,
            ParameterContextId::KIND,
            UserId::KIND,
            UserGroupId::KIND,
            AccessPolicyId::KIND,
        ];

        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(kinds.len(), unique.len(), "Duplicate ID kinds found!");
    }

    proptest! {
        #[test]
        fn prop_uuid_like_ids_roundtrip(raw in "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}") {
            let id = ProcessGroupId::parse(&raw).unwrap();
            let reparsed: ProcessGroupId = id.to_string().parse().unwrap();
            prop_assert_eq!(id, reparsed);
        }

        #[test]
        fn prop_ids_with_slash_rejected(prefix in "[a-z0-9]{0,8}", suffix in "[a-z0-9]{0,8}") {
            let raw = format!("{prefix}/{suffix}");
            prop_assert!(UserId::parse(&raw).is_err());
        }
    }
}
