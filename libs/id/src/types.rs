//! Typed ID definitions for the admission domain.

use crate::define_id;

// =============================================================================
// Ledger
// =============================================================================

define_id!(EventId, "evt");
define_id!(UserId, "usr");
define_id!(RegistrationId, "reg");

// =============================================================================
// Side records
// =============================================================================

define_id!(AuditLogId, "aud");
define_id!(NotificationId, "ntf");
define_id!(RequestId, "req");

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_event_id_roundtrip() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("evt_"));
    }

    #[test]
    fn test_user_id_rejects_event_prefix() {
        let result: Result<UserId, _> = "evt_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        let err = result.unwrap_err();
        assert!(err.is_prefix_error());
        assert_eq!(
            err,
            crate::IdError::InvalidPrefix {
                expected: "usr",
                actual: "evt".to_string()
            }
        );
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<UserId, _> = "usr01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert_eq!(result.unwrap_err(), crate::IdError::MissingSeparator);
    }

    #[test]
    fn test_empty() {
        assert_eq!(EventId::parse("").unwrap_err(), crate::IdError::Empty);
    }

    #[test]
    fn test_invalid_ulid() {
        assert!(matches!(
            RegistrationId::parse("reg_nope"),
            Err(crate::IdError::InvalidUlid(_))
        ));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = RegistrationId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = RegistrationId::new();
        assert!(first < second);
    }

    #[test]
    fn test_all_prefixes_unique() {
        let prefixes = [
            EventId::PREFIX,
            UserId::PREFIX,
            RegistrationId::PREFIX,
            AuditLogId::PREFIX,
            NotificationId::PREFIX,
            RequestId::PREFIX,
        ];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".{0,40}") {
            let _ = EventId::parse(&input);
        }
    }
}
