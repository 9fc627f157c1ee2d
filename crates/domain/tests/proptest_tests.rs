//! Property-based tests for domain value objects and entities
//!
//! These tests use proptest to verify invariants across many random inputs.

use chrono::Utc;
use domain::{
    entities::{StorageEstimate, StorageReport, SyncQueueItem},
    value_objects::{EntityId, EntityType, SyncOperation, SyncStatus, TEMP_ID_PREFIX},
};
use proptest::prelude::*;

// ============================================================================
// EntityType Property Tests
// ============================================================================

mod entity_type_tests {
    use super::*;

    proptest! {
        #[test]
        fn valid_names_are_accepted(name in "[a-z][a-z0-9_-]{0,63}") {
            let entity_type = EntityType::new(name.clone());
            prop_assert!(entity_type.is_ok());
            let entity_type = entity_type.unwrap();
            prop_assert_eq!(entity_type.as_str(), name.as_str());
        }

        #[test]
        fn uppercase_names_are_rejected(name in "[A-Z]{1,16}") {
            prop_assert!(EntityType::new(name).is_err());
        }

        #[test]
        fn overlong_names_are_rejected(name in "[a-z]{65,100}") {
            prop_assert!(EntityType::new(name).is_err());
        }
    }
}

// ============================================================================
// EntityId Property Tests
// ============================================================================

mod entity_id_tests {
    use super::*;

    proptest! {
        #[test]
        fn server_ids_roundtrip(id in "[a-zA-Z0-9]{1,32}") {
            let parsed = EntityId::parse(&id).unwrap();
            prop_assert!(!parsed.is_temp());
            prop_assert_eq!(parsed.to_string(), id);
        }

        #[test]
        fn temp_prefix_is_never_a_server_id(suffix in "[a-z0-9]{1,16}") {
            let id = format!("{TEMP_ID_PREFIX}{suffix}");
            prop_assert!(EntityId::server(id).is_err());
        }
    }

    #[test]
    fn temp_ids_parse_back_as_temp() {
        let id = EntityId::new_temp();
        let parsed = EntityId::parse(&id.to_string()).unwrap();
        assert!(parsed.is_temp());
        assert_eq!(parsed, id);
    }
}

// ============================================================================
// SyncQueueItem Property Tests
// ============================================================================

mod queue_item_tests {
    use super::*;

    fn item() -> SyncQueueItem {
        SyncQueueItem::new(
            SyncOperation::Update,
            EntityType::new("records").unwrap(),
            EntityId::server("r1").unwrap(),
            serde_json::json!({}),
        )
    }

    proptest! {
        #[test]
        fn item_fails_exactly_at_ceiling(max_retries in 1u32..10) {
            let mut item = item();
            for attempt in 1..=max_retries {
                item.mark_in_flight().unwrap();
                let failed = item.record_failure("boom", max_retries, Utc::now()).unwrap();
                prop_assert_eq!(failed, attempt == max_retries);
            }
            prop_assert_eq!(item.status, SyncStatus::Failed);
            prop_assert_eq!(item.retries, max_retries);
        }
    }
}

// ============================================================================
// StorageReport Property Tests
// ============================================================================

mod storage_report_tests {
    use super::*;

    proptest! {
        #[test]
        fn display_percent_is_always_in_range(
            usage in 0u64..u64::MAX / 2,
            quota in 0u64..u64::MAX / 2
        ) {
            let report = StorageReport::new(
                StorageEstimate { usage_bytes: usage, quota_bytes: quota },
                0,
                0,
                None,
            );
            prop_assert!((0.0..=100.0).contains(&report.usage_percent));
            prop_assert_eq!(report.estimate.usage_bytes, usage);
        }
    }
}
