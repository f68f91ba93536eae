//! Edge case tests for jigsync-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use jigsync_engine::{
    order_pending, Backoff, ConnectivitySnapshot, Error, FailureClass, FailureDisposition,
    MutationEnvelope, NewMutation, OperationType, PendingMutation, QueueExport, QueueStatus,
    RetryPolicy, Transition,
};
use proptest::prelude::*;
use serde_json::json;

fn create_test_mutation(id: i64, priority: i32, created_at: u64) -> PendingMutation {
    let envelope = MutationEnvelope::json(
        "validations",
        OperationType::Create,
        &json!({"jig_id": id, "turno": "A"}),
    )
    .unwrap();
    PendingMutation::from_new(
        id,
        format!("ref-{}", id),
        NewMutation::new(envelope).with_priority(priority),
        created_at,
    )
}

// ============================================================================
// Payload Edge Cases
// ============================================================================

#[test]
fn empty_payload_is_allowed() {
    let env = MutationEnvelope::new("validations", OperationType::Create, Vec::new());
    assert!(env.validate().is_ok());
    assert!(env.is_empty());
}

#[test]
fn binary_payload_is_preserved() {
    let bytes: Vec<u8> = (0..=255).collect();
    let env = MutationEnvelope::new("repairs", OperationType::Create, bytes.clone());
    assert_eq!(env.bytes, bytes);
    assert_eq!(env.len(), 256);
}

#[test]
fn unicode_payload_roundtrip() {
    let comments = vec![
        "Jig dañado en estación 3",
        "日本語テスト",
        "🎉🚀💯",
        "Line\nBreak\tTab",
        "Null\0Test",
    ];

    for comment in comments {
        let env = MutationEnvelope::json(
            "validations",
            OperationType::Create,
            &json!({"comentario": comment}),
        )
        .unwrap();
        let decoded: serde_json::Value = env.decode_json().unwrap();
        assert_eq!(decoded["comentario"], comment);
    }
}

#[test]
fn very_large_payload() {
    // 1MB signature blob
    let signature = "x".repeat(1024 * 1024);
    let env = MutationEnvelope::json(
        "validations",
        OperationType::Create,
        &json!({"firma_digital": signature}),
    )
    .unwrap();
    assert!(env.len() > 1024 * 1024);
}

#[test]
fn delete_with_empty_entity_id_rejected() {
    let env = MutationEnvelope::new("jigs", OperationType::Delete, Vec::new()).with_entity_id("");
    assert!(matches!(env.validate(), Err(Error::MissingEntityId { .. })));
}

// ============================================================================
// Ordering Edge Cases
// ============================================================================

#[test]
fn ordering_low_high_low() {
    let mut items = vec![
        create_test_mutation(1, 0, 1_000),
        create_test_mutation(2, 10, 2_000),
        create_test_mutation(3, 0, 3_000),
    ];
    order_pending(&mut items);
    let ids: Vec<_> = items.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 1, 3]);
}

#[test]
fn negative_priorities_sort_last() {
    let mut items = vec![
        create_test_mutation(1, -5, 1_000),
        create_test_mutation(2, 0, 2_000),
    ];
    order_pending(&mut items);
    assert_eq!(items[0].id, 2);
}

#[test]
fn ordering_empty_queue() {
    let mut items: Vec<PendingMutation> = Vec::new();
    order_pending(&mut items);
    assert!(items.is_empty());
}

proptest! {
    #[test]
    fn ordering_is_priority_desc_then_created_at_asc(
        entries in prop::collection::vec((-50i32..50, 0u64..1_000_000), 0..64)
    ) {
        let mut items: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(i, (p, t))| create_test_mutation(i as i64, *p, *t))
            .collect();
        order_pending(&mut items);

        for pair in items.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.priority >= b.priority);
            if a.priority == b.priority {
                prop_assert!(a.created_at <= b.created_at);
            }
        }
    }

    #[test]
    fn attempts_never_decrease_on_failure(failures in 1u32..50) {
        let policy = RetryPolicy::default();
        let mut m = create_test_mutation(1, 20, 0);
        let mut previous = 0;
        for i in 0..failures {
            m.begin_attempt(u64::from(i)).unwrap();
            let disposition = policy.disposition(m.attempts + 1, FailureClass::Transient);
            m.fail("down", FailureClass::Transient, disposition).unwrap();
            prop_assert!(m.attempts > previous);
            previous = m.attempts;
        }
        prop_assert_eq!(m.status, QueueStatus::Pending);
    }

    #[test]
    fn backoff_is_monotonic_and_capped(base in 1u64..10_000, max in 1u64..1_000_000, n in 0u32..100) {
        let backoff = Backoff::Exponential { base_ms: base, max_ms: max };
        prop_assert!(backoff.delay_after(n) <= backoff.delay_after(n + 1));
        prop_assert!(backoff.delay_after(n) <= max);
    }
}

// ============================================================================
// Retry Edge Cases
// ============================================================================

#[test]
fn max_attempts_of_one_abandons_first_failure() {
    let policy = RetryPolicy {
        max_attempts: Some(1),
        ..Default::default()
    };
    let mut m = create_test_mutation(1, 20, 0);
    m.begin_attempt(1).unwrap();
    let disposition = policy.disposition(m.attempts + 1, FailureClass::Transient);
    assert_eq!(disposition, FailureDisposition::Abandon);
    assert_eq!(
        m.fail("down", FailureClass::Transient, disposition).unwrap(),
        QueueStatus::FailedPermanently
    );
}

#[test]
fn attempts_saturate() {
    let mut m = create_test_mutation(1, 20, 0);
    m.attempts = u32::MAX;
    m.begin_attempt(1).unwrap();
    m.fail("down", FailureClass::Transient, FailureDisposition::Retry)
        .unwrap();
    assert_eq!(m.attempts, u32::MAX);
}

#[test]
fn backoff_with_timestamp_overflow() {
    let policy = RetryPolicy {
        backoff: Backoff::Exponential {
            base_ms: u64::MAX,
            max_ms: u64::MAX,
        },
        ..Default::default()
    };
    let mut m = create_test_mutation(1, 20, 0);
    m.attempts = 3;
    m.last_attempt_at = Some(u64::MAX - 1);
    assert_eq!(policy.next_attempt_at(&m), Some(u64::MAX));
}

#[test]
fn in_flight_cannot_restart() {
    let mut m = create_test_mutation(1, 20, 0);
    m.begin_attempt(1).unwrap();
    assert!(matches!(
        m.begin_attempt(2),
        Err(Error::InvalidTransition { .. })
    ));
}

// ============================================================================
// Connectivity Edge Cases
// ============================================================================

#[test]
fn flapping_produces_one_trigger_per_edge() {
    let reports = [
        (false, false),
        (true, true),
        (true, true),
        (true, false),
        (true, true),
        (true, true),
    ];

    let mut previous = ConnectivitySnapshot::offline(0);
    let mut triggers = 0;
    for (i, (connected, reachable)) in reports.iter().enumerate() {
        let next = ConnectivitySnapshot::new(*connected, *reachable, i as u64);
        if let Some(t) = Transition::between(&previous, &next) {
            if t.triggers_sync() {
                triggers += 1;
            }
            previous = next;
        }
    }
    assert_eq!(triggers, 2);
}

// ============================================================================
// Export Edge Cases
// ============================================================================

#[test]
fn empty_export_roundtrip() {
    let export = QueueExport::new(0, Vec::new());
    let parsed = QueueExport::from_json(&export.to_json_pretty().unwrap()).unwrap();
    assert!(parsed.is_empty());
}
