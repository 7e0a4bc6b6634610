//! Integration tests for admission and queue capacity
//!
//! No workers run here, so every admitted task stays queued.

mod common;

use std::sync::Arc;

use genpool_dispatch::prelude::*;
use serde_json::json;

use common::small_request;

fn gate(capacity: usize) -> AdmissionGate {
    AdmissionGate::new(Arc::new(TaskQueue::new(capacity)), AdmissionLimits::default())
}

#[test]
fn test_submission_beyond_capacity_rejected() {
    let gate = gate(100);

    for i in 0..100 {
        let admitted = gate.submit(&small_request("a cat", i)).unwrap();
        assert_eq!(admitted.queue_position, i as usize + 1);
    }

    assert_eq!(
        gate.submit(&small_request("one too many", 7)),
        Err(AdmissionRejection::QueueFull)
    );
    assert_eq!(gate.queue().len(), 100);
}

#[test]
fn test_rejection_consumes_no_capacity() {
    let gate = gate(2);

    let blank: GenerateRequest = serde_json::from_value(json!({"prompt": " \t\n"})).unwrap();
    assert_eq!(gate.submit(&blank), Err(AdmissionRejection::EmptyPrompt));

    let bad: GenerateRequest =
        serde_json::from_value(json!({"prompt": "x", "height": {"px": 3}})).unwrap();
    assert_eq!(
        gate.submit(&bad),
        Err(AdmissionRejection::InvalidType { field: "height" })
    );

    assert!(gate.queue().is_empty());
    assert!(gate.submit(&small_request("a", 1)).is_ok());
    assert!(gate.submit(&small_request("b", 2)).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admission_never_overfills() {
    let gate = Arc::new(gate(10));

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.submit(&small_request("race", i)) })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let admitted = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(AdmissionRejection::QueueFull))))
        .count();

    assert_eq!(admitted, 10);
    assert_eq!(rejected, 54);
    assert_eq!(gate.queue().len(), 10);
}

#[test]
fn test_queue_preserves_admission_order() {
    let gate = gate(8);
    for seed in [5, 3, 9] {
        gate.submit(&small_request("ordered", seed)).unwrap();
    }

    let seeds: Vec<u64> = gate.queue().drain().iter().map(|t| t.seed()).collect();
    assert_eq!(seeds, vec![5, 3, 9]);
}

#[test]
fn test_closed_queue_reports_shutting_down() {
    let gate = gate(8);
    gate.queue().close();

    assert_eq!(
        gate.submit(&small_request("late", 1)),
        Err(AdmissionRejection::ShuttingDown)
    );
}
