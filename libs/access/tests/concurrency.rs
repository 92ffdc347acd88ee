//! Race properties of redemption and approval

use access::AccessError;
use access::generator::{GenerationPolicy, RandomTokens};
use access::models::{CodeSpec, CodeStatus, PaymentStatus, PaymentSubmission};
use access::services::{AccessCodeService, PaymentFulfillmentService};
use access::store::{MemoryCodeStore, MemoryPaymentRequestStore};
use std::sync::Arc;
use uuid::Uuid;

fn code_service(store: &MemoryCodeStore) -> AccessCodeService {
    AccessCodeService::new(
        Arc::new(store.clone()),
        Arc::new(RandomTokens::access_codes(8)),
        GenerationPolicy::default(),
    )
}

fn payment_service(
    code_store: &MemoryCodeStore,
    payment_store: &MemoryPaymentRequestStore,
) -> PaymentFulfillmentService {
    PaymentFulfillmentService::new(
        Arc::new(payment_store.clone()),
        code_service(code_store),
        Arc::new(RandomTokens::payment_references(8)),
        GenerationPolicy::default(),
    )
}

/// Outcome counts of a batch of redemptions
fn tally(results: Vec<Result<(), AccessError>>) -> (usize, usize) {
    let mut ok = 0;
    let mut terminal = 0;
    for result in results {
        match result {
            Ok(()) => ok += 1,
            Err(AccessError::Terminal { .. }) => terminal += 1,
            Err(other) => panic!("unexpected redemption failure: {}", other),
        }
    }
    (ok, terminal)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_use_is_won_once() {
    let store = MemoryCodeStore::new();
    let codes = code_service(&store);
    let code = codes
        .create_code(CodeSpec::default(), true, None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let codes = codes.clone();
            let code = code.code.clone();
            tokio::spawn(async move { codes.redeem(&code).await.map(|_| ()) })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(tally(results), (1, 1));
    let stored = codes.get(&code.code).await.unwrap();
    assert_eq!(stored.status, CodeStatus::Used);
    assert_eq!(stored.usage_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_usage_never_exceeds_quota_under_contention() {
    let store = MemoryCodeStore::new();
    let codes = code_service(&store);
    let spec = CodeSpec {
        max_uses: Some(5),
        ..Default::default()
    };
    let code = codes.create_code(spec, true, None).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let codes = codes.clone();
            let code = code.code.clone();
            tokio::spawn(async move { codes.redeem(&code).await.map(|_| ()) })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(tally(results), (5, 15));
    let stored = codes.get(&code.code).await.unwrap();
    assert_eq!(stored.usage_count, 5);
    assert_eq!(stored.status, CodeStatus::Used);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redemption_across_instances_sharing_a_store() {
    // Separate services share nothing but the store, like two processes
    let store = MemoryCodeStore::new();
    let first = code_service(&store);
    let second = code_service(&store);
    let code = first
        .create_code(CodeSpec::default(), true, None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let codes = if i % 2 == 0 {
                first.clone()
            } else {
                second.clone()
            };
            let code = code.code.clone();
            tokio::spawn(async move { codes.redeem(&code).await.map(|_| ()) })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(tally(results), (1, 7));
    assert_eq!(first.get(&code.code).await.unwrap().usage_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_provision_once() {
    let code_store = MemoryCodeStore::new();
    let payment_store = MemoryPaymentRequestStore::new();
    let payments = payment_service(&code_store, &payment_store);
    let request = payments
        .submit(
            Uuid::new_v4(),
            PaymentSubmission {
                amount: 100_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let payments = payments.clone();
            tokio::spawn(async move { payments.approve(request.id, None).await })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(AccessError::NotPending {
                status: PaymentStatus::Completed,
            }) => {}
            Err(other) => panic!("unexpected approval failure: {}", other),
        }
    }

    assert_eq!(approved, 1);
    assert_eq!(code_store.len().await, 1);
    let completed = payments.get(request.id).await.unwrap();
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert!(completed.access_code_id.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_approvals_across_instances_provision_once() {
    let code_store = MemoryCodeStore::new();
    let payment_store = MemoryPaymentRequestStore::new();
    let first = payment_service(&code_store, &payment_store);
    let second = payment_service(&code_store, &payment_store);
    let request = first
        .submit(
            Uuid::new_v4(),
            PaymentSubmission {
                amount: 100_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let payments = if i % 2 == 0 {
                first.clone()
            } else {
                second.clone()
            };
            tokio::spawn(async move { payments.approve(request.id, None).await })
        })
        .collect();

    let mut approved = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(approval) => approved.push(approval),
            Err(AccessError::NotPending { .. }) => {}
            Err(other) => panic!("unexpected approval failure: {}", other),
        }
    }

    assert_eq!(approved.len(), 1);
    // Losers of the final swap remove the code they created
    assert_eq!(code_store.len().await, 1);
    let completed = first.get(request.id).await.unwrap();
    assert_eq!(completed.access_code_id, Some(approved[0].access_code.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_approve_and_cancel_race_settles_once() {
    let code_store = MemoryCodeStore::new();
    let payment_store = MemoryPaymentRequestStore::new();
    let payments = payment_service(&code_store, &payment_store);
    let owner = access::models::Actor::client(Uuid::new_v4());
    let request = payments
        .submit(
            owner.id,
            PaymentSubmission {
                amount: 10_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let approver = payments.clone();
    let approve = tokio::spawn(async move { approver.approve(request.id, None).await.map(|_| ()) });
    let canceller = payments.clone();
    let cancel =
        tokio::spawn(async move { canceller.cancel(request.id, &owner, None).await.map(|_| ()) });

    let outcomes = [approve.await.unwrap(), cancel.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);

    let settled = payments.get(request.id).await.unwrap();
    match settled.status {
        PaymentStatus::Completed => assert_eq!(code_store.len().await, 1),
        PaymentStatus::Cancelled => assert!(code_store.is_empty().await),
        other => panic!("request left in {}", other),
    }
}
