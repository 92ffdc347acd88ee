//! PostgreSQL store round trip
//!
//! Needs a running server at `DATABASE_URL`; the schema is migrated by the
//! test itself.

use access::generator::{GenerationPolicy, RandomTokens};
use access::models::{CodeQuery, CodeSpec, CodeStatus, PaymentStatus, PaymentSubmission};
use access::services::{AccessCodeService, PaymentFulfillmentService};
use access::store::{self, CodeStore, PgCodeStore, PgPaymentRequestStore};
use common::database::{DatabaseConfig, init_pool};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_pg_stores_follow_the_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    store::postgres::migrate(&pool).await?;

    let code_store = PgCodeStore::new(pool.clone());
    let codes = AccessCodeService::new(
        Arc::new(code_store.clone()),
        Arc::new(RandomTokens::access_codes(10)),
        GenerationPolicy::default(),
    );
    let payments = PaymentFulfillmentService::new(
        Arc::new(PgPaymentRequestStore::new(pool.clone())),
        codes.clone(),
        Arc::new(RandomTokens::payment_references(10)),
        GenerationPolicy::default(),
    );

    let owner = Uuid::new_v4();
    let request = payments
        .submit(
            owner,
            PaymentSubmission {
                amount: 100_000,
                requested_uses: Some(2),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(request.status, PaymentStatus::Pending);

    let approval = payments.approve(request.id, Some("ok".to_string())).await?;
    assert_eq!(approval.payment.status, PaymentStatus::Completed);
    assert_eq!(approval.access_code.max_uses, 2);

    let code = approval.access_code.code.clone();
    codes.redeem(&code).await?;
    let last = codes.redeem(&code).await?;
    assert_eq!(last.access_code.status, CodeStatus::Used);
    assert!(codes.redeem(&code).await.is_err());

    let mine = codes
        .list(&CodeQuery {
            owner_id: Some(owner),
            ..Default::default()
        })
        .await?;
    assert_eq!(mine.total, 1);

    let stale = code_store.find_by_code(&code).await?.ok_or("code vanished")?;
    let mut outdated = stale.clone();
    outdated.version -= 1;
    assert!(code_store.update(&outdated).await.is_err());

    payments.delete(request.id).await?;
    codes.delete(&code).await?;
    Ok(())
}
