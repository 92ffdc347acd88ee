//! Application state shared across handlers

use access::facade::{AdminOperations, ClientOperations};
use access::services::{AccessCodeService, PaymentFulfillmentService};
use access::store::{
    CodeStore, MemoryCodeStore, MemoryPaymentRequestStore, PaymentRequestStore, PgCodeStore,
    PgPaymentRequestStore,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::middleware::JwtVerifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub admin: AdminOperations,
    pub client: ClientOperations,
    pub payments: PaymentFulfillmentService,
    pub jwt: JwtVerifier,
    /// Present when running on PostgreSQL; checked by the health endpoint
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire the services over the given stores
    pub fn new(
        config: &ApiConfig,
        code_store: Arc<dyn CodeStore>,
        payment_store: Arc<dyn PaymentRequestStore>,
        jwt: JwtVerifier,
        db_pool: Option<PgPool>,
    ) -> Self {
        let policy = config.generation_policy();
        let codes = AccessCodeService::new(code_store, Arc::new(config.code_tokens()), policy);
        let payments = PaymentFulfillmentService::new(
            payment_store,
            codes,
            Arc::new(config.payment_reference_tokens()),
            policy,
        );

        Self {
            admin: AdminOperations::new(payments.clone()),
            client: ClientOperations::new(payments.clone()),
            payments,
            jwt,
            db_pool,
        }
    }

    pub fn postgres(config: &ApiConfig, pool: PgPool, jwt: JwtVerifier) -> Self {
        Self::new(
            config,
            Arc::new(PgCodeStore::new(pool.clone())),
            Arc::new(PgPaymentRequestStore::new(pool.clone())),
            jwt,
            Some(pool),
        )
    }

    pub fn in_memory(config: &ApiConfig, jwt: JwtVerifier) -> Self {
        Self::new(
            config,
            Arc::new(MemoryCodeStore::new()),
            Arc::new(MemoryPaymentRequestStore::new()),
            jwt,
            None,
        )
    }

    pub fn codes(&self) -> &AccessCodeService {
        self.payments.codes()
    }
}
