//! In-memory stores
//!
//! Used by the tests and by the API service's `memory` storage mode. A single
//! mutex per table makes every call atomic, which gives the same
//! unique-constraint and compare-and-swap behaviour as the PostgreSQL stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AccessCode, CodeQuery, CodeStatus, NewAccessCode, NewPaymentRequest, Page, PaymentQuery,
    PaymentRequest, PaymentStats, PaymentStatus, StatsRange,
};
use crate::store::{CodeStore, PaymentRequestStore};

#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
    index: HashMap<String, i64>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn by_key(&self, key: &str) -> Option<&T> {
        self.index.get(key).and_then(|id| self.rows.get(id))
    }
}

fn paginate<T: Clone>(matching: Vec<&T>, page: u32, limit: u32, offset: i64) -> Page<T> {
    let total = matching.len() as i64;
    let items = matching
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .cloned()
        .collect();
    Page {
        items,
        page,
        limit,
        total,
    }
}

fn contains_term(value: Option<&str>, term: &str) -> bool {
    value.is_some_and(|v| v.to_lowercase().contains(term))
}

/// In-memory [`CodeStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryCodeStore {
    table: Arc<Mutex<Table<AccessCode>>>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, bypassing every rule. For seeding fixtures.
    pub async fn put(&self, mut code: AccessCode) -> AccessCode {
        let mut table = self.table.lock().await;
        if code.id <= 0 {
            code.id = table.allocate_id();
        } else {
            table.next_id = table.next_id.max(code.id);
        }
        table.index.insert(code.code.clone(), code.id);
        table.rows.insert(code.id, code.clone());
        code
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn insert(&self, new: NewAccessCode) -> StoreResult<AccessCode> {
        let mut table = self.table.lock().await;
        if table.index.contains_key(&new.code) {
            return Err(StoreError::Conflict("access_codes.code"));
        }

        let now = Utc::now();
        let code = AccessCode {
            id: table.allocate_id(),
            code: new.code,
            status: new.status,
            max_uses: new.max_uses,
            usage_count: 0,
            expires_at: new.expires_at,
            match_id: new.match_id,
            type_match: new.type_match,
            owner_id: new.owner_id,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        table.index.insert(code.code.clone(), code.id);
        table.rows.insert(code.id, code.clone());
        Ok(code)
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<AccessCode>> {
        Ok(self.table.lock().await.by_key(code).cloned())
    }

    async fn update(&self, code: &AccessCode) -> StoreResult<AccessCode> {
        let mut table = self.table.lock().await;
        let stored = table
            .rows
            .get_mut(&code.id)
            .filter(|stored| stored.version == code.version)
            .ok_or(StoreError::VersionMismatch)?;

        stored.status = code.status;
        stored.max_uses = code.max_uses;
        stored.usage_count = code.usage_count;
        stored.expires_at = code.expires_at;
        stored.match_id = code.match_id.clone();
        stored.type_match = code.type_match.clone();
        stored.owner_id = code.owner_id;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, code: &str) -> StoreResult<bool> {
        let mut table = self.table.lock().await;
        match table.index.remove(code) {
            Some(id) => Ok(table.rows.remove(&id).is_some()),
            None => Ok(false),
        }
    }

    async fn list(&self, query: &CodeQuery, now: DateTime<Utc>) -> StoreResult<Page<AccessCode>> {
        let table = self.table.lock().await;
        let term = query.search_term();
        let matching: Vec<&AccessCode> = table
            .rows
            .values()
            .rev()
            .filter(|c| query.status.is_none_or(|s| c.effective_status(now) == s))
            .filter(|c| query.owner_id.is_none_or(|owner| c.owner_id == Some(owner)))
            .filter(|c| {
                term.as_deref().is_none_or(|t| {
                    contains_term(Some(&c.code), t) || contains_term(c.match_id.as_deref(), t)
                })
            })
            .collect();
        Ok(paginate(matching, query.page(), query.limit(), query.offset()))
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.table.lock().await;
        let mut changed = 0;
        for code in table.rows.values_mut() {
            if code.is_lazily_expired(now) {
                code.status = CodeStatus::Expired;
                code.version += 1;
                code.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// In-memory [`PaymentRequestStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryPaymentRequestStore {
    table: Arc<Mutex<Table<PaymentRequest>>>,
}

impl MemoryPaymentRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentRequestStore for MemoryPaymentRequestStore {
    async fn insert(&self, new: NewPaymentRequest) -> StoreResult<PaymentRequest> {
        let mut table = self.table.lock().await;
        if table.index.contains_key(&new.code_pay) {
            return Err(StoreError::Conflict("payment_requests.code_pay"));
        }

        let now = Utc::now();
        let request = PaymentRequest {
            id: table.allocate_id(),
            code_pay: new.code_pay,
            owner_id: new.owner_id,
            amount: new.amount,
            payment_type: new.payment_type,
            description: new.description,
            status: PaymentStatus::Pending,
            note: None,
            rejection_reason: None,
            access_code: new.access_code,
            access_code_id: None,
            requested_uses: new.requested_uses,
            version: 0,
            created_at: now,
            updated_at: now,
            processed_at: None,
        };
        table.index.insert(request.code_pay.clone(), request.id);
        table.rows.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<PaymentRequest>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_code_pay(&self, code_pay: &str) -> StoreResult<Option<PaymentRequest>> {
        Ok(self.table.lock().await.by_key(code_pay).cloned())
    }

    async fn update(&self, request: &PaymentRequest) -> StoreResult<PaymentRequest> {
        let mut table = self.table.lock().await;
        let stored = table
            .rows
            .get_mut(&request.id)
            .filter(|stored| stored.version == request.version)
            .ok_or(StoreError::VersionMismatch)?;

        stored.status = request.status;
        stored.note = request.note.clone();
        stored.rejection_reason = request.rejection_reason.clone();
        stored.access_code_id = request.access_code_id;
        stored.processed_at = request.processed_at;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let mut table = self.table.lock().await;
        match table.rows.remove(&id) {
            Some(request) => {
                table.index.remove(&request.code_pay);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, query: &PaymentQuery) -> StoreResult<Page<PaymentRequest>> {
        let table = self.table.lock().await;
        let term = query.search_term();
        let matching: Vec<&PaymentRequest> = table
            .rows
            .values()
            .rev()
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .filter(|r| query.owner_id.is_none_or(|owner| r.owner_id == owner))
            .filter(|r| {
                term.as_deref().is_none_or(|t| {
                    contains_term(Some(&r.code_pay), t) || contains_term(r.description.as_deref(), t)
                })
            })
            .collect();
        Ok(paginate(matching, query.page(), query.limit(), query.offset()))
    }

    async fn stats(
        &self,
        range: StatsRange,
        day_start: DateTime<Utc>,
    ) -> StoreResult<PaymentStats> {
        let table = self.table.lock().await;
        let mut stats = PaymentStats::default();
        for request in table.rows.values() {
            if range.contains(request.created_at) {
                stats.total_requests += 1;
                match request.status {
                    PaymentStatus::Completed => stats.total_amount += request.amount,
                    PaymentStatus::Pending => stats.pending_count += 1,
                    _ => {}
                }
            }
            let processed_today = request.processed_at.is_some_and(|at| at >= day_start);
            match request.status {
                PaymentStatus::Completed if processed_today => stats.completed_today += 1,
                PaymentStatus::Rejected if processed_today => stats.rejected_today += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn new_code(code: &str) -> NewAccessCode {
        NewAccessCode {
            code: code.to_string(),
            status: CodeStatus::Active,
            max_uses: 1,
            expires_at: None,
            match_id: None,
            type_match: None,
            owner_id: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_code_is_a_conflict() {
        let store = MemoryCodeStore::new();
        store.insert(new_code("AAAA")).await.unwrap();
        let err = store.insert(new_code("AAAA")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = MemoryCodeStore::new();
        let original = store.insert(new_code("BBBB")).await.unwrap();

        let mut first = original.clone();
        first.usage_count = 1;
        let saved = store.update(&first).await.unwrap();
        assert_eq!(saved.version, original.version + 1);

        let mut stale = original.clone();
        stale.status = CodeStatus::Revoked;
        assert!(matches!(
            store.update(&stale).await,
            Err(StoreError::VersionMismatch)
        ));

        let stored = store.find_by_code("BBBB").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.status, CodeStatus::Active);
    }

    #[tokio::test]
    async fn test_update_of_deleted_record_is_a_mismatch() {
        let store = MemoryCodeStore::new();
        let code = store.insert(new_code("CCCC")).await.unwrap();
        assert!(store.delete("CCCC").await.unwrap());
        assert!(!store.delete("CCCC").await.unwrap());
        assert!(matches!(
            store.update(&code).await,
            Err(StoreError::VersionMismatch)
        ));
    }

    #[tokio::test]
    async fn test_payment_reference_is_unique_and_immutable() {
        let store = MemoryPaymentRequestStore::new();
        let new = NewPaymentRequest {
            code_pay: "PAYAAAA".to_string(),
            owner_id: Uuid::new_v4(),
            amount: 10,
            payment_type: "access_code".to_string(),
            description: None,
            access_code: None,
            requested_uses: 1,
        };
        let mut request = store.insert(new.clone()).await.unwrap();
        assert!(matches!(
            store.insert(new).await,
            Err(StoreError::Conflict(_))
        ));

        request.code_pay = "PAYOTHER".to_string();
        let saved = store.update(&request).await.unwrap();
        assert_eq!(saved.code_pay, "PAYAAAA");
        assert!(store.find_by_code_pay("PAYOTHER").await.unwrap().is_none());
    }
}
