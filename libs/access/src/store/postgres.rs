//! PostgreSQL stores
//!
//! Uniqueness is the `UNIQUE` constraint on `code` / `code_pay`; atomicity of
//! a single-record transition is the `WHERE version = $n` guard on every
//! `UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseError;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AccessCode, CodeQuery, NewAccessCode, NewPaymentRequest, Page, PaymentQuery, PaymentRequest,
    PaymentStats, StatsRange,
};
use crate::store::{CodeStore, PaymentRequestStore};

const CODE_COLUMNS: &str = "id, code, status, max_uses, usage_count, expires_at, match_id, \
     type_match, owner_id, version, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, code_pay, owner_id, amount, payment_type, description, \
     status, note, rejection_reason, access_code, access_code_id, requested_uses, version, \
     created_at, updated_at, processed_at";

/// Run the bundled schema migrations
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    info!("Running access-code schema migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(DatabaseError::Migration(e.to_string())))?;
    Ok(())
}

fn insert_error(e: sqlx::Error, constraint: &'static str) -> StoreError {
    let e = DatabaseError::Query(e);
    if e.is_unique_violation() {
        StoreError::Conflict(constraint)
    } else {
        StoreError::Database(e)
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn code_from_row(row: &PgRow) -> StoreResult<AccessCode> {
    let status: String = row.try_get("status")?;
    Ok(AccessCode {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        max_uses: row.try_get("max_uses")?,
        usage_count: row.try_get("usage_count")?,
        expires_at: row.try_get("expires_at")?,
        match_id: row.try_get("match_id")?,
        type_match: row.try_get("type_match")?,
        owner_id: row.try_get("owner_id")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<PaymentRequest> {
    let status: String = row.try_get("status")?;
    Ok(PaymentRequest {
        id: row.try_get("id")?,
        code_pay: row.try_get("code_pay")?,
        owner_id: row.try_get("owner_id")?,
        amount: row.try_get("amount")?,
        payment_type: row.try_get("payment_type")?,
        description: row.try_get("description")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        note: row.try_get("note")?,
        rejection_reason: row.try_get("rejection_reason")?,
        access_code: row.try_get("access_code")?,
        access_code_id: row.try_get("access_code_id")?,
        requested_uses: row.try_get("requested_uses")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// PostgreSQL [`CodeStore`]
#[derive(Clone)]
pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CodeQuery, now: DateTime<Utc>) {
        builder.push(" WHERE TRUE");
        if let Some(status) = query.status {
            builder
                .push(
                    " AND (CASE WHEN status IN ('inactive', 'active') \
                     AND expires_at IS NOT NULL AND expires_at <= ",
                )
                .push_bind(now)
                .push(" THEN 'expired' ELSE status END) = ")
                .push_bind(status.as_str());
        }
        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner_id);
        }
        if let Some(term) = query.search_term() {
            let pattern = like_pattern(&term);
            builder
                .push(" AND (LOWER(code) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(match_id, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn insert(&self, new: NewAccessCode) -> StoreResult<AccessCode> {
        let sql = format!(
            "INSERT INTO access_codes \
             (code, status, max_uses, expires_at, match_id, type_match, owner_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            CODE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&new.code)
            .bind(new.status.as_str())
            .bind(new.max_uses)
            .bind(new.expires_at)
            .bind(&new.match_id)
            .bind(&new.type_match)
            .bind(new.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(e, "access_codes.code"))?;

        code_from_row(&row)
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<AccessCode>> {
        let sql = format!("SELECT {} FROM access_codes WHERE code = $1", CODE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(code_from_row).transpose()
    }

    async fn update(&self, code: &AccessCode) -> StoreResult<AccessCode> {
        let sql = format!(
            "UPDATE access_codes SET \
             status = $2, max_uses = $3, usage_count = $4, expires_at = $5, \
             match_id = $6, type_match = $7, owner_id = $8, \
             version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $9 \
             RETURNING {}",
            CODE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(code.id)
            .bind(code.status.as_str())
            .bind(code.max_uses)
            .bind(code.usage_count)
            .bind(code.expires_at)
            .bind(&code.match_id)
            .bind(&code.type_match)
            .bind(code.owner_id)
            .bind(code.version)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => code_from_row(&row),
            None => Err(StoreError::VersionMismatch),
        }
    }

    async fn delete(&self, code: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM access_codes WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &CodeQuery, now: DateTime<Utc>) -> StoreResult<Page<AccessCode>> {
        let mut select = QueryBuilder::new(format!("SELECT {} FROM access_codes", CODE_COLUMNS));
        Self::push_filters(&mut select, query, now);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit()))
            .push(" OFFSET ")
            .push_bind(query.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM access_codes");
        Self::push_filters(&mut count, query, now);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .iter()
            .map(code_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            page: query.page(),
            limit: query.limit(),
            total,
        })
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE access_codes
            SET status = 'expired', version = version + 1, updated_at = NOW()
            WHERE status IN ('inactive', 'active')
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// PostgreSQL [`PaymentRequestStore`]
#[derive(Clone)]
pub struct PgPaymentRequestStore {
    pool: PgPool,
}

impl PgPaymentRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PaymentQuery) {
        builder.push(" WHERE TRUE");
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner_id);
        }
        if let Some(term) = query.search_term() {
            let pattern = like_pattern(&term);
            builder
                .push(" AND (LOWER(code_pay) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(description, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl PaymentRequestStore for PgPaymentRequestStore {
    async fn insert(&self, new: NewPaymentRequest) -> StoreResult<PaymentRequest> {
        let sql = format!(
            "INSERT INTO payment_requests \
             (code_pay, owner_id, amount, payment_type, description, access_code, requested_uses) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&new.code_pay)
            .bind(new.owner_id)
            .bind(new.amount)
            .bind(&new.payment_type)
            .bind(&new.description)
            .bind(&new.access_code)
            .bind(new.requested_uses)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(e, "payment_requests.code_pay"))?;

        payment_from_row(&row)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<PaymentRequest>> {
        let sql = format!("SELECT {} FROM payment_requests WHERE id = $1", PAYMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_by_code_pay(&self, code_pay: &str) -> StoreResult<Option<PaymentRequest>> {
        let sql = format!(
            "SELECT {} FROM payment_requests WHERE code_pay = $1",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(code_pay)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn update(&self, request: &PaymentRequest) -> StoreResult<PaymentRequest> {
        let sql = format!(
            "UPDATE payment_requests SET \
             status = $2, note = $3, rejection_reason = $4, access_code_id = $5, \
             processed_at = $6, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $7 \
             RETURNING {}",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(&request.note)
            .bind(&request.rejection_reason)
            .bind(request.access_code_id)
            .bind(request.processed_at)
            .bind(request.version)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => payment_from_row(&row),
            None => Err(StoreError::VersionMismatch),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM payment_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &PaymentQuery) -> StoreResult<Page<PaymentRequest>> {
        let mut select =
            QueryBuilder::new(format!("SELECT {} FROM payment_requests", PAYMENT_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit()))
            .push(" OFFSET ")
            .push_bind(query.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM payment_requests");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .iter()
            .map(payment_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            page: query.page(),
            limit: query.limit(),
            total,
        })
    }

    async fn stats(
        &self,
        range: StatsRange,
        day_start: DateTime<Utc>,
    ) -> StoreResult<PaymentStats> {
        let row = sqlx::query(
            r#"
            WITH scoped AS (
                SELECT *,
                       ($1::timestamptz IS NULL OR created_at >= $1)
                       AND ($2::timestamptz IS NULL OR created_at < $2) AS in_range
                FROM payment_requests
            )
            SELECT
                COUNT(*) FILTER (WHERE in_range) AS total_requests,
                COALESCE(SUM(amount) FILTER (WHERE in_range AND status = 'completed'), 0)::BIGINT
                    AS total_amount,
                COUNT(*) FILTER (WHERE in_range AND status = 'pending') AS pending_count,
                COUNT(*) FILTER (WHERE status = 'completed' AND processed_at >= $3)
                    AS completed_today,
                COUNT(*) FILTER (WHERE status = 'rejected' AND processed_at >= $3)
                    AS rejected_today
            FROM scoped
            "#,
        )
        .bind(range.start_date)
        .bind(range.end_date)
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(PaymentStats {
            total_requests: row.try_get("total_requests")?,
            total_amount: row.try_get("total_amount")?,
            pending_count: row.try_get("pending_count")?,
            completed_today: row.try_get("completed_today")?,
            rejected_today: row.try_get("rejected_today")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ab"), "%ab%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
