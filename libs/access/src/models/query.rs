//! Listing queries and paginated results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CodeStatus, PaymentStatus};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

fn page_number(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

fn page_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

fn search_term(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Query parameters for access code listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Number of items per page
    pub limit: Option<u32>,
    /// Filter by effective status
    pub status: Option<CodeStatus>,
    /// Substring of the code or match id
    pub search: Option<String>,
    /// Restrict to one owner; never taken from the query string
    #[serde(skip)]
    pub owner_id: Option<Uuid>,
}

impl CodeQuery {
    pub fn page(&self) -> u32 {
        page_number(self.page)
    }

    pub fn limit(&self) -> u32 {
        page_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    /// Lower-cased search term, if any
    pub fn search_term(&self) -> Option<String> {
        search_term(&self.search)
    }
}

/// Query parameters for payment request listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Number of items per page
    pub limit: Option<u32>,
    /// Filter by status
    pub status: Option<PaymentStatus>,
    /// Substring of the payment reference or description
    pub search: Option<String>,
    /// Restrict to one owner; never taken from the query string
    #[serde(skip)]
    pub owner_id: Option<Uuid>,
}

impl PaymentQuery {
    pub fn page(&self) -> u32 {
        page_number(self.page)
    }

    pub fn limit(&self) -> u32 {
        page_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    /// Lower-cased search term, if any
    pub fn search_term(&self) -> Option<String> {
        search_term(&self.search)
    }
}
