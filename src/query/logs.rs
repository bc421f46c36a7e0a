use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::Reading;

pub const DEFAULT_PER_PAGE: u32 = 100;
pub const MAX_PER_PAGE: u32 = 1000;

/// Filter for the paginated reading listing. Dates are whole UTC days.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFilter {
    pub device_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: u32,
    pub per_page: u32,
}

impl LogFilter {
    /// Clamp paging inputs: pages count from 1, page size defaults to
    /// [`DEFAULT_PER_PAGE`] and never exceeds [`MAX_PER_PAGE`].
    pub fn new(
        device_id: impl Into<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Self {
        let per_page = match per_page {
            None | Some(0) => DEFAULT_PER_PAGE,
            Some(n) => n.min(MAX_PER_PAGE),
        };
        Self {
            device_id: device_id.into(),
            start_date,
            end_date,
            page: page.unwrap_or(1).max(1),
            per_page,
        }
    }

    /// `start_date` 00:00:00 UTC.
    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start_date.map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    /// Last representable instant of `end_date`.
    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end_date.and_then(|d| {
            d.succ_opt()
                .map(|next| next.and_time(NaiveTime::MIN).and_utc() - chrono::Duration::nanoseconds(1))
        })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// One page of raw readings, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogPage {
    pub data: Vec<Reading>,
    /// Rows matching the filter across all pages.
    pub total: i64,
}
