//! Page bookkeeping for collections

use crate::entity::cast::to_safe_integer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

pub const DEFAULT_PER_PAGE: u32 = 15;

/// Page counters and sort state of a paginated collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    per_page: u32,
    current_page: u32,
    last_page: u32,
    from: u64,
    to: u64,
    total: u64,
    sort_by: Option<String>,
    sort_desc: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            current_page: 1,
            last_page: 1,
            from: 0,
            to: 0,
            total: 0,
            sort_by: None,
            sort_desc: false,
        }
    }
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read server meta; both camelCase and snake_case keys are accepted and
    /// missing counters keep their current value.
    pub fn fill(&mut self, meta: &Value) -> &mut Self {
        if let Some(per_page) = page_number(meta, &["per_page", "perPage"]) {
            self.set_per_page(per_page);
        }
        if let Some(page) = page_number(meta, &["current_page", "currentPage", "page"]) {
            self.set_current_page(page);
        }
        if let Some(last) = page_number(meta, &["last_page", "lastPage"]) {
            self.last_page = last;
        }
        self.total = first_integer(meta, &["total"]);
        self.from = first_integer(meta, &["from"]);
        self.to = first_integer(meta, &["to"]);
        self
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Zero falls back to the default page size
    pub fn set_per_page(&mut self, per_page: u32) -> &mut Self {
        self.per_page = if per_page == 0 { DEFAULT_PER_PAGE } else { per_page };
        self
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn set_current_page(&mut self, page: u32) -> &mut Self {
        self.current_page = page.max(1);
        self
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> u64 {
        self.to
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    /// Field names are stored lowercased; an empty name clears the sort
    pub fn set_sort_by(&mut self, field: &str) -> &mut Self {
        self.sort_by = if field.is_empty() {
            None
        } else {
            Some(field.to_lowercase())
        };
        self
    }

    pub fn sort_desc(&self) -> bool {
        self.sort_desc
    }

    pub fn set_sort_desc(&mut self, descending: bool) -> &mut Self {
        self.sort_desc = descending;
        self
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Paging parameters as the server expects them
    pub fn to_server(&self) -> Value {
        json!({
            "page": self.current_page,
            "per_page": self.per_page,
        })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Renders the total, or nothing while the total is unknown
impl fmt::Display for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total < 1 {
            return Ok(());
        }
        write!(f, "{}", self.total)
    }
}

fn positive(meta: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| meta.get(*key))
        .map(to_safe_integer)
        .find(|value| *value > 0)
}

/// First positive value under `keys` that fits a page counter; larger values count as absent
pub(crate) fn page_number(meta: &Value, keys: &[&str]) -> Option<u32> {
    positive(meta, keys).and_then(|value| u32::try_from(value).ok())
}

fn first_integer(meta: &Value, keys: &[&str]) -> u64 {
    positive(meta, keys)
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(0)
}
