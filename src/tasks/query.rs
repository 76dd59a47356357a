//! Filtered, sorted, paginated task listings.
//!
//! [`TaskListRequest`] is what callers send; [`TaskListRequest::normalize`] clamps it into
//! [`TaskListParams`], which every store honours with the same semantics:
//! owner filter, case-insensitive substring filters ANDed together, ordering by the sort
//! key with the task id as tiebreak, total counted before paging.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::TaskView;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Listing options as received from the caller; every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListRequest {
    pub page_number: Option<i64>,
    pub page_size: Option<i64>,
    pub filter_by_tag: Option<String>,
    pub filter_by_title: Option<String>,
    pub filter_by_description: Option<String>,
    pub sort_by: Option<String>,
    pub is_ascending: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Id,
    Title,
    TagCount,
}

impl SortKey {
    /// Unknown keys fall back to ordering by id.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "title" => SortKey::Title,
            "tagcount" | "tag-count" | "tag_count" | "tags" => SortKey::TagCount,
            _ => SortKey::Id,
        }
    }
}

/// Normalized listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListParams {
    pub page: i64,
    pub page_size: i64,
    pub tag: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sort: SortKey,
    pub ascending: bool,
}

impl Default for TaskListParams {
    fn default() -> Self {
        TaskListRequest::default().normalize()
    }
}

fn non_blank(filter: &Option<String>) -> Option<String> {
    filter
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

impl TaskListRequest {
    pub fn normalize(&self) -> TaskListParams {
        let page = match self.page_number {
            Some(page) if page >= 1 => page,
            _ => 1,
        };
        let page_size = match self.page_size {
            Some(size) if size <= 0 => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
            None => DEFAULT_PAGE_SIZE,
        };
        TaskListParams {
            page,
            page_size,
            tag: non_blank(&self.filter_by_tag),
            title: non_blank(&self.filter_by_title),
            description: non_blank(&self.filter_by_description),
            sort: self.sort_by.as_deref().map(SortKey::parse).unwrap_or_default(),
            ascending: self.is_ascending.unwrap_or(true),
        }
    }
}

impl TaskListParams {
    /// Number of rows skipped before the requested page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Paging metadata returned alongside a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub page_size: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageMeta {
    pub fn new(total_count: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if total_count <= 0 {
            0
        } else {
            (total_count + page_size - 1) / page_size
        };
        Self {
            current_page: page,
            total_pages,
            total_count,
            page_size,
            has_previous: page > 1,
            has_next: page < total_pages,
        }
    }
}

/// One page of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<TaskView>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl TaskListParams {
    /// Whether a task passes every supplied filter.
    pub fn matches(&self, task: &TaskView) -> bool {
        let tag_ok = self
            .tag
            .as_deref()
            .map_or(true, |needle| task.tags.iter().any(|t| contains_ci(t, needle)));
        let title_ok = self
            .title
            .as_deref()
            .map_or(true, |needle| contains_ci(&task.title, needle));
        let description_ok = self
            .description
            .as_deref()
            .map_or(true, |needle| contains_ci(&task.description, needle));
        tag_ok && title_ok && description_ok
    }

    /// Total order used for listings: sort key, then id, both in the requested direction.
    pub fn compare(&self, a: &TaskView, b: &TaskView) -> Ordering {
        let primary = match self.sort {
            SortKey::Id => Ordering::Equal,
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::TagCount => a.tags.len().cmp(&b.tags.len()),
        };
        let ordering = primary.then_with(|| a.id.cmp(&b.id));
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Applies filters, ordering and paging to an owner's tasks held in memory.
///
/// Returns the requested page and the total number of matching tasks.
pub fn select_page(tasks: Vec<TaskView>, params: &TaskListParams) -> (Vec<TaskView>, i64) {
    let mut matching: Vec<TaskView> = tasks.into_iter().filter(|t| params.matches(t)).collect();
    matching.sort_by(|a, b| params.compare(a, b));
    let total = matching.len() as i64;
    let page = matching
        .into_iter()
        .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(params.page_size).unwrap_or(0))
        .collect();
    (page, total)
}

/// Escapes `%`, `_` and `\` so user input is matched literally by `ILIKE`, and wraps it
/// for substring matching.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
