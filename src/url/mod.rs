//! URL handling module for api-harvest
//!
//! This module finds pagination parameters in a request URL's query string
//! and rewrites them as a crawl advances.

mod builder;
mod params;

pub use builder::build_url_with_pagination;
pub use params::{extract_pagination_params, UrlPaginationParams};

/// Query parameter names that carry a page number
pub const PAGE_PARAMS: &[&str] = &["page", "p", "pageNumber", "page_number"];

/// Query parameter names that carry an offset
pub const OFFSET_PARAMS: &[&str] = &["offset", "skip", "start"];

/// Query parameter names that carry a page size
pub const LIMIT_PARAMS: &[&str] = &["limit", "size", "per_page", "pageSize", "page_size", "count"];

/// Query parameter names that carry a cursor token
pub const CURSOR_PARAMS: &[&str] = &["cursor", "after", "next_token", "continuation", "token"];

/// Returns true if `name` matches one of `candidates`, ignoring ASCII case
pub(crate) fn matches_any(name: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Returns true if the value is an absolute http(s) URL rather than a token
pub fn is_absolute_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
