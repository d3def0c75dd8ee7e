//! Pagination module
//!
//! Infers how an unknown API hands out successive pages and decides, from each
//! response, where the next request should point:
//! - `detector`: ordered heuristic rules classifying the strategy
//! - `continuation`: the next-position decision for each strategy
//! - `extract`: locating the record array and dotted field paths in JSON

mod continuation;
mod detector;
mod extract;

pub use continuation::{next_page, DEFAULT_PAGE_SIZE};
pub use detector::{default_rules, detect, response_hints, DetectionRule, Detector, RuleMatch};
pub use extract::{extract_data_array, value_at_path, DATA_WRAPPER_KEYS};

use crate::url::UrlPaginationParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How an API hands out successive pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// A single page; no second request is ever made
    #[default]
    None,

    /// Page numbers (`?page=2`)
    PageBased,

    /// Offset / limit windows (`?offset=40&limit=20`)
    OffsetBased,

    /// Opaque continuation tokens or "next" links
    CursorBased,
}

impl PaginationStrategy {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PageBased => "page_based",
            Self::OffsetBased => "offset_based",
            Self::CursorBased => "cursor_based",
        }
    }

    /// Parses a stored strategy; accepts both lower and upper case spellings
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "page_based" => Some(Self::PageBased),
            "offset_based" => Some(Self::OffsetBased),
            "cursor_based" => Some(Self::CursorBased),
            _ => None,
        }
    }
}

impl fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Auxiliary response fields used only to decide termination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more_value: Option<Value>,
}

/// Strategy-specific hints discovered by detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationInfo {
    /// Dotted path of the response field holding the next cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_field: Option<String>,

    /// Cursor value seen at detection time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_value: Option<Value>,

    /// Dotted path of a page indicator inside a metadata wrapper
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_field: Option<String>,

    /// Dotted path of a "next" link or token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_url_field: Option<String>,

    #[serde(flatten)]
    pub url_params: UrlPaginationParams,

    #[serde(flatten)]
    pub hints: ResponseHints,
}

impl PaginationInfo {
    /// Fills field paths and URL parameters this info lacks from `previous`
    ///
    /// Detection runs on every response; a later page that omits a field
    /// must not make the engine forget where the cursor lives.
    pub fn merge_missing(&mut self, previous: &PaginationInfo) {
        if self.cursor_field.is_none() {
            self.cursor_field.clone_from(&previous.cursor_field);
        }
        if self.page_field.is_none() {
            self.page_field.clone_from(&previous.page_field);
        }
        if self.next_url_field.is_none() {
            self.next_url_field.clone_from(&previous.next_url_field);
        }
        self.url_params.merge_missing(&previous.url_params);
    }
}

/// The in-memory pagination position of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    /// Page number for page-based APIs; the fetched-page ordinal otherwise
    pub page: u64,
    pub offset: u64,
    pub cursor: Option<String>,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            offset: 0,
            cursor: None,
        }
    }
}

/// The change a continuation decision asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageDelta {
    Page(u64),
    Offset(u64),
    Cursor(String),
    /// Keep the current cursor; some APIs echo the same token every page
    Unchanged,
}

impl PaginationState {
    /// Applies a delta; the page counter advances on every step
    pub fn apply(&mut self, delta: &PageDelta) {
        match delta {
            PageDelta::Page(page) => self.page = *page,
            PageDelta::Offset(offset) => {
                self.offset = *offset;
                self.page += 1;
            }
            PageDelta::Cursor(cursor) => {
                self.cursor = Some(cursor.clone());
                self.page += 1;
            }
            PageDelta::Unchanged => self.page += 1,
        }
    }
}
