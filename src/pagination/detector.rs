//! Heuristic pagination detection
//!
//! Detection is an ordered list of independent rules. Each rule inspects the
//! sample response (and the URL parameters already found) and either claims
//! the response or passes; the first claim wins.

use crate::pagination::{PaginationInfo, PaginationStrategy, ResponseHints};
use crate::url::{extract_pagination_params, UrlPaginationParams};
use serde_json::{Map, Value};

/// Response field names that hold a continuation cursor
pub const CURSOR_FIELDS: &[&str] = &[
    "next_cursor",
    "cursor",
    "nextToken",
    "next_token",
    "continuation",
    "continuationToken",
    "after",
    "endCursor",
];

/// Keys that wrap pagination metadata
pub const META_WRAPPERS: &[&str] = &["pagination", "paging", "meta", "_pagination", "_meta"];

/// Page indicators inside a metadata wrapper
pub const PAGE_FIELDS: &[&str] = &[
    "page",
    "currentPage",
    "current_page",
    "pageNumber",
    "page_number",
    "totalPages",
    "total_pages",
];

/// Top-level fields holding a "next" link or token
pub const NEXT_FIELDS: &[&str] = &["next", "next_page", "nextPage"];

/// Fields announcing a total record count
pub const TOTAL_FIELDS: &[&str] = &[
    "total",
    "totalCount",
    "total_count",
    "count",
    "totalItems",
    "total_items",
];

/// Fields announcing whether more pages exist
pub const HAS_MORE_FIELDS: &[&str] = &["has_more", "hasMore"];

/// A rule's claim on a response
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub strategy: PaginationStrategy,
    pub info: PaginationInfo,
}

impl RuleMatch {
    fn new(strategy: PaginationStrategy, info: PaginationInfo) -> Self {
        Self { strategy, info }
    }
}

/// One pagination heuristic
pub trait DetectionRule: Send + Sync {
    /// Short name used in trace output
    fn name(&self) -> &'static str;

    /// Claims the response, or returns `None` to let later rules try
    fn apply(&self, url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch>;
}

/// Cursor field at the top level of the response
pub struct TopLevelCursor;

impl DetectionRule for TopLevelCursor {
    fn name(&self) -> &'static str {
        "top_level_cursor"
    }

    fn apply(&self, _url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch> {
        let map = response.as_object()?;
        let (field, value) = first_present(map, CURSOR_FIELDS)?;
        Some(RuleMatch::new(
            PaginationStrategy::CursorBased,
            PaginationInfo {
                cursor_field: Some(field.to_string()),
                cursor_value: Some(value.clone()),
                ..Default::default()
            },
        ))
    }
}

/// Cursor field inside a metadata wrapper such as `pagination` or `meta`
pub struct WrappedCursor;

impl DetectionRule for WrappedCursor {
    fn name(&self) -> &'static str {
        "wrapped_cursor"
    }

    fn apply(&self, _url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch> {
        let (wrapper, inner) = wrappers(response).find_map(|(wrapper, inner)| {
            first_present(inner, CURSOR_FIELDS).map(|found| (wrapper, found))
        })?;
        let (field, value) = inner;
        Some(RuleMatch::new(
            PaginationStrategy::CursorBased,
            PaginationInfo {
                cursor_field: Some(format!("{}.{}", wrapper, field)),
                cursor_value: Some(value.clone()),
                ..Default::default()
            },
        ))
    }
}

/// Page number indicator inside a metadata wrapper
pub struct WrappedPageIndicator;

impl DetectionRule for WrappedPageIndicator {
    fn name(&self) -> &'static str {
        "wrapped_page_indicator"
    }

    fn apply(&self, _url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch> {
        let (wrapper, field) = wrappers(response).find_map(|(wrapper, inner)| {
            first_present(inner, PAGE_FIELDS).map(|(field, _)| (wrapper, field))
        })?;
        Some(RuleMatch::new(
            PaginationStrategy::PageBased,
            PaginationInfo {
                page_field: Some(format!("{}.{}", wrapper, field)),
                ..Default::default()
            },
        ))
    }
}

/// Top-level `next` link or token
pub struct NextField;

impl DetectionRule for NextField {
    fn name(&self) -> &'static str {
        "next_field"
    }

    fn apply(&self, _url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch> {
        let map = response.as_object()?;
        let (field, value) = first_present(map, NEXT_FIELDS)?;
        if !is_truthy(value) {
            return None;
        }
        Some(RuleMatch::new(
            PaginationStrategy::CursorBased,
            PaginationInfo {
                next_url_field: Some(field.to_string()),
                ..Default::default()
            },
        ))
    }
}

/// Hypermedia `links.next`
pub struct LinksNext;

impl DetectionRule for LinksNext {
    fn name(&self) -> &'static str {
        "links_next"
    }

    fn apply(&self, _url_params: &UrlPaginationParams, response: &Value) -> Option<RuleMatch> {
        let links = response.get("links")?.as_object()?;
        links.get("next")?;
        Some(RuleMatch::new(
            PaginationStrategy::CursorBased,
            PaginationInfo {
                next_url_field: Some("links.next".to_string()),
                ..Default::default()
            },
        ))
    }
}

/// Falls back on the request URL's own query parameters
pub struct UrlParameters;

impl DetectionRule for UrlParameters {
    fn name(&self) -> &'static str {
        "url_parameters"
    }

    fn apply(&self, url_params: &UrlPaginationParams, _response: &Value) -> Option<RuleMatch> {
        let strategy = if url_params.cursor_param.is_some() {
            PaginationStrategy::CursorBased
        } else if url_params.page_param.is_some() {
            PaginationStrategy::PageBased
        } else if url_params.offset_param.is_some() {
            PaginationStrategy::OffsetBased
        } else {
            return None;
        };
        Some(RuleMatch::new(strategy, PaginationInfo::default()))
    }
}

static DEFAULT_RULES: [&dyn DetectionRule; 6] = [
    &TopLevelCursor,
    &WrappedCursor,
    &WrappedPageIndicator,
    &NextField,
    &LinksNext,
    &UrlParameters,
];

/// The built-in rules in priority order
pub fn default_rules() -> Vec<Box<dyn DetectionRule>> {
    vec![
        Box::new(TopLevelCursor),
        Box::new(WrappedCursor),
        Box::new(WrappedPageIndicator),
        Box::new(NextField),
        Box::new(LinksNext),
        Box::new(UrlParameters),
    ]
}

/// An ordered set of detection rules
pub struct Detector {
    rules: Vec<Box<dyn DetectionRule>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Detector {
    pub fn new(rules: Vec<Box<dyn DetectionRule>>) -> Self {
        Self { rules }
    }

    /// Runs the rules in order against a URL and its sample response
    pub fn detect(&self, url: &str, response: &Value) -> (PaginationStrategy, PaginationInfo) {
        run_rules(self.rules.iter().map(|rule| rule.as_ref()), url, response)
    }
}

/// Detects the pagination strategy of an API from one sample response
///
/// Never fails: a response no rule recognizes is `PaginationStrategy::None`.
/// URL parameters and response hints are recorded in the returned info
/// whichever rule matched.
///
/// # Arguments
///
/// * `url` - The request URL the sample was fetched from
/// * `response` - The decoded JSON body
///
/// # Returns
///
/// The detected strategy and the hints needed to continue it
pub fn detect(url: &str, response: &Value) -> (PaginationStrategy, PaginationInfo) {
    run_rules(DEFAULT_RULES.iter().copied(), url, response)
}

fn run_rules<'r>(
    rules: impl Iterator<Item = &'r (dyn DetectionRule + 'static)>,
    url: &str,
    response: &Value,
) -> (PaginationStrategy, PaginationInfo) {
    let url_params = extract_pagination_params(url);

    let (strategy, mut info) = rules
        .filter_map(|rule| {
            rule.apply(&url_params, response).map(|m| {
                tracing::trace!("Pagination rule '{}' matched", rule.name());
                (m.strategy, m.info)
            })
        })
        .next()
        .unwrap_or_default();

    info.url_params = url_params;
    info.hints = response_hints(response);
    (strategy, info)
}

/// Records total-count and has-more fields found at the response top level
pub fn response_hints(response: &Value) -> ResponseHints {
    let mut hints = ResponseHints::default();
    let Some(map) = response.as_object() else {
        return hints;
    };

    if let Some((field, value)) = first_present(map, TOTAL_FIELDS) {
        hints.total_field = Some(field.to_string());
        hints.total_value = Some(value.clone());
    }
    if let Some((field, value)) = first_present(map, HAS_MORE_FIELDS) {
        hints.has_more_field = Some(field.to_string());
        hints.has_more_value = Some(value.clone());
    }
    hints
}

/// JSON truthiness: null, false, zero and empty values are false
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn first_present<'a>(
    map: &'a Map<String, Value>,
    candidates: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    candidates
        .iter()
        .find_map(|name| map.get(*name).map(|value| (*name, value)))
}

fn wrappers(response: &Value) -> impl Iterator<Item = (&'static str, &Map<String, Value>)> {
    let map = response.as_object();
    META_WRAPPERS.iter().filter_map(move |wrapper| {
        map?.get(*wrapper)?
            .as_object()
            .map(|inner| (*wrapper, inner))
    })
}
