use crate::pagination::detector::{is_truthy, HAS_MORE_FIELDS, META_WRAPPERS};
use crate::pagination::{
    extract_data_array, value_at_path, PageDelta, PaginationInfo, PaginationState,
    PaginationStrategy,
};
use serde_json::Value;

/// Page size assumed for offset pagination when the URL announces none
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Fields announcing the total number of pages
const TOTAL_PAGES_FIELDS: &[&str] = &["totalPages", "total_pages", "pages"];

/// Decides where the next request should point, or that the crawl is done
///
/// # Arguments
///
/// * `strategy` - The strategy detected for the job
/// * `info` - Hints from the latest detection pass
/// * `state` - The position the response was fetched at
/// * `response` - The decoded response body
///
/// # Returns
///
/// `Some(delta)` to continue, `None` when pagination has ended
pub fn next_page(
    strategy: PaginationStrategy,
    info: &PaginationInfo,
    state: &PaginationState,
    response: &Value,
) -> Option<PageDelta> {
    match strategy {
        PaginationStrategy::None => None,
        PaginationStrategy::PageBased => next_page_number(state, response),
        PaginationStrategy::OffsetBased => next_offset(info, state, response),
        PaginationStrategy::CursorBased => next_cursor(info, response),
    }
}

fn next_page_number(state: &PaginationState, response: &Value) -> Option<PageDelta> {
    if let Some(total_pages) = total_pages(response) {
        if total_pages <= state.page {
            return None;
        }
    }

    if extract_data_array(response).is_empty() {
        return None;
    }

    Some(PageDelta::Page(state.page + 1))
}

fn next_offset(
    info: &PaginationInfo,
    state: &PaginationState,
    response: &Value,
) -> Option<PageDelta> {
    let received = extract_data_array(response).len() as u64;
    let page_size = info.url_params.limit().unwrap_or(DEFAULT_PAGE_SIZE);

    if received == 0 || received < page_size {
        return None;
    }

    Some(PageDelta::Offset(state.offset + received))
}

fn next_cursor(info: &PaginationInfo, response: &Value) -> Option<PageDelta> {
    // Cursor APIs always answer with an envelope object
    response.as_object()?;

    let resolved = [info.cursor_field.as_deref(), info.next_url_field.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|path| value_at_path(response, path).and_then(cursor_to_string));

    if let Some(cursor) = resolved {
        return Some(PageDelta::Cursor(cursor));
    }

    if !has_more(response) || extract_data_array(response).is_empty() {
        return None;
    }

    Some(PageDelta::Unchanged)
}

/// Stringifies a cursor; null, `false` and empty strings count as absent
fn cursor_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a has-more flag from the top level; absent means true
fn has_more(response: &Value) -> bool {
    HAS_MORE_FIELDS
        .iter()
        .find_map(|field| response.get(*field))
        .map(is_truthy)
        .unwrap_or(true)
}

fn total_pages(response: &Value) -> Option<u64> {
    let scopes = std::iter::once(Some(response))
        .chain(META_WRAPPERS[..3].iter().map(|w| response.get(*w)))
        .flatten();

    for scope in scopes {
        for field in TOTAL_PAGES_FIELDS {
            if let Some(value) = scope.get(*field).and_then(as_count) {
                return Some(value);
            }
        }
    }
    None
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
