use crate::pagination::{PaginationState, PaginationStrategy};
use crate::url::{extract_pagination_params, is_absolute_http_url};
use url::Url;

/// Builds the request URL for the current pagination position
///
/// The active parameter for `strategy` is set to the state's value, keeping
/// every other query parameter in place. When the URL carries no parameter of
/// that kind the conventional name (`page`, `offset`, `cursor`) is appended.
/// A cursor that is itself an absolute URL (a hypermedia "next" link) is
/// returned as the URL to fetch.
///
/// # Arguments
///
/// * `base_url` - The URL from the request descriptor
/// * `strategy` - The job's pagination strategy
/// * `state` - The current pagination position
///
/// # Returns
///
/// * `Ok(String)` - The URL for this iteration
/// * `Err(url::ParseError)` - The base URL is not a valid URL
pub fn build_url_with_pagination(
    base_url: &str,
    strategy: PaginationStrategy,
    state: &PaginationState,
) -> Result<String, url::ParseError> {
    let params = extract_pagination_params(base_url);

    let (name, value) = match strategy {
        PaginationStrategy::None => return Ok(base_url.to_string()),
        PaginationStrategy::PageBased => (
            params.page_param.unwrap_or_else(|| "page".to_string()),
            state.page.to_string(),
        ),
        PaginationStrategy::OffsetBased => (
            params.offset_param.unwrap_or_else(|| "offset".to_string()),
            state.offset.to_string(),
        ),
        PaginationStrategy::CursorBased => match state.cursor.as_deref() {
            None => return Ok(base_url.to_string()),
            Some(cursor) if is_absolute_http_url(cursor) => {
                Url::parse(cursor)?;
                return Ok(cursor.to_string());
            }
            Some(cursor) => (
                params.cursor_param.unwrap_or_else(|| "cursor".to_string()),
                cursor.to_string(),
            ),
        },
    };

    let mut url = Url::parse(base_url)?;
    set_query_param(&mut url, &name, &value);
    Ok(url.to_string())
}

/// Sets `name=value`, replacing the first occurrence and dropping duplicates
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut replaced = false;

    for (k, v) in url.query_pairs() {
        if k == name {
            if !replaced {
                pairs.push((k.into_owned(), value.to_string()));
                replaced = true;
            }
        } else {
            pairs.push((k.into_owned(), v.into_owned()));
        }
    }

    if !replaced {
        pairs.push((name.to_string(), value.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
}
