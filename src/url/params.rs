use crate::url::{matches_any, CURSOR_PARAMS, LIMIT_PARAMS, OFFSET_PARAMS, PAGE_PARAMS};
use serde::{Deserialize, Serialize};
use url::Url;

/// Pagination parameters found in a URL's query string
///
/// Names are recorded exactly as they appear in the URL so a rewritten URL
/// keeps the API's spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPaginationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_param_value: Option<String>,
}

impl UrlPaginationParams {
    /// Page size announced by the URL's limit parameter, if numeric
    pub fn limit(&self) -> Option<u64> {
        self.limit_value.as_deref().and_then(|v| v.parse().ok())
    }

    /// Fills unset fields from `other`
    pub fn merge_missing(&mut self, other: &UrlPaginationParams) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.page_param, &other.page_param);
        fill(&mut self.page_value, &other.page_value);
        fill(&mut self.offset_param, &other.offset_param);
        fill(&mut self.offset_value, &other.offset_value);
        fill(&mut self.limit_param, &other.limit_param);
        fill(&mut self.limit_value, &other.limit_value);
        fill(&mut self.cursor_param, &other.cursor_param);
        fill(&mut self.cursor_param_value, &other.cursor_param_value);
    }
}

/// Extracts pagination-related parameters from a URL
///
/// Unparseable URLs simply yield no parameters; this never fails.
///
/// # Example
///
/// ```
/// use api_harvest::url::extract_pagination_params;
///
/// let params = extract_pagination_params("https://api.example.com/items?Page=3&per_page=50");
/// assert_eq!(params.page_param.as_deref(), Some("Page"));
/// assert_eq!(params.limit(), Some(50));
/// ```
pub fn extract_pagination_params(url: &str) -> UrlPaginationParams {
    let mut params = UrlPaginationParams::default();

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return params,
    };

    for (name, value) in parsed.query_pairs() {
        let name = name.into_owned();
        let value = Some(value.into_owned());

        if matches_any(&name, PAGE_PARAMS) {
            params.page_param = Some(name);
            params.page_value = value;
        } else if matches_any(&name, OFFSET_PARAMS) {
            params.offset_param = Some(name);
            params.offset_value = value;
        } else if matches_any(&name, LIMIT_PARAMS) {
            params.limit_param = Some(name);
            params.limit_value = value;
        } else if matches_any(&name, CURSOR_PARAMS) {
            params.cursor_param = Some(name);
            params.cursor_param_value = value;
        }
    }

    params
}
