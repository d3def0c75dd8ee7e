//! Request descriptor module
//!
//! A crawl job is defined by a captured `curl` invocation. This module turns
//! that text into a structured [`RequestDescriptor`] the fetcher can replay.

mod parser;

pub use parser::parse_curl_command;

use serde::Serialize;
use std::collections::BTreeMap;

/// A structured HTTP request recovered from a `curl` command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    /// Upper-cased HTTP method
    pub method: String,

    /// Absolute URL, always carrying a scheme
    pub url: String,

    /// Header names exactly as given on the command line
    pub headers: BTreeMap<String, String>,

    /// Raw request body, if any body flag was present
    pub body: Option<String>,

    /// Cookies from `-b/--cookie`
    pub cookies: BTreeMap<String, String>,
}

impl RequestDescriptor {
    /// Renders the cookie map as a `Cookie` header value
    ///
    /// Returns None when no cookies were captured.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Returns true if a header with this name was given, ignoring case
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}
