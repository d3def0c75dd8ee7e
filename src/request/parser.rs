//! `curl` command line parser
//!
//! Only the flags that shape the request are understood: method, headers,
//! body, user agent, cookies and an explicit URL. Everything else is ignored.

use crate::request::RequestDescriptor;
use crate::ParseError;
use std::collections::BTreeMap;

/// Flags that take a value we do not use; the value is skipped so it can
/// never be mistaken for the URL.
const IGNORED_VALUE_FLAGS: &[&str] = &[
    "-o",
    "--output",
    "-u",
    "--user",
    "-e",
    "--referer",
    "-m",
    "--max-time",
    "--connect-timeout",
    "-x",
    "--proxy",
    "-w",
    "--write-out",
    "--retry",
    "-F",
    "--form",
    "--data-urlencode",
    "-T",
    "--upload-file",
    "-c",
    "--cookie-jar",
    "-r",
    "--range",
    "--cacert",
    "--cert",
    "--key",
    "--resolve",
];

/// Parses a `curl` invocation into a [`RequestDescriptor`]
///
/// # Rules
///
/// - Tokenizing follows shell quoting; unbalanced quotes are an error
/// - The first token must be `curl` (any case)
/// - A body flag without `-X` turns the method into POST
/// - The first bare token that looks like a URL becomes the URL
/// - A URL without a scheme gets `https://`
/// - Headers split on the first `:`, cookies on `;` and the first `=`;
///   entries without a separator are dropped
///
/// # Example
///
/// ```
/// use api_harvest::request::parse_curl_command;
///
/// let req = parse_curl_command("curl -d '{\"a\":1}' api.example.com/items").unwrap();
/// assert_eq!(req.method, "POST");
/// assert_eq!(req.url, "https://api.example.com/items");
/// ```
pub fn parse_curl_command(command: &str) -> Result<RequestDescriptor, ParseError> {
    let tokens = tokenize(command)?;

    let mut iter = tokens.into_iter();
    match iter.next() {
        Some(first) if first.eq_ignore_ascii_case("curl") => {}
        _ => return Err(ParseError::MissingKeyword),
    }

    let mut explicit_method: Option<String> = None;
    let mut url: Option<String> = None;
    let mut headers = BTreeMap::new();
    let mut body: Option<String> = None;
    let mut cookies = BTreeMap::new();

    while let Some(token) = iter.next() {
        match token.as_str() {
            "-X" | "--request" => {
                if let Some(value) = iter.next() {
                    explicit_method = Some(value.to_uppercase());
                }
            }
            "-H" | "--header" => {
                if let Some(value) = iter.next() {
                    if let Some((key, val)) = value.split_once(':') {
                        headers.insert(key.trim().to_string(), val.trim().to_string());
                    }
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" => {
                if let Some(value) = iter.next() {
                    body = Some(value);
                }
            }
            "--json" => {
                if let Some(value) = iter.next() {
                    body = Some(value);
                    headers.insert("Content-Type".to_string(), "application/json".to_string());
                }
            }
            "-A" | "--user-agent" => {
                if let Some(value) = iter.next() {
                    headers.insert("User-Agent".to_string(), value);
                }
            }
            "-b" | "--cookie" => {
                if let Some(value) = iter.next() {
                    parse_cookies(&value, &mut cookies);
                }
            }
            "--url" => {
                if let Some(value) = iter.next() {
                    url = Some(value);
                }
            }
            flag if IGNORED_VALUE_FLAGS.contains(&flag) => {
                iter.next();
            }
            flag if flag.starts_with('-') => {
                tracing::trace!("Ignoring unsupported curl flag {}", flag);
            }
            bare => {
                if url.is_none() && looks_like_url(bare) {
                    url = Some(bare.to_string());
                }
            }
        }
    }

    let url = normalize_request_url(url.ok_or(ParseError::MissingUrl)?)?;

    let method = match explicit_method {
        Some(method) => method,
        None if body.is_some() => "POST".to_string(),
        None => "GET".to_string(),
    };

    if reqwest::Method::from_bytes(method.as_bytes()).is_err() {
        return Err(ParseError::InvalidMethod(method));
    }

    Ok(RequestDescriptor {
        method,
        url,
        headers,
        body,
        cookies,
    })
}

/// Folds line continuations and splits the command with shell quoting rules
fn tokenize(command: &str) -> Result<Vec<String>, ParseError> {
    let folded = command
        .trim()
        .replace("\\\r\n", " ")
        .replace("\\\n", " ")
        .replace("^\r\n", " ")
        .replace("^\n", " ");

    shlex::split(&folded).ok_or(ParseError::MalformedQuoting)
}

fn parse_cookies(raw: &str, cookies: &mut BTreeMap<String, String>) {
    for pair in raw.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            cookies.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
}

fn looks_like_url(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://") || token.contains('.')
}

/// Adds the default scheme and checks that the result is a valid URL
fn normalize_request_url(raw: String) -> Result<String, ParseError> {
    let with_scheme = if has_scheme(&raw) {
        raw
    } else {
        format!("https://{}", raw)
    };

    match ::url::Url::parse(&with_scheme) {
        Ok(_) => Ok(with_scheme),
        Err(e) => Err(ParseError::InvalidUrl {
            url: with_scheme,
            reason: e.to_string(),
        }),
    }
}

/// True if a `scheme://` prefix appears before the path, query or fragment
fn has_scheme(raw: &str) -> bool {
    let authority_end = raw
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(raw.len());
    raw.find("://").map(|i| i < authority_end).unwrap_or(false)
}
