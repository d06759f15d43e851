//! Inbound response decoding.
//!
//! Response text arrives as an HTTP/1.1 status line, `Name: value` header
//! lines, a blank line and the (base64) body. Line separators may be `&#13;`
//! entities, bare `\n`, or CRLF; all are normalized before parsing.

use std::collections::HashMap;

use super::message::CR_ENTITY;
use crate::error::{NefitError, Result};

/// Parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Numeric status code.
    pub status_code: u16,
    /// Reason phrase (may be empty).
    pub status: String,
    /// Header map, keys case-preserved, last value wins.
    pub headers: HashMap<String, String>,
    /// Body text after the blank line.
    pub body: String,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
}

impl HttpResponse {
    /// True for status 200.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// True when the content type mentions JSON.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"))
    }

    /// Look up a header by its exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

/// Parse response text into an [`HttpResponse`].
///
/// # Example
///
/// ```
/// use nefit_client::protocol::parse_http_response;
///
/// let resp = parse_http_response("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"value\":1}").unwrap();
/// assert_eq!(resp.status_code, 200);
/// assert_eq!(resp.body, "{\"value\":1}");
/// ```
pub fn parse_http_response(text: &str) -> Result<HttpResponse> {
    let normalized = text.replace(CR_ENTITY, "\r").replace('\n', "\r\n");

    let (status_line, mut rest) = next_line(&normalized).ok_or_else(|| {
        NefitError::Protocol(format!("failed to read status line: {:?}", normalized))
    })?;

    let status_line = status_line.trim();
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    let code = parts
        .next()
        .ok_or_else(|| NefitError::Protocol(format!("invalid status line: {}", status_line)))?;
    let status_code = code
        .parse::<u16>()
        .map_err(|_| NefitError::Protocol(format!("invalid status code: {}", code)))?;
    let status = parts.next().unwrap_or("").to_string();

    let mut headers = HashMap::new();
    loop {
        let line = match next_line(rest) {
            Some((line, remainder)) => {
                rest = remainder;
                line
            }
            None => {
                let line = rest;
                rest = "";
                line
            }
        };

        let line = line.trim();
        if line.is_empty() {
            break;
        }

        // Lines without a colon are skipped.
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }

        if rest.is_empty() {
            break;
        }
    }

    let content_type = headers.get("Content-Type").cloned();

    Ok(HttpResponse {
        status_code,
        status,
        headers,
        body: rest.to_string(),
        content_type,
    })
}

/// Split off the next `\n`-terminated line.
fn next_line(s: &str) -> Option<(&str, &str)> {
    s.find('\n').map(|i| (&s[..i], &s[i + 1..]))
}
