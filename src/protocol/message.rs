//! Outbound request encoding.
//!
//! Each request is an HTTP/1.1-style text with CR line separators, wrapped in
//! a message stanza:
//!
//! ```text
//! <message from="FROM" to="TO"><body>GET /uri HTTP/1.1&#13;
//! User-Agent: NefitEasy&#13;
//! &#13;
//! </body></message>
//! ```
//!
//! The device firmware splits header lines on the `&#13;\n` sequence, so the
//! body escaping below has to be reproduced byte for byte.

use std::fmt;

use super::stanza::extract_body;
use crate::error::Result;

/// User agent sent with every request.
pub const USER_AGENT: &str = "NefitEasy";

/// Entity the firmware expects in place of each CR.
pub const CR_ENTITY: &str = "&#13;";

/// Stand-in for CR while the rest of the body is escaped.
const CR_PLACEHOLDER: &str = "\u{0}CRLF\u{0}";

/// HTTP method of a tunneled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Read a resource.
    Get,
    /// Write a resource.
    Put,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Get => f.write_str("GET"),
            RequestMethod::Put => f.write_str("PUT"),
        }
    }
}

/// Build the HTTP text of a GET request (CR separated).
pub fn get_request_text(uri: &str) -> String {
    format!("GET {} HTTP/1.1\rUser-Agent: {}\r\r", uri, USER_AGENT)
}

/// Build the HTTP text of a PUT request carrying base64 ciphertext.
pub fn put_request_text(uri: &str, encrypted: &str) -> String {
    format!(
        "PUT {} HTTP/1.1\rContent-Type: application/json\rContent-Length: {}\rUser-Agent: {}\r\r{}",
        uri,
        encrypted.len(),
        USER_AGENT,
        encrypted
    )
}

/// Build a complete GET stanza.
///
/// # Example
///
/// ```
/// use nefit_client::protocol::build_get_message;
///
/// let msg = build_get_message("a@h", "b@h", "/x");
/// assert_eq!(
///     msg,
///     "<message from=\"a@h\" to=\"b@h\"><body>GET /x HTTP/1.1&#13;\nUser-Agent: NefitEasy&#13;\n&#13;\n</body></message>"
/// );
/// ```
pub fn build_get_message(from: &str, to: &str, uri: &str) -> String {
    wrap_stanza(from, to, &get_request_text(uri))
}

/// Build a complete PUT stanza.
pub fn build_put_message(from: &str, to: &str, uri: &str, encrypted: &str) -> String {
    wrap_stanza(from, to, &put_request_text(uri, encrypted))
}

fn wrap_stanza(from: &str, to: &str, body: &str) -> String {
    format!(
        r#"<message from="{}" to="{}"><body>{}</body></message>"#,
        escape_text(from),
        escape_text(to),
        escape_body(body)
    )
}

/// Escape an HTTP body for the stanza.
///
/// CR is swapped for a placeholder, the text is escaped, then the placeholder
/// becomes `&#13;` followed by a newline.
pub fn escape_body(body: &str) -> String {
    let marked = body.replace('\r', CR_PLACEHOLDER);
    let escaped = escape_text(&marked);
    escaped.replace(CR_PLACEHOLDER, &format!("{}\n", CR_ENTITY))
}

/// HTML text escaping over `&`, `'`, `<`, `>` and `"`.
///
/// The apostrophe is escaped as `&#39;` on purpose: the backend expects the
/// full five-character set, not just the four XML-significant ones.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
    out
}

/// A request ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Method, kept for logging.
    pub method: RequestMethod,
    /// Target URI.
    pub uri: String,
    /// Destination address.
    pub to: String,
    /// Complete stanza text.
    pub stanza: String,
}

impl OutboundMessage {
    /// Build a GET request.
    pub fn get(from: &str, to: &str, uri: &str) -> Self {
        Self {
            method: RequestMethod::Get,
            uri: uri.to_string(),
            to: to.to_string(),
            stanza: build_get_message(from, to, uri),
        }
    }

    /// Build a PUT request with an already encrypted payload.
    pub fn put(from: &str, to: &str, uri: &str, encrypted: &str) -> Self {
        Self {
            method: RequestMethod::Put,
            uri: uri.to_string(),
            to: to.to_string(),
            stanza: build_put_message(from, to, uri, encrypted),
        }
    }

    /// Body text as the transport carries it (entities decoded, CRLF lines).
    pub fn body_text(&self) -> Result<String> {
        extract_body(&self.stanza)
    }
}
