//! Body extraction from raw message stanzas.
//!
//! Used for diagnostics and to recover the transport-level body text from an
//! encoded [`OutboundMessage`](super::OutboundMessage).

use quick_xml::events::Event;
use quick_xml::Reader;

use super::message::CR_ENTITY;
use crate::error::{NefitError, Result};

/// Extract the `<body>` text of a `<message>` stanza.
///
/// XML entities are decoded and any remaining `&#13;` sequence becomes a
/// literal CR. A stanza without a body yields an empty string.
///
/// # Example
///
/// ```
/// use nefit_client::protocol::extract_body;
///
/// let body = extract_body("<message to=\"b@h\"><body>HTTP/1.1 200 OK&#13;\n</body></message>").unwrap();
/// assert_eq!(body, "HTTP/1.1 200 OK\r\n");
/// ```
pub fn extract_body(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut root_seen = false;
    let mut in_body = false;
    let mut body = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if !root_seen {
                    root_seen = true;
                    check_root(e.local_name().as_ref())?;
                } else if e.local_name().as_ref() == b"body" {
                    in_body = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if !root_seen {
                    root_seen = true;
                    check_root(e.local_name().as_ref())?;
                }
            }
            Ok(Event::Text(t)) if in_body => {
                let text = t
                    .unescape()
                    .map_err(|e| NefitError::Protocol(format!("malformed stanza body: {}", e)))?;
                body.push_str(&text);
            }
            Ok(Event::CData(c)) if in_body => body.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::End(e)) if e.local_name().as_ref() == b"body" => in_body = false,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(NefitError::Protocol(format!(
                    "malformed stanza at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !root_seen {
        return Err(NefitError::Protocol("empty stanza".to_string()));
    }

    Ok(body.replace(CR_ENTITY, "\r"))
}

fn check_root(name: &[u8]) -> Result<()> {
    if name == b"message" {
        Ok(())
    } else {
        Err(NefitError::Protocol(format!(
            "expected <message> stanza, found <{}>",
            String::from_utf8_lossy(name)
        )))
    }
}
