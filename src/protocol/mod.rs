//! Protocol module - HTTP-over-message-stanza codec.
//!
//! This module implements the text protocol spoken with the device gateway:
//! - Request building and the CR-preserving body escape
//! - Response parsing (status line, headers, body)
//! - Body extraction from raw stanza XML

mod message;
mod response;
mod stanza;

pub use message::{
    build_get_message, build_put_message, escape_body, escape_text, get_request_text,
    put_request_text, OutboundMessage, RequestMethod, CR_ENTITY, USER_AGENT,
};
pub use response::{parse_http_response, HttpResponse};
pub use stanza::extract_body;
