//! Decoded response and notification payloads.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Decrypted payload of a GET response or push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON.
    Json(Value),
    /// Raw decrypted text (non-JSON content type, or JSON that failed to parse).
    Text(String),
}

impl Payload {
    /// Decode decrypted text according to the response content type.
    ///
    /// JSON content types are parsed; parse failures fall back to
    /// [`Payload::Text`].
    pub fn decode(text: String, content_type: Option<&str>) -> Self {
        let is_json = content_type.is_some_and(|ct| ct.contains("json"));
        if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => return Payload::Json(value),
                Err(e) => {
                    tracing::debug!(error = %e, "payload is not valid JSON, keeping raw text");
                }
            }
        }
        Payload::Text(text)
    }

    /// JSON value, if the payload was parsed.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    /// Raw text, if the payload was not parsed.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// The top-level `value` field of a JSON object payload.
    ///
    /// Most device endpoints answer `{"id": "...", "value": ...}`.
    pub fn value(&self) -> Option<&Value> {
        self.as_json().and_then(|v| v.get("value"))
    }

    /// The top-level `id` string of a JSON object payload.
    pub fn id(&self) -> Option<&str> {
        self.as_json()
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
    }

    /// Deserialize a JSON payload into `T`.
    ///
    /// A text payload is deserialized as a JSON string.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match self {
            Payload::Json(value) => value.clone(),
            Payload::Text(text) => Value::String(text.clone()),
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_decode_json() {
        let payload = Payload::decode(
            r#"{"id":"/system/appliance/systemPressure","value":1.8}"#.to_string(),
            Some("application/json"),
        );
        assert_eq!(payload.value(), Some(&serde_json::json!(1.8)));
        assert_eq!(payload.id(), Some("/system/appliance/systemPressure"));
    }

    #[test]
    fn test_decode_json_charset_variant() {
        let payload = Payload::decode("[1,2]".to_string(), Some("application/json; charset=utf-8"));
        assert_eq!(payload.as_json(), Some(&serde_json::json!([1, 2])));
        assert_eq!(payload.value(), None);
    }

    #[test]
    fn test_decode_invalid_json_falls_back() {
        let payload = Payload::decode("not json".to_string(), Some("application/json"));
        assert_eq!(payload, Payload::Text("not json".to_string()));
        assert_eq!(payload.id(), None);
    }

    #[test]
    fn test_decode_plain_text() {
        let payload = Payload::decode("{\"a\":1}".to_string(), Some("text/plain"));
        assert_eq!(payload.as_text(), Some("{\"a\":1}"));

        let payload = Payload::decode("x".to_string(), None);
        assert_eq!(payload.as_text(), Some("x"));
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Reading {
            value: f64,
            unit: String,
        }

        let payload = Payload::decode(
            r#"{"value":21.5,"unit":"C"}"#.to_string(),
            Some("application/json"),
        );
        let reading: Reading = payload.deserialize().unwrap();
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.unit, "C");

        let text = Payload::Text("hello".to_string());
        let s: String = text.deserialize().unwrap();
        assert_eq!(s, "hello");
        assert!(text.deserialize::<f64>().is_err());
    }
}
