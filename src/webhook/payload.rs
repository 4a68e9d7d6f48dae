//! Request body decoding and typed access to JSON payload fields.

use serde_json::Value;

use crate::error::{EventcError, Result};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const FORM_PAYLOAD_FIELD: &str = "payload";

/// Decodes a webhook body: JSON as is, or a form whose `payload` field holds
/// the JSON document (Travis CI, GitHub form delivery).
pub fn parse_payload(content_type: &str, body: &[u8]) -> Result<Value> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let json = match media_type.as_str() {
        JSON => serde_json::from_slice(body),
        FORM => {
            let payload = url::form_urlencoded::parse(body)
                .find(|(name, _)| name == FORM_PAYLOAD_FIELD)
                .map(|(_, value)| value.into_owned())
                .ok_or_else(|| EventcError::MalformedInput("no payload in form".to_string()))?;
            serde_json::from_str(&payload)
        }
        other => {
            return Err(EventcError::MalformedInput(format!(
                "unsupported content type '{}'",
                other
            )));
        }
    };

    let value: Value =
        json.map_err(|e| EventcError::MalformedInput(format!("invalid JSON payload: {}", e)))?;
    if !value.is_object() {
        return Err(EventcError::MalformedInput(
            "payload is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Field accessors that report which field was missing or mistyped.
pub trait PayloadExt {
    fn field(&self, name: &str) -> Option<&Value>;

    fn req_str(&self, name: &str) -> Result<&str> {
        match self.field(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(EventcError::wrong_type(name)),
            None => Err(EventcError::missing_field(name)),
        }
    }

    /// `None` for missing, null and non-string values.
    fn opt_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    fn req_u64(&self, name: &str) -> Result<u64> {
        match self.field(name) {
            Some(value) => value.as_u64().ok_or_else(|| EventcError::wrong_type(name)),
            None => Err(EventcError::missing_field(name)),
        }
    }

    fn opt_u64(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(Value::as_u64)
    }

    /// Missing or null flags read as `false`.
    fn flag(&self, name: &str) -> bool {
        self.field(name).and_then(Value::as_bool).unwrap_or(false)
    }

    fn req_object(&self, name: &str) -> Result<&Value> {
        match self.field(name) {
            Some(value) if value.is_object() => Ok(value),
            Some(_) => Err(EventcError::wrong_type(name)),
            None => Err(EventcError::missing_field(name)),
        }
    }

    /// Missing arrays read as empty.
    fn array(&self, name: &str) -> &[Value] {
        self.field(name)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// String elements of an array field; other elements are skipped.
    fn strings(&self, name: &str) -> Vec<String> {
        self.array(name)
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    }
}

impl PayloadExt for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name).filter(|value| !value.is_null())
    }
}
