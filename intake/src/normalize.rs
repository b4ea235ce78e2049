use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;
use tracing::instrument;

use crate::api::IntakeError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Flat key-value view of a submission, whatever transport encoding it used.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubmissionFields(HashMap<String, String>);

impl SubmissionFields {
    /// Merges the pre-parsed query parameters with the decoded body, body fields
    /// winning on conflicts.
    ///
    /// Static sites often post with `text/plain` to dodge CORS preflights, so an
    /// unknown content type is sniffed: a body starting with `{` is JSON, anything
    /// else is treated as form-encoded.
    #[instrument(skip_all, fields(content_type = content_type, len = body.len()))]
    pub fn from_request(
        query: HashMap<String, String>,
        content_type: &str,
        body: &Bytes,
    ) -> Result<SubmissionFields, IntakeError> {
        let mut fields = SubmissionFields(query);

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let body_fields = if body.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else if mime == FORM_CONTENT_TYPE {
            Self::decode_form(body)?
        } else if mime == JSON_CONTENT_TYPE {
            Self::decode_json(body)?
        } else if body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
            Self::decode_json(body)?
        } else {
            Self::decode_form(body)?
        };
        fields.0.extend(body_fields);

        tracing::debug!(fields = fields.0.len(), "normalized submission");
        if fields.0.is_empty() {
            return Err(IntakeError::EmptySubmission);
        }
        Ok(fields)
    }

    fn decode_form(body: &Bytes) -> Result<Vec<(String, String)>, IntakeError> {
        serde_urlencoded::from_bytes(body).map_err(|e| {
            tracing::debug!("failed to decode form body: {}", e);
            IntakeError::RequestDecodingError(String::from("invalid form encoding"))
        })
    }

    fn decode_json(body: &Bytes) -> Result<Vec<(String, String)>, IntakeError> {
        let object = match serde_json::from_slice::<Value>(body)? {
            Value::Object(object) => object,
            _ => {
                return Err(IntakeError::RequestDecodingError(String::from(
                    "expected a JSON object",
                )))
            }
        };

        let mut fields = Vec::with_capacity(object.len());
        for (key, value) in object {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(IntakeError::RequestDecodingError(format!(
                        "field {key} must be a string or a number"
                    )))
                }
            };
            fields.push((key, value));
        }
        Ok(fields)
    }

    /// The field value, if present and not blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubmissionFields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        SubmissionFields(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
