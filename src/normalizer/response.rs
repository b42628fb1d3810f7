//! The normalized response envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RequestContext;

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseSource {
    /// GraphQL gateway invocation.
    AppSync,
    /// Direct function URL invocation.
    LambdaUrl,
    Other(String),
}

impl ResponseSource {
    pub fn as_str(&self) -> &str {
        match self {
            ResponseSource::AppSync => "appsync",
            ResponseSource::LambdaUrl => "lambda-url",
            ResponseSource::Other(s) => s,
        }
    }
}

impl From<String> for ResponseSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "appsync" => ResponseSource::AppSync,
            "lambda-url" => ResponseSource::LambdaUrl,
            _ => ResponseSource::Other(s),
        }
    }
}

impl From<&str> for ResponseSource {
    fn from(s: &str) -> Self {
        ResponseSource::from(s.to_string())
    }
}

impl From<ResponseSource> for String {
    fn from(source: ResponseSource) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error part of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Read an error from a loosely shaped JSON value.
    ///
    /// Strings become the message; objects contribute `message`, `code`
    /// (string or number) and `details`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => ErrorInfo::new(message.clone()),
            Value::Object(fields) => ErrorInfo {
                message: fields
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
                code: fields.get("code").and_then(code_string),
                details: fields.get("details").filter(|d| !d.is_null()).cloned(),
            },
            other => ErrorInfo::new(other.to_string()),
        }
    }
}

/// Error codes arrive as strings or numbers depending on the producer.
pub(crate) fn code_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Tags stamped on every normalized response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub source: ResponseSource,
    pub correlation_id: String,
}

impl ResponseMetadata {
    pub fn new(source: ResponseSource, ctx: &RequestContext) -> Self {
        Self {
            source,
            correlation_id: ctx.correlation_id().to_string(),
        }
    }
}

/// Transport-agnostic success/error envelope.
///
/// `success` is true exactly when `error` is absent. A failed response may
/// still carry partial `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl<T> NormalizedResponse<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: None,
        }
    }

    /// Attach partial data to a failed response.
    pub fn with_data(mut self, data: Option<T>) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.code.as_deref())
    }
}

/// Split an object into a message and the remaining fields.
pub(crate) fn take_message(mut fields: Map<String, Value>) -> (Option<String>, Map<String, Value>) {
    let message = match fields.remove("message") {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            fields.insert("message".to_string(), other);
            None
        }
        None => None,
    };
    (message, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_round_trip() {
        assert_eq!(ResponseSource::from("appsync"), ResponseSource::AppSync);
        assert_eq!(ResponseSource::from("lambda-url"), ResponseSource::LambdaUrl);
        assert_eq!(
            ResponseSource::from("batch"),
            ResponseSource::Other("batch".into())
        );
        assert_eq!(serde_json::to_value(ResponseSource::LambdaUrl).unwrap(), json!("lambda-url"));
    }

    #[test]
    fn test_envelope_serialization_skips_absent_fields() {
        let resp: NormalizedResponse = NormalizedResponse::failure(ErrorInfo::new("nope").with_code("HTTP_404"));
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"success": false, "error": {"message": "nope", "code": "HTTP_404"}})
        );

        let ctx = RequestContext::with_correlation_id("req-1");
        let resp = NormalizedResponse::ok(Some(json!(1)))
            .with_metadata(ResponseMetadata::new(ResponseSource::AppSync, &ctx));
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"success": true, "data": 1, "metadata": {"source": "appsync", "correlationId": "req-1"}})
        );
    }

    #[test]
    fn test_error_info_from_value() {
        assert_eq!(ErrorInfo::from_value(&json!("boom")), ErrorInfo::new("boom"));
        assert_eq!(
            ErrorInfo::from_value(&json!({"message": "bad", "code": 429})),
            ErrorInfo::new("bad").with_code("429")
        );
        assert_eq!(ErrorInfo::from_value(&json!({})).message, "Unknown error");
    }
}
