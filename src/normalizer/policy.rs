//! Policy over normalized responses: unwrap, retry classification, user
//! messaging and batch merging.

use serde_json::Value;
use thiserror::Error;

use super::response::{ErrorInfo, NormalizedResponse, ResponseMetadata, ResponseSource};
use crate::context::RequestContext;

pub const BATCH_ERROR: &str = "BATCH_ERROR";

const GENERIC_FAILURE: &str = "Operation failed";
const GENERIC_USER_MESSAGE: &str = "An unexpected error occurred. Please try again.";

const RETRIABLE_CODES: &[&str] = &[
    "429",
    "502",
    "503",
    "504",
    "TIMEOUT",
    "NETWORK_ERROR",
    "THROTTLED",
    "THROTTLING",
    "TOO_MANY_REQUESTS",
    "SERVICE_UNAVAILABLE",
    "GATEWAY_TIMEOUT",
];

const RETRIABLE_MESSAGE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "throttl",
    "rate limit",
    "too many requests",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizerError {
    /// Attempted to unwrap a failed response.
    #[error("{message}")]
    Failed {
        message: String,
        code: Option<String>,
    },
}

impl NormalizerError {
    pub fn code(&self) -> Option<&str> {
        match self {
            NormalizerError::Failed { code, .. } => code.as_deref(),
        }
    }
}

/// Unwrap the data of a successful response.
///
/// A successful response without data yields `Ok(None)`.
pub fn extract_data<T>(response: NormalizedResponse<T>) -> Result<Option<T>, NormalizerError> {
    if response.success {
        return Ok(response.data);
    }
    let (message, code) = match response.error {
        Some(ErrorInfo { message, code, .. }) if !message.is_empty() => (message, code),
        Some(ErrorInfo { code, .. }) => (GENERIC_FAILURE.to_string(), code),
        None => (GENERIC_FAILURE.to_string(), None),
    };
    Err(NormalizerError::Failed { message, code })
}

fn strip_http_prefix(code: &str) -> &str {
    code.strip_prefix("HTTP_").unwrap_or(code)
}

/// Whether retrying the call that produced `response` is worthwhile.
pub fn is_retriable_error<T>(response: &NormalizedResponse<T>) -> bool {
    if response.success {
        return false;
    }
    let Some(error) = &response.error else {
        return false;
    };

    if let Some(code) = error.code.as_deref() {
        if RETRIABLE_CODES.contains(&strip_http_prefix(code)) {
            return true;
        }
    }

    let message = error.message.to_lowercase();
    RETRIABLE_MESSAGE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// A sentence suitable for showing to an end user.
pub fn get_user_friendly_error<T>(response: &NormalizedResponse<T>) -> String {
    let Some(error) = &response.error else {
        return GENERIC_USER_MESSAGE.to_string();
    };

    let preset = match error.code.as_deref().map(strip_http_prefix) {
        Some("400") => Some("The request was invalid. Please check your input and try again."),
        Some("401") => Some("Your session has expired. Please sign in again."),
        Some("403") => Some("You do not have permission to perform this action."),
        Some("404") => Some("The requested resource was not found."),
        Some("429") => Some("Too many requests. Please wait a moment and try again."),
        Some("500") => Some("A server error occurred. Please try again later."),
        Some("NETWORK_ERROR") => Some("Unable to connect. Please check your internet connection."),
        Some("TIMEOUT") => Some("The request timed out. Please try again."),
        _ => None,
    };

    match preset {
        Some(sentence) => sentence.to_string(),
        None if !error.message.is_empty() => error.message.clone(),
        None => GENERIC_USER_MESSAGE.to_string(),
    }
}

/// Fold many responses into one.
///
/// `data` holds the data of successful entries in order. A success without
/// data contributes nothing, so positions in `data` only line up with the
/// successes that carried a payload. Any failure turns the whole result
/// into a `BATCH_ERROR` whose details hold one entry per failed response.
pub fn merge_responses<T>(
    responses: Vec<NormalizedResponse<T>>,
    ctx: &RequestContext,
) -> NormalizedResponse<Vec<T>> {
    let source = responses
        .first()
        .and_then(|r| r.metadata.as_ref())
        .map(|m| m.source.clone())
        .unwrap_or_else(|| ResponseSource::Other("batch".to_string()));

    let mut data = Vec::new();
    let mut failed = 0usize;
    let mut errors = Vec::new();

    for response in responses {
        if response.success {
            data.extend(response.data);
            continue;
        }
        failed += 1;
        let error = response.error.unwrap_or_else(|| ErrorInfo::new(GENERIC_FAILURE));
        errors.push(serde_json::to_value(error).unwrap_or(Value::Null));
    }

    let metadata = ResponseMetadata::new(source, ctx);
    if failed == 0 {
        return NormalizedResponse::ok(Some(data)).with_metadata(metadata);
    }

    NormalizedResponse::failure(
        ErrorInfo::new(format!("{failed} operations failed"))
            .with_code(BATCH_ERROR)
            .with_details(Value::Array(errors)),
    )
    .with_data(Some(data))
    .with_metadata(metadata)
}
