//! Building normalized failures from arbitrary errors.

use std::error::Error as StdError;

use serde_json::{json, Map, Value};

use super::response::{
    code_string, take_message, ErrorInfo, NormalizedResponse, ResponseMetadata, ResponseSource,
};
use crate::context::RequestContext;
use crate::observability::metrics;

pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

type BoxError = Box<dyn StdError + Send + Sync>;

/// Something that went wrong, in whatever form the caller caught it.
#[derive(Debug)]
pub enum Failure {
    /// A Rust error value. `name` is its type name.
    Error { name: String, error: BoxError },
    /// A Rust error value carrying an application error code.
    Coded {
        code: String,
        name: String,
        error: BoxError,
    },
    /// A loosely shaped JSON error, e.g. from a remote payload.
    Object(Value),
    /// No error information at all.
    Absent,
}

impl Failure {
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Failure::Error {
            name: short_type_name::<E>(),
            error: Box::new(error),
        }
    }

    pub fn coded<E>(code: impl Into<String>, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Failure::Coded {
            code: code.into(),
            name: short_type_name::<E>(),
            error: Box::new(error),
        }
    }
}

impl From<Option<Value>> for Failure {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Failure::Absent,
            Some(value) => Failure::Object(value),
        }
    }
}

fn short_type_name<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn error_details(name: &str, error: &(dyn StdError + 'static)) -> Value {
    let mut sources = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        sources.push(Value::String(source.to_string()));
        current = source.source();
    }
    json!({ "name": name, "sources": sources })
}

fn object_error(value: Value) -> ErrorInfo {
    match value {
        Value::Object(fields) => {
            let code = fields.get("code").and_then(code_string);
            let (message, mut rest) = take_message(fields);
            if code.is_some() {
                rest.remove("code");
            }
            let mut error = ErrorInfo::new(message.unwrap_or_else(|| "Unknown error".to_string()));
            error.code = code;
            if !rest.is_empty() {
                error.details = Some(Value::Object(rest));
            }
            error
        }
        Value::String(message) => ErrorInfo::new(message),
        other => {
            let mut details = Map::new();
            details.insert("value".to_string(), other.clone());
            ErrorInfo::new(other.to_string()).with_details(Value::Object(details))
        }
    }
}

/// Normalize a caught failure into a failed response stamped with `source`.
pub fn create_error_response<T>(
    failure: Failure,
    source: ResponseSource,
    ctx: &RequestContext,
) -> NormalizedResponse<T> {
    let error = match failure {
        Failure::Error { name, error } => {
            ErrorInfo::new(error.to_string()).with_details(error_details(&name, &*error))
        }
        Failure::Coded { code, name, error } => ErrorInfo::new(error.to_string())
            .with_code(code)
            .with_details(error_details(&name, &*error)),
        Failure::Object(value) => object_error(value),
        Failure::Absent => ErrorInfo::new("An unknown error occurred").with_code(UNKNOWN_ERROR),
    };

    tracing::debug!(
        correlation_id = ctx.correlation_id(),
        source = %source,
        message = %error.message,
        "Created error response"
    );
    metrics::record_response(source.as_str(), false);
    NormalizedResponse::failure(error).with_metadata(ResponseMetadata::new(source, ctx))
}
