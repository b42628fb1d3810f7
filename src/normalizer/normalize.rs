//! Transport adapters: raw results in, [`NormalizedResponse`] out.

use serde_json::Value;

use super::response::{code_string, ErrorInfo, NormalizedResponse, ResponseMetadata, ResponseSource};
use super::transport::{AppSyncResult, GatewayStatus, LambdaResult};
use crate::context::RequestContext;
use crate::observability::metrics;

pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
pub const NO_RESPONSE: &str = "NO_RESPONSE";

/// Normalize a raw GraphQL gateway result.
pub fn normalize_appsync_response(raw: Value, ctx: &RequestContext) -> NormalizedResponse {
    normalize_appsync(AppSyncResult::classify(raw), ctx)
}

pub fn normalize_appsync(result: AppSyncResult, ctx: &RequestContext) -> NormalizedResponse {
    let response = match result {
        AppSyncResult::Invalid(raw) => NormalizedResponse::failure(
            ErrorInfo::new("Invalid AppSync response")
                .with_code(INVALID_RESPONSE)
                .with_details(raw),
        ),
        AppSyncResult::Errors { errors, data } => {
            let first = errors.first().cloned().unwrap_or(Value::Null);
            let extensions = first.get("extensions").filter(|e| !e.is_null()).cloned();
            let error = ErrorInfo {
                message: first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("GraphQL error")
                    .to_string(),
                code: extensions
                    .as_ref()
                    .and_then(|ext| ext.get("code"))
                    .and_then(code_string),
                details: extensions,
            };
            tracing::debug!(
                correlation_id = ctx.correlation_id(),
                error_count = errors.len(),
                "AppSync response carried errors"
            );
            NormalizedResponse::failure(error).with_data(data)
        }
        AppSyncResult::Data(data) => NormalizedResponse::ok(Some(data)),
    };
    stamp(response, ResponseSource::AppSync, ctx)
}

/// Normalize a raw direct-invocation result. `None` means nothing came back.
pub fn normalize_lambda_response(raw: Option<Value>, ctx: &RequestContext) -> NormalizedResponse {
    normalize_lambda(LambdaResult::classify(raw), ctx)
}

pub fn normalize_lambda(result: LambdaResult, ctx: &RequestContext) -> NormalizedResponse {
    let response = match result {
        LambdaResult::Missing => NormalizedResponse::failure(
            ErrorInfo::new("No response received from Lambda").with_code(NO_RESPONSE),
        ),
        LambdaResult::Gateway { status, body } => gateway_response(status, body),
        LambdaResult::Direct {
            success,
            data,
            error,
        } => {
            if success {
                NormalizedResponse::ok(data)
            } else {
                let error = error
                    .as_ref()
                    .map(ErrorInfo::from_value)
                    .unwrap_or_else(|| ErrorInfo::new("Request failed"));
                NormalizedResponse::failure(error).with_data(data)
            }
        }
        LambdaResult::Literal(data) => NormalizedResponse::ok(Some(data)),
    };
    stamp(response, ResponseSource::LambdaUrl, ctx)
}

fn gateway_response(status: GatewayStatus, body: Option<Value>) -> NormalizedResponse {
    let parsed = match body {
        Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Some(other) => other,
        None => Value::Null,
    };

    if status.is_success() {
        let data = (!parsed.is_null()).then_some(parsed);
        return NormalizedResponse::ok(data);
    }

    let message = match parsed.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {status}")),
        _ => format!("Request failed with status {status}"),
    };
    NormalizedResponse::failure(ErrorInfo::new(message).with_code(format!("HTTP_{status}")))
}

fn stamp(
    response: NormalizedResponse,
    source: ResponseSource,
    ctx: &RequestContext,
) -> NormalizedResponse {
    metrics::record_response(source.as_str(), response.success);
    response.with_metadata(ResponseMetadata::new(source, ctx))
}
