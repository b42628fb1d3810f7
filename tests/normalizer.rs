//! Response normalization across transports and policies.

use std::sync::Arc;

use serde_json::{json, Value};

use worker_resilience::circuit_breaker::{BreakerError, CircuitBreaker};
use worker_resilience::normalizer::{
    create_error_response, extract_data, get_user_friendly_error, is_retriable_error,
    merge_responses, normalize_appsync_response, normalize_lambda_response, Failure,
    NormalizedResponse, ResponseSource,
};
use worker_resilience::store::MemoryStore;
use worker_resilience::RequestContext;

mod common;

#[test]
fn test_merge_responses_batch_error() {
    let ctx = RequestContext::with_correlation_id("corr-merge");
    let inputs: Vec<NormalizedResponse> = serde_json::from_value(json!([
        {"success": true, "data": 1},
        {"success": false, "error": {"message": "e1"}},
        {"success": true, "data": 2}
    ]))
    .unwrap();

    let merged = merge_responses(inputs, &ctx);
    let mut value = serde_json::to_value(&merged).unwrap();
    let metadata = value.as_object_mut().unwrap().remove("metadata").unwrap();

    assert_eq!(
        value,
        json!({
            "success": false,
            "data": [1, 2],
            "error": {"code": "BATCH_ERROR", "message": "1 operations failed", "details": [{"message": "e1"}]}
        })
    );
    assert_eq!(metadata["correlationId"], "corr-merge");
}

#[test]
fn test_lambda_gateway_not_found() {
    let ctx = RequestContext::new();
    let resp = normalize_lambda_response(
        Some(json!({"statusCode": 404, "body": "{\"error\":\"not found\"}"})),
        &ctx,
    );

    let mut value = serde_json::to_value(&resp).unwrap();
    value.as_object_mut().unwrap().remove("metadata");
    assert_eq!(
        value,
        json!({"success": false, "error": {"message": "not found", "code": "HTTP_404"}})
    );
    assert!(!is_retriable_error(&resp));
    assert_eq!(get_user_friendly_error(&resp), "The requested resource was not found.");
}

#[test]
fn test_throttled_gateway_is_retriable() {
    let ctx = RequestContext::new();
    let resp = normalize_lambda_response(
        Some(json!({"statusCode": 429, "body": "{\"error\":{\"message\":\"slow down\"}}"})),
        &ctx,
    );
    assert!(is_retriable_error(&resp));
    assert_eq!(
        get_user_friendly_error(&resp),
        "Too many requests. Please wait a moment and try again."
    );
    assert_eq!(extract_data(resp).unwrap_err().to_string(), "slow down");
}

#[test]
fn test_appsync_round_trip_through_extract() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Order {
        id: String,
        total: u32,
    }

    let ctx = RequestContext::with_correlation_id("corr-gql");
    let resp = normalize_appsync_response(json!({"data": {"id": "o-1", "total": 30}}), &ctx);
    assert_eq!(resp.metadata.as_ref().unwrap().source, ResponseSource::AppSync);

    let data = extract_data(resp).unwrap().unwrap();
    let order: Order = serde_json::from_value(data).unwrap();
    assert_eq!(order, Order { id: "o-1".into(), total: 30 });
}

#[test]
fn test_appsync_partial_success_is_a_failure_with_data() {
    let ctx = RequestContext::new();
    let resp = normalize_appsync_response(
        json!({
            "data": {"a": 1},
            "errors": [{"message": "Request timed out", "extensions": {"code": "EXECUTION_TIMEOUT"}}]
        }),
        &ctx,
    );
    assert!(!resp.success);
    assert_eq!(resp.data, Some(json!({"a": 1})));
    assert!(is_retriable_error(&resp));
}

#[tokio::test]
async fn test_open_breaker_becomes_retriable_error_response() {
    let clock = common::manual_clock();
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let config = worker_resilience::config::CircuitBreakerConfig {
        failure_threshold: 1,
        ..common::breaker_config()
    };
    let breaker = CircuitBreaker::with_clock("inventory", config, store, clock.clone());

    let _ = breaker
        .execute(|| async { Err::<Value, _>(std::io::Error::other("refused")) })
        .await;
    let err: BreakerError<std::io::Error> = breaker
        .execute(|| async { Ok(Value::Null) })
        .await
        .unwrap_err();
    assert!(err.is_open());

    let ctx = RequestContext::with_correlation_id("corr-open");
    let resp: NormalizedResponse =
        create_error_response(Failure::coded("SERVICE_UNAVAILABLE", err), ResponseSource::LambdaUrl, &ctx);

    assert!(is_retriable_error(&resp));
    let error = resp.error.as_ref().unwrap();
    assert_eq!(error.message, "circuit breaker is OPEN for service 'inventory'");
    assert_eq!(error.details.as_ref().unwrap()["name"], "BreakerError");
    assert_eq!(resp.metadata.as_ref().unwrap().correlation_id, "corr-open");
}
