//! Raw transport results, classified once at the transport boundary.
//!
//! Each invocation path produces a few known payload shapes. `classify`
//! decides which one a raw JSON value is, so the normalizer works on a
//! closed enum instead of poking at fields.

use serde_json::Value;

/// Result of a GraphQL gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum AppSyncResult {
    /// Not a JSON object.
    Invalid(Value),
    /// A non-empty `errors` array, with any partial `data`.
    Errors {
        errors: Vec<Value>,
        data: Option<Value>,
    },
    /// Success payload.
    Data(Value),
}

impl AppSyncResult {
    pub fn classify(raw: Value) -> Self {
        let Value::Object(mut fields) = raw else {
            return AppSyncResult::Invalid(raw);
        };

        if let Some(Value::Array(errors)) = fields.get("errors") {
            if !errors.is_empty() {
                let errors = errors.clone();
                let data = fields.remove("data").filter(|d| !d.is_null());
                return AppSyncResult::Errors { errors, data };
            }
        }

        match fields.remove("data") {
            Some(data) => AppSyncResult::Data(data),
            None => AppSyncResult::Data(Value::Object(fields)),
        }
    }
}

/// Status of an HTTP-gateway shaped result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Code(u16),
    /// A `statusCode` that is not a usable integer, kept as text.
    Unrecognized(String),
}

impl GatewayStatus {
    /// Read a `statusCode` value, accepting integral floats and numeric strings.
    pub fn from_value(value: &Value) -> Self {
        let code = match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
            }
            _ => None,
        };
        match code.and_then(|c| u16::try_from(c).ok()) {
            Some(code) => GatewayStatus::Code(code),
            None => GatewayStatus::Unrecognized(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }

    /// Only a recognized 2xx code counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, GatewayStatus::Code(code) if (200..300).contains(code))
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Code(code) => write!(f, "{code}"),
            GatewayStatus::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

fn integral(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u16::MAX)).then_some(f as u64)
}

/// Result of a direct function invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum LambdaResult {
    /// Nothing came back.
    Missing,
    /// HTTP-gateway shape `{statusCode, body}`; `body` is usually a JSON string.
    Gateway {
        status: GatewayStatus,
        body: Option<Value>,
    },
    /// Already an envelope `{success, data?, error?}`.
    Direct {
        success: bool,
        data: Option<Value>,
        error: Option<Value>,
    },
    /// Any other payload, taken as the data itself.
    Literal(Value),
}

impl LambdaResult {
    pub fn classify(raw: Option<Value>) -> Self {
        let raw = match raw {
            None | Some(Value::Null) => return LambdaResult::Missing,
            Some(raw) => raw,
        };

        let Value::Object(fields) = &raw else {
            return LambdaResult::Literal(raw);
        };

        if let Some(status) = fields.get("statusCode") {
            return LambdaResult::Gateway {
                status: GatewayStatus::from_value(status),
                body: fields.get("body").cloned(),
            };
        }

        if let Some(success) = fields.get("success").and_then(Value::as_bool) {
            return LambdaResult::Direct {
                success,
                data: fields.get("data").filter(|d| !d.is_null()).cloned(),
                error: fields.get("error").filter(|e| !e.is_null()).cloned(),
            };
        }

        LambdaResult::Literal(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_appsync_classification() {
        assert_eq!(
            AppSyncResult::classify(json!("oops")),
            AppSyncResult::Invalid(json!("oops"))
        );
        assert_eq!(
            AppSyncResult::classify(json!({"data": {"a": 1}})),
            AppSyncResult::Data(json!({"a": 1}))
        );
        assert_eq!(
            AppSyncResult::classify(json!({"a": 1})),
            AppSyncResult::Data(json!({"a": 1}))
        );
        assert_eq!(
            AppSyncResult::classify(json!({"errors": [], "data": 2})),
            AppSyncResult::Data(json!(2))
        );
        assert_eq!(
            AppSyncResult::classify(json!({"errors": [{"message": "x"}], "data": {"partial": true}})),
            AppSyncResult::Errors {
                errors: vec![json!({"message": "x"})],
                data: Some(json!({"partial": true})),
            }
        );
    }

    #[test]
    fn test_lambda_classification() {
        assert_eq!(LambdaResult::classify(None), LambdaResult::Missing);
        assert_eq!(LambdaResult::classify(Some(Value::Null)), LambdaResult::Missing);
        assert_eq!(
            LambdaResult::classify(Some(json!({"statusCode": 200, "body": "{}"}))),
            LambdaResult::Gateway {
                status: GatewayStatus::Code(200),
                body: Some(json!("{}")),
            }
        );
        assert_eq!(
            LambdaResult::classify(Some(json!({"success": false, "error": "bad"}))),
            LambdaResult::Direct {
                success: false,
                data: None,
                error: Some(json!("bad")),
            }
        );
        assert_eq!(
            LambdaResult::classify(Some(json!({"id": 7}))),
            LambdaResult::Literal(json!({"id": 7}))
        );
        assert_eq!(
            LambdaResult::classify(Some(json!([1, 2]))),
            LambdaResult::Literal(json!([1, 2]))
        );
    }

    #[test]
    fn test_gateway_status_coercion() {
        assert_eq!(GatewayStatus::from_value(&json!("500")), GatewayStatus::Code(500));
        assert_eq!(GatewayStatus::from_value(&json!(503.0)), GatewayStatus::Code(503));
        assert_eq!(GatewayStatus::from_value(&json!(" 201 ")), GatewayStatus::Code(201));
        assert_eq!(
            GatewayStatus::from_value(&json!("teapot")),
            GatewayStatus::Unrecognized("teapot".into())
        );
        assert_eq!(
            GatewayStatus::from_value(&json!(200.5)),
            GatewayStatus::Unrecognized("200.5".into())
        );
        assert_eq!(
            GatewayStatus::from_value(&Value::Null),
            GatewayStatus::Unrecognized("null".into())
        );
        assert!(!GatewayStatus::Unrecognized("200".into()).is_success());
        assert!(GatewayStatus::Code(204).is_success());
    }

    #[test]
    fn test_any_status_code_key_means_gateway() {
        assert!(matches!(
            LambdaResult::classify(Some(json!({"statusCode": "500", "body": "{}"}))),
            LambdaResult::Gateway { status: GatewayStatus::Code(500), .. }
        ));
        assert!(matches!(
            LambdaResult::classify(Some(json!({"statusCode": null}))),
            LambdaResult::Gateway { status: GatewayStatus::Unrecognized(_), .. }
        ));
    }
}
