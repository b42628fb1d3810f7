//! Response normalization.
//!
//! Pure and synchronous. Raw transport results are classified once into
//! [`AppSyncResult`] or [`LambdaResult`], then turned into a
//! [`NormalizedResponse`] stamped with its source and correlation id.
//!
//! # Design Decisions
//! - A failed response is a value; only `extract_data` turns it into an error
//! - Partial data survives alongside an error
//! - Retry and user-messaging policy read only `error.code` and `error.message`

pub mod failure;
pub mod normalize;
pub mod policy;
pub mod response;
pub mod transport;

pub use failure::{create_error_response, Failure, UNKNOWN_ERROR};
pub use normalize::{
    normalize_appsync, normalize_appsync_response, normalize_lambda, normalize_lambda_response,
    INVALID_RESPONSE, NO_RESPONSE,
};
pub use policy::{
    extract_data, get_user_friendly_error, is_retriable_error, merge_responses, NormalizerError,
    BATCH_ERROR,
};
pub use response::{ErrorInfo, NormalizedResponse, ResponseMetadata, ResponseSource};
pub use transport::{AppSyncResult, GatewayStatus, LambdaResult};
