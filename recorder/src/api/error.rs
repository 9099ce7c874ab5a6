use hyper::{Body, StatusCode};
use serde_json::json;

use crate::auth::AuthError;
use crate::service::ServiceError;

use super::macros::make_response;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("failed to parse http body: {0}")]
    ParseHttpBody(hyper::Error),
    #[error("failed to parse json request: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("one or more fields is empty")]
    EmptyFields,
    #[error("missing webhook authorization")]
    MissingAuthorization,
    #[error("invalid webhook signature: {0}")]
    WebhookAuth(#[from] AuthError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("internal server error: {0}")]
    InternalServer(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ParseHttpBody(_) | Self::ParseJson(_) | Self::EmptyFields => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingAuthorization | Self::WebhookAuth(_) => StatusCode::UNAUTHORIZED,
            Self::Service(err) => match err {
                ServiceError::UnknownMediaProfile(_) | ServiceError::ProfileMismatch { .. } => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InternalServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiError> for hyper::Response<Body> {
    fn from(err: ApiError) -> Self {
        make_response!(
            err.status(),
            json!({ "message": err.to_string(), "success": false })
        )
    }
}
