//! Maps [`CausalityError`] to an HTTP status. A thin wrapper rather than
//! implementing `ResponseError` on the shared error type directly, so
//! `causality-errors` stays framework-agnostic for the non-HTTP
//! binaries.

use actix_web::{HttpResponse, ResponseError};
use causality_errors::CausalityError;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct GatewayError(pub CausalityError);

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CausalityError> for GatewayError {
    fn from(err: CausalityError) -> Self {
        GatewayError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match &self.0 {
            CausalityError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            CausalityError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CausalityError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            CausalityError::DuplicateDropped => StatusCode::ACCEPTED,
            CausalityError::DecodeFailed(_) => StatusCode::BAD_REQUEST,
            CausalityError::SerializationFailed(_) => StatusCode::BAD_REQUEST,
            CausalityError::BrokerUnavailable(_) | CausalityError::BrokerTimeout => {
                StatusCode::BAD_GATEWAY
            }
            CausalityError::Database(_) | CausalityError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        })
    }
}
