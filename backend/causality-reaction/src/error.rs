//! Maps [`CausalityError`] to an HTTP status, mirroring
//! `causality-gateway::error`: the shared error taxonomy stays
//! framework-agnostic, and each HTTP binary wraps it at its own edge.

use actix_web::{HttpResponse, ResponseError};
use causality_errors::CausalityError;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct ReactionError(pub CausalityError);

impl fmt::Display for ReactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CausalityError> for ReactionError {
    fn from(err: CausalityError) -> Self {
        ReactionError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ResponseError for ReactionError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match &self.0 {
            CausalityError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            CausalityError::Unauthenticated => StatusCode::UNAUTHORIZED,
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
