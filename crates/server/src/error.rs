use axum::Json;
use axum::response::{IntoResponse, Response};
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;

/// HTTP-facing error taxonomy.
///
/// Every variant maps to a stable machine-readable `error` string in the
/// response body. Internal detail is traced, not returned; the notify
/// endpoint alone echoes its error message for operator convenience and
/// handles that case itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Too many requests. Please try again later.")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at: OffsetDateTime,
    },
    #[error("Internal server error")]
    Internal(#[from] sea_orm::DbErr),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            tracing::error!(
                name = "api.internal_error",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Request failed with internal error"
            );
        }
        let status = self.status_code();
        let mut response = match &self {
            ApiError::RateLimited {
                limit,
                remaining,
                reset_at,
            } => {
                let now = OffsetDateTime::now_utc();
                let retry_after = (*reset_at - now).whole_seconds().max(0) + 1;
                let body = Json(json!({
                    "error": self.to_string(),
                    "details": { "resetTime": reset_at
                        .format(&time::format_description::well_known::Rfc3339)
                        .unwrap_or_default() },
                }));
                let mut response = (status, body).into_response();
                let headers = response.headers_mut();
                headers.insert("Retry-After", retry_after.to_string().parse().unwrap());
                headers.insert("X-RateLimit-Limit", limit.to_string().parse().unwrap());
                headers.insert(
                    "X-RateLimit-Remaining",
                    remaining.to_string().parse().unwrap(),
                );
                response
            }
            _ => (status, Json(json!({ "error": self.to_string() }))).into_response(),
        };
        let headers = response.headers_mut();
        headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
        headers.insert("X-Frame-Options", "DENY".parse().unwrap());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn status_codes_match_variants() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn rate_limited_response_carries_retry_headers() {
        let error = ApiError::RateLimited {
            limit: 60,
            remaining: 0,
            reset_at: OffsetDateTime::now_utc() + Duration::seconds(30),
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
        assert_eq!(response.headers()["X-RateLimit-Limit"], "60");
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
    }

    #[test]
    fn responses_carry_security_headers() {
        let response = ApiError::BadRequest("bad".into()).into_response();
        assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
        assert_eq!(response.headers()["X-Frame-Options"], "DENY");
    }
}
