use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use star_core::StarError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Star(#[from] StarError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("认证失败: {0}")]
    Unauthorized(String),

    #[error("权限不足")]
    Forbidden,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Star(StarError::IllegalInput(_)) => (StatusCode::BAD_REQUEST, "ILLEGAL_INPUT"),
            ApiError::Star(StarError::Serialization(_)) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            ApiError::Star(StarError::NotAuthorized(_)) => (StatusCode::UNAUTHORIZED, "NOT_AUTHORIZED"),
            ApiError::Star(StarError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Star(StarError::ServiceUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Star(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "NOT_AUTHORIZED"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_error_status_mapping() {
        let cases = vec![
            (StarError::illegal_input("x"), StatusCode::BAD_REQUEST),
            (StarError::NotAuthorized("x".into()), StatusCode::UNAUTHORIZED),
            (StarError::not_found("x"), StatusCode::NOT_FOUND),
            (StarError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (StarError::Fatal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (StarError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_api_error_variants() {
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Unauthorized("no token".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::BadRequest("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::Forbidden.to_string(), "权限不足");
    }
}
