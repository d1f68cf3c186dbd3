use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    /// 超出订阅套餐限制
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// 错误码与 HTTP 状态
    pub fn code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::AuthError(_) | AppError::JwtError(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_ERROR")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::LimitExceeded(_) => (StatusCode::PAYMENT_REQUIRED, "LIMIT_EXCEEDED"),
            AppError::ExternalApiError(_) | AppError::ReqwestError(_) => {
                (StatusCode::BAD_GATEWAY, "EXTERNAL_API_ERROR")
            }
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.code().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code) = self.code();
        let message = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                msg.clone()
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                msg.clone()
            }
            AppError::JwtError(err) => {
                log::warn!("Token error: {err}");
                "Invalid token".to_string()
            }
            AppError::NotFound(msg) => msg.clone(),
            AppError::Forbidden => {
                log::warn!("Forbidden access");
                "Forbidden".to_string()
            }
            AppError::Conflict(msg) => {
                log::info!("Conflict: {msg}");
                msg.clone()
            }
            AppError::LimitExceeded(msg) => {
                log::info!("Subscription limit exceeded: {msg}");
                msg.clone()
            }
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                msg.clone()
            }
            AppError::ReqwestError(err) => {
                log::error!("External request failed: {err}");
                "External service unavailable".to_string()
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::ValidationError("x".into()).code(),
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        );
        assert_eq!(
            AppError::LimitExceeded("x".into()).code(),
            (StatusCode::PAYMENT_REQUIRED, "LIMIT_EXCEEDED")
        );
        assert_eq!(
            AppError::Conflict("x".into()).code(),
            (StatusCode::CONFLICT, "CONFLICT")
        );
        assert_eq!(
            AppError::DatabaseError(sea_orm::DbErr::Custom("boom".into())).code(),
            (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
        );
        assert_eq!(
            AppError::InternalError("x".into()).code().1,
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_response_status() {
        let resp = AppError::NotFound("Raffle not found".into()).error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = AppError::Forbidden.error_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
