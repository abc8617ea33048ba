//! 공통 에러 타입
//!
//! 모든 핸들러와 엔진 트랜잭션은 AppError 하나로 실패를 보고하고,
//! HTTP 상태 코드는 에러 종류당 정확히 하나로 매핑됩니다.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::Serialize;
use thiserror::Error;

/// API 에러 응답 바디
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// 애플리케이션 전역 에러
#[derive(Debug, Error)]
pub enum AppError {
    /// 잘못된 입력 (400)
    #[error("{0}")]
    InvalidInput(String),

    /// 인증 실패 (401)
    #[error("인증이 필요합니다")]
    Unauthenticated,

    /// 권한 없음 (403)
    #[error("{0}")]
    Forbidden(String),

    /// 대상 없음 (404)
    #[error("{0}")]
    NotFound(String),

    /// 상태 충돌 — 종료된 경매, 낮은 입찰가, 중복 참조, 완료된 정산 (409)
    #[error("{0}")]
    Conflict(String),

    /// 지갑 잔액 부족 (402)
    #[error("지갑 잔액이 부족합니다")]
    InsufficientFunds,

    /// 요청 데드라인 초과 (408)
    #[error("요청 처리 시간이 초과되었습니다")]
    Timeout,

    /// 내부 오류 — 상세 내용은 로그에만 남기고 클라이언트에는 노출하지 않음 (500)
    #[error("내부 서버 오류가 발생했습니다")]
    Internal(String),
}

impl AppError {
    /// 에러 코드 문자열
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AppError::Timeout => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP 상태 코드 매핑 (종류당 1:1)
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            error!("내부 오류: {}", detail);
        }
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("대상을 찾을 수 없습니다".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation
                Some("23505") => AppError::Conflict("중복된 요청입니다".to_string()),
                // serialization_failure / lock_not_available: 재시도 가능한 충돌
                Some("40001") | Some("55P03") => {
                    AppError::Conflict("처리 중 충돌이 발생했습니다. 다시 시도해주세요".to_string())
                }
                _ => AppError::Internal(err.to_string()),
            },
            _ => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InsufficientFunds.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(AppError::Timeout.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(AppError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_internal_message_not_leaked() {
        // 내부 상세는 code/message에 노출되지 않아야 함
        let err = AppError::Internal("connection refused to 10.0.0.3".into());
        assert_eq!(err.code(), "INTERNAL");
        assert!(!err.to_string().contains("10.0.0.3"));
    }
}
