pub mod chat;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod websocket;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub use routes::create_api_router;

/// 인증된 호출자 식별자
///
/// 토큰 발급/검증은 상류 인증 계층의 몫이고, 코어는 검증 완료된
/// 사용자 id를 X-User-Id 헤더로 전달받아 신뢰합니다. 요청 바디에서
/// 호출자를 다시 유도하지 않습니다.
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(CallerId)
            .ok_or(AppError::Unauthenticated)
    }
}
