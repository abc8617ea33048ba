use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::api::models::{ChatMessageView, ChatSendRequest, ConversationView};
use crate::api::CallerId;
use crate::auction_engine::engine::{with_deadline, WALLET_DEADLINE};
use crate::db::ChatRepository;
use crate::error::AppError;
use crate::hub::{chat_message_payload, is_room_member, TYPE_CHAT_MESSAGE};
use crate::server::ServerState;

/// 대화방 목록 조회 핸들러
pub async fn get_conversations(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
) -> Result<Json<Vec<ConversationView>>, AppError> {
    let convos = ChatRepository::new(state.pool.clone()).conversations(caller).await?;

    Ok(Json(convos.into_iter().map(ConversationView::from).collect()))
}

/// 방 메시지 조회 핸들러 (최근 50건, 오래된 순)
pub async fn get_room_messages(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<ChatMessageView>>, AppError> {
    // 호출자는 방의 두 참여자 중 하나여야 한다
    if !is_room_member(&room_id, caller) {
        return Err(AppError::Forbidden("이 대화방에 접근할 수 없습니다".to_string()));
    }

    let msgs = ChatRepository::new(state.pool.clone()).room_messages(&room_id).await?;

    Ok(Json(msgs.into_iter().map(ChatMessageView::from).collect()))
}

/// 방 메시지 전송 핸들러 (REST)
///
/// 메시지를 저장한 뒤 같은 방의 WebSocket 클라이언트 전체에
/// chat_message 이벤트를 브로드캐스트한다.
pub async fn post_room_message(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Path(room_id): Path<String>,
    Json(payload): Json<ChatSendRequest>,
) -> Result<(StatusCode, Json<ChatMessageView>), AppError> {
    if !is_room_member(&room_id, caller) {
        return Err(AppError::Forbidden("이 대화방에 접근할 수 없습니다".to_string()));
    }
    if payload.body.is_none() && payload.image_url.is_none() {
        return Err(AppError::InvalidInput(
            "body 또는 image_url 중 하나는 필요합니다".to_string(),
        ));
    }

    let repo = ChatRepository::new(state.pool.clone());

    let sender_name = repo
        .sender_name(caller)
        .await?
        .ok_or_else(|| AppError::NotFound("사용자를 찾을 수 없습니다".to_string()))?;

    let (message_id, created_at) = with_deadline(WALLET_DEADLINE, async {
        repo.insert_message(&room_id, caller, payload.body.as_deref(), payload.image_url.as_deref())
            .await
            .map_err(AppError::from)
    })
    .await?;

    let event = chat_message_payload(
        message_id,
        &room_id,
        caller,
        sender_name.clone(),
        payload.body.clone(),
        payload.image_url.clone(),
        created_at,
    );
    state.hub.broadcast_to_chat(&room_id, TYPE_CHAT_MESSAGE, &event).await;

    let view = ChatMessageView {
        id: message_id,
        room_id,
        sender_id: caller,
        sender_name,
        body: payload.body,
        image_url: payload.image_url,
        created_at: event.created_at.clone(),
    };

    Ok((StatusCode::CREATED, Json(view)))
}
