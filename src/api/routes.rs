use axum::{
    routing::{get, post},
    Router,
};

use crate::api::chat;
use crate::api::handlers::*;
use crate::api::websocket::websocket_handler;
use crate::server::ServerState;

/// API 라우터 생성
pub fn create_api_router() -> Router<ServerState> {
    Router::new()
        // 헬스체크
        .route("/health", get(health))

        // WebSocket
        .route("/ws", get(websocket_handler))

        // 경매 관련 API
        .route("/api/auctions/:id", get(get_auction))
        .route("/api/auctions/:id/bids", get(get_auction_bids))
        .route("/api/auctions/:id/bid", post(place_bid))
        .route("/api/auctions/:id/settle", post(approve_settlement))
        .route("/api/bids", get(list_my_bids))

        // 지갑 관련 API
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/deposit", post(deposit))
        .route("/api/wallet/withdraw", post(withdraw))

        // 채팅 관련 API
        .route("/api/chat/conversations", get(chat::get_conversations))
        .route(
            "/api/chat/rooms/:room_id/messages",
            get(chat::get_room_messages).post(chat::post_room_message),
        )
}
