use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{sink::SinkExt, stream::StreamExt};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hub::{is_room_member, ConnectionMeta, Hub, SEND_BUFFER_SIZE};
use crate::server::ServerState;

/// WebSocket 접속 쿼리 파라미터
///
/// 세 값 모두 선택 사항입니다. user_id 없이 접속하면 익명 관전만
/// 가능하고, 채팅에는 user_id와 room_id가 모두 필요합니다.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub auction_id: Option<String>,
    pub room_id: Option<String>,
}

/// 클라이언트가 보낼 수 있는 프레임
///
/// type 필드로 구분되는 덕 타이핑 프레임입니다. 알 수 없는 타입이나
/// 깨진 JSON은 디코딩에 실패하고, 연결을 끊지 않고 그냥 버립니다.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat_send")]
    ChatSend {
        #[serde(default)]
        payload: ChatSendFrame,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatSendFrame {
    pub body: Option<String>,
    pub image_url: Option<String>,
}

/// WebSocket 연결 핸들러
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<ServerState>,
) -> Response {
    // 잘못된 uuid 파라미터는 무시하고 익명 연결로 취급한다
    let user_id = query.user_id.as_deref().and_then(|v| Uuid::parse_str(v).ok());

    // 채팅 방은 호출자가 방 참여자일 때만 구독을 허용한다
    let room_id = match (user_id, query.room_id) {
        (Some(uid), Some(room)) if is_room_member(&room, uid) => Some(room),
        _ => None,
    };

    let meta = ConnectionMeta {
        user_id,
        auction_id: query.auction_id.as_deref().and_then(|v| Uuid::parse_str(v).ok()),
        room_id,
    };
    ws.on_upgrade(move |socket| websocket_connection(socket, state.hub, meta))
}

/// WebSocket 연결 처리
///
/// 연결당 쓰기 펌프와 읽기 펌프를 하나씩 띄우고, 어느 쪽이든
/// 끝나면 연결을 정확히 한 번 해제한다.
async fn websocket_connection(socket: WebSocket, hub: Arc<Hub>, meta: ConnectionMeta) {
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(SEND_BUFFER_SIZE);

    let conn_id = hub.register(meta.clone(), tx).await;

    let mut write_task = tokio::spawn(write_pump(sender, rx));
    let mut read_task = tokio::spawn(read_pump(receiver, hub.clone(), meta));

    // 두 펌프 중 하나라도 끝나면 연결 종료
    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    hub.unregister(conn_id).await;
    debug!("WebSocket 연결 종료: conn={}", conn_id);
}

/// 송신 버퍼를 소켓으로 내보내는 쓰기 펌프. 버퍼가 닫히면 종료한다.
async fn write_pump(mut sender: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<String>) {
    while let Some(data) = rx.recv().await {
        if sender.send(Message::Text(data)).await.is_err() {
            break;
        }
    }
}

/// 소켓에서 프레임을 읽어 채팅 수신 경로로 넘기는 읽기 펌프
async fn read_pump(mut receiver: SplitStream<WebSocket>, hub: Arc<Hub>, meta: ConnectionMeta) {
    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        // 채팅은 인증된 사용자 + 방 지정 연결에서만 처리
        let (Some(user_id), Some(room_id)) = (meta.user_id, meta.room_id.as_deref()) else {
            continue;
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::ChatSend { payload }) => {
                hub.handle_chat_send(user_id, room_id, payload.body, payload.image_url).await;
            }
            // 알 수 없는 프레임은 무시
            Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_send_frame_decodes() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"chat_send","payload":{"body":"안녕하세요"}}"#).unwrap();
        let ClientFrame::ChatSend { payload } = frame;
        assert_eq!(payload.body.as_deref(), Some("안녕하세요"));
        assert!(payload.image_url.is_none());
    }

    #[test]
    fn test_image_only_frame_decodes() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"chat_send","payload":{"image_url":"/uploads/a.png"}}"#,
        )
        .unwrap();
        let ClientFrame::ChatSend { payload } = frame;
        assert!(payload.body.is_none());
        assert_eq!(payload.image_url.as_deref(), Some("/uploads/a.png"));
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"ping"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"foo":"bar"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn test_missing_payload_defaults_to_empty() {
        // payload가 없으면 빈 프레임으로 디코딩되고, 이후 본문/이미지
        // 부재 검사에서 버려진다
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"chat_send"}"#).unwrap();
        let ClientFrame::ChatSend { payload } = frame;
        assert!(payload.body.is_none() && payload.image_url.is_none());
    }
}
