//! WebSocket 연결 허브
//!
//! 프로세스 로컬 연결 레지스트리입니다. 세 개의 인덱스(사용자별,
//! 경매 방별, 채팅 방별)를 하나의 읽기-쓰기 잠금 아래 두고,
//! 인덱스 변경은 register/unregister 채널을 소비하는 단일 태스크만
//! 수행합니다. 팬아웃은 읽기 잠금으로 스냅샷을 뜬 뒤 논블로킹
//! 전송하며, 송신 버퍼가 가득 찬 연결은 조용히 건너뜁니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use sqlx::postgres::PgPool;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::auction_engine::engine::{with_deadline, WALLET_DEADLINE};
use crate::db::repository::ChatRepository;
use crate::error::AppError;

/// 서버가 내보내는 프레임 타입
pub const TYPE_BROADCAST_NEW_BID: &str = "broadcast_new_bid";
pub const TYPE_OUTBID_ALERT: &str = "outbid_alert";
pub const TYPE_CHAT_MESSAGE: &str = "chat_message";

/// 연결당 송신 버퍼 크기 (가득 차면 드롭)
pub const SEND_BUFFER_SIZE: usize = 256;
/// register/unregister 채널 크기
const LIFECYCLE_BUFFER_SIZE: usize = 256;

/// WebSocket 메시지 봉투: {"type": ..., "payload": ...}
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a T,
}

/// 채팅 메시지 브로드캐스트 페이로드
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessagePayload {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

/// 연결 메타데이터 (쿼리 파라미터에서 유래)
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    /// 인증된 사용자 id (없으면 익명 관전 연결)
    pub user_id: Option<Uuid>,
    /// 관전 중인 경매 방
    pub auction_id: Option<Uuid>,
    /// 참여 중인 채팅 방
    pub room_id: Option<String>,
}

/// 등록된 연결 하나
struct Connection {
    meta: ConnectionMeta,
    tx: mpsc::Sender<String>,
}

struct Registration {
    id: u64,
    conn: Connection,
}

/// 허브 인덱스. run 태스크만 변경하고 팬아웃은 읽기만 한다.
#[derive(Default)]
struct Indices {
    clients: HashMap<u64, Connection>,
    user_index: HashMap<Uuid, u64>,
    auction_rooms: HashMap<Uuid, Vec<u64>>,
    chat_rooms: HashMap<String, Vec<u64>>,
}

/// 연결 허브
pub struct Hub {
    indices: RwLock<Indices>,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<u64>,
    lifecycle_rx: Mutex<Option<(mpsc::Receiver<Registration>, mpsc::Receiver<u64>)>>,
    next_conn_id: AtomicU64,
    chat_repo: ChatRepository,
}

impl Hub {
    /// 새 허브 생성. `run`을 별도 태스크로 시작해야 동작한다.
    pub fn new(pool: PgPool) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(LIFECYCLE_BUFFER_SIZE);
        let (unregister_tx, unregister_rx) = mpsc::channel(LIFECYCLE_BUFFER_SIZE);
        Arc::new(Self {
            indices: RwLock::new(Indices::default()),
            register_tx,
            unregister_tx,
            lifecycle_rx: Mutex::new(Some((register_rx, unregister_rx))),
            next_conn_id: AtomicU64::new(1),
            chat_repo: ChatRepository::new(pool),
        })
    }

    /// 중앙 이벤트 루프. 인덱스를 변경하는 유일한 주체.
    pub async fn run(self: Arc<Self>) {
        let Some((mut register_rx, mut unregister_rx)) = self.lifecycle_rx.lock().await.take()
        else {
            warn!("허브 이벤트 루프가 이미 실행 중입니다");
            return;
        };

        loop {
            tokio::select! {
                Some(reg) = register_rx.recv() => self.add_connection(reg).await,
                Some(conn_id) = unregister_rx.recv() => self.remove_connection(conn_id).await,
                else => break,
            }
        }
    }

    /// 연결 등록. 연결 id를 돌려준다.
    pub async fn register(&self, meta: ConnectionMeta, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let reg = Registration {
            id,
            conn: Connection { meta, tx },
        };
        if self.register_tx.send(reg).await.is_err() {
            error!("허브 register 채널이 닫혔습니다");
        }
        id
    }

    /// 연결 해제. 모든 인덱스에서 제거되고 송신 버퍼는 정확히 한 번 닫힌다.
    pub async fn unregister(&self, conn_id: u64) {
        if self.unregister_tx.send(conn_id).await.is_err() {
            error!("허브 unregister 채널이 닫혔습니다");
        }
    }

    async fn add_connection(&self, reg: Registration) {
        let mut indices = self.indices.write().await;
        if let Some(user_id) = reg.conn.meta.user_id {
            // 같은 사용자의 재접속은 마지막 연결이 이긴다
            indices.user_index.insert(user_id, reg.id);
        }
        if let Some(auction_id) = reg.conn.meta.auction_id {
            indices.auction_rooms.entry(auction_id).or_default().push(reg.id);
        }
        if let Some(room_id) = reg.conn.meta.room_id.clone() {
            indices.chat_rooms.entry(room_id).or_default().push(reg.id);
        }
        indices.clients.insert(reg.id, reg.conn);
    }

    async fn remove_connection(&self, conn_id: u64) {
        let mut indices = self.indices.write().await;
        let Some(conn) = indices.clients.remove(&conn_id) else {
            return;
        };
        if let Some(user_id) = conn.meta.user_id {
            // 재접속한 새 연결을 지우지 않도록, 여전히 이 연결을
            // 가리킬 때만 사용자 인덱스를 비운다
            if indices.user_index.get(&user_id) == Some(&conn_id) {
                indices.user_index.remove(&user_id);
            }
        }
        if let Some(auction_id) = conn.meta.auction_id {
            if let Some(room) = indices.auction_rooms.get_mut(&auction_id) {
                room.retain(|id| *id != conn_id);
                if room.is_empty() {
                    indices.auction_rooms.remove(&auction_id);
                }
            }
        }
        if let Some(room_id) = &conn.meta.room_id {
            if let Some(room) = indices.chat_rooms.get_mut(room_id) {
                room.retain(|id| *id != conn_id);
                if room.is_empty() {
                    let key = room_id.clone();
                    indices.chat_rooms.remove(&key);
                }
            }
        }
        // conn이 드롭되면서 송신 버퍼가 닫힌다
    }

    /// 경매 방 전체에 브로드캐스트
    ///
    /// 메시지는 한 번만 직렬화되고, 스냅샷은 읽기 잠금 해제 후
    /// 논블로킹으로 전송된다. 버퍼가 가득 찬 연결은 조용히 건너뛴다.
    pub async fn broadcast_to_auction<T: Serialize>(&self, auction_id: Uuid, kind: &str, payload: &T) {
        let Some(data) = encode(kind, payload) else { return };

        let targets = {
            let indices = self.indices.read().await;
            snapshot_room(&indices, indices.auction_rooms.get(&auction_id))
        };

        for (conn_id, tx) in targets {
            try_deliver(conn_id, &tx, data.clone());
        }
    }

    /// 특정 사용자에게 1:1 전송. 미접속 사용자는 조용히 무시한다.
    pub async fn send_to_user<T: Serialize>(&self, user_id: Uuid, kind: &str, payload: &T) {
        let Some(data) = encode(kind, payload) else { return };

        let target = {
            let indices = self.indices.read().await;
            indices
                .user_index
                .get(&user_id)
                .and_then(|conn_id| indices.clients.get(conn_id).map(|c| (*conn_id, c.tx.clone())))
        };

        if let Some((conn_id, tx)) = target {
            try_deliver(conn_id, &tx, data);
        }
    }

    /// 채팅 방 전체에 브로드캐스트
    pub async fn broadcast_to_chat<T: Serialize>(&self, room_id: &str, kind: &str, payload: &T) {
        let Some(data) = encode(kind, payload) else { return };

        let targets = {
            let indices = self.indices.read().await;
            snapshot_room(&indices, indices.chat_rooms.get(room_id))
        };

        for (conn_id, tx) in targets {
            try_deliver(conn_id, &tx, data.clone());
        }
    }

    /// 채팅 수신 처리: 검증 → 저장 → 브로드캐스트
    ///
    /// 저장 실패는 로그만 남기고 프레임을 버린다. 재시도도 응답도 없다.
    pub async fn handle_chat_send(
        &self,
        sender_id: Uuid,
        room_id: &str,
        body: Option<String>,
        image_url: Option<String>,
    ) {
        if body.is_none() && image_url.is_none() {
            return;
        }

        let persisted = with_deadline(WALLET_DEADLINE, async {
            self.chat_repo
                .insert_message(room_id, sender_id, body.as_deref(), image_url.as_deref())
                .await
                .map_err(AppError::from)
        })
        .await;

        let (message_id, created_at) = match persisted {
            Ok(row) => row,
            Err(err) => {
                error!("채팅 메시지 저장 실패: {}", err);
                return;
            }
        };

        let sender_name = self
            .chat_repo
            .sender_name(sender_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let payload = chat_message_payload(
            message_id,
            room_id,
            sender_id,
            sender_name,
            body,
            image_url,
            created_at,
        );
        self.broadcast_to_chat(room_id, TYPE_CHAT_MESSAGE, &payload).await;
    }
}

/// 채팅 브로드캐스트 페이로드 구성
pub fn chat_message_payload(
    id: Uuid,
    room_id: &str,
    sender_id: Uuid,
    sender_name: String,
    body: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
) -> ChatMessagePayload {
    ChatMessagePayload {
        id,
        room_id: room_id.to_string(),
        sender_id,
        sender_name,
        body,
        image_url,
        created_at: created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }
}

/// 두 참여자 id로 결정적 채팅 방 id 생성 (사전순 정렬 후 '_' 연결)
pub fn chat_room_id(a: Uuid, b: Uuid) -> String {
    let (mut x, mut y) = (a.to_string(), b.to_string());
    if x > y {
        std::mem::swap(&mut x, &mut y);
    }
    format!("{}_{}", x, y)
}

/// 방 멤버십 검사: 호출자 id가 방 id에 포함되어 있어야 한다.
/// 사용자 id가 불투명한 UUID라는 전제에서만 안전하다.
pub fn is_room_member(room_id: &str, user_id: Uuid) -> bool {
    room_id.contains(&user_id.to_string())
}

fn encode<T: Serialize>(kind: &str, payload: &T) -> Option<String> {
    match serde_json::to_string(&Envelope { kind, payload }) {
        Ok(data) => Some(data),
        Err(err) => {
            error!("허브 메시지 직렬화 실패: {}", err);
            None
        }
    }
}

fn snapshot_room(indices: &Indices, room: Option<&Vec<u64>>) -> Vec<(u64, mpsc::Sender<String>)> {
    room.map(|conn_ids| {
        conn_ids
            .iter()
            .filter_map(|id| indices.clients.get(id).map(|c| (*id, c.tx.clone())))
            .collect()
    })
    .unwrap_or_default()
}

fn try_deliver(conn_id: u64, tx: &mpsc::Sender<String>, data: String) {
    match tx.try_send(data) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            debug!("느린 클라이언트 메시지 드롭: conn={}", conn_id);
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tokio::time::sleep;

    // 테스트용 허브 생성 (DB 연결 없이 lazy pool 사용)
    fn test_hub() -> Arc<Hub> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/xauction_test")
            .unwrap();
        let hub = Hub::new(pool);
        tokio::spawn(hub.clone().run());
        hub
    }

    async fn settle() {
        // register/unregister 채널이 소비될 시간을 준다
        sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_chat_room_id_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(chat_room_id(a, b), chat_room_id(b, a));
        assert!(chat_room_id(a, b).contains('_'));
    }

    #[test]
    fn test_room_membership() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let eve = Uuid::new_v4();
        let room = chat_room_id(a, b);
        assert!(is_room_member(&room, a));
        assert!(is_room_member(&room, b));
        assert!(!is_room_member(&room, eve));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_auction_room() {
        let hub = test_hub();
        let auction_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);

        hub.register(
            ConnectionMeta {
                user_id: Some(Uuid::new_v4()),
                auction_id: Some(auction_id),
                room_id: None,
            },
            tx,
        )
        .await;
        settle().await;

        hub.broadcast_to_auction(auction_id, TYPE_BROADCAST_NEW_BID, &json!({"amount": 1500}))
            .await;

        let frame = rx.recv().await.expect("메시지를 받아야 함");
        assert!(frame.contains("broadcast_new_bid"));
        assert!(frame.contains("1500"));
    }

    #[tokio::test]
    async fn test_send_to_missing_user_is_noop() {
        let hub = test_hub();
        // 미접속 사용자에게 보내도 패닉 없이 조용히 무시
        hub.send_to_user(Uuid::new_v4(), TYPE_OUTBID_ALERT, &json!({})).await;
    }

    #[tokio::test]
    async fn test_full_buffer_drops_message() {
        let hub = test_hub();
        let auction_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);

        hub.register(
            ConnectionMeta {
                user_id: None,
                auction_id: Some(auction_id),
                room_id: None,
            },
            tx,
        )
        .await;
        settle().await;

        hub.broadcast_to_auction(auction_id, TYPE_BROADCAST_NEW_BID, &json!({"seq": 1})).await;
        hub.broadcast_to_auction(auction_id, TYPE_BROADCAST_NEW_BID, &json!({"seq": 2})).await;

        // 버퍼 용량이 1이므로 두 번째 메시지는 드롭된다
        let first = rx.recv().await.unwrap();
        assert!(first.contains("\"seq\":1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_closes_buffer() {
        let hub = test_hub();
        let user_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);

        let conn_id = hub
            .register(
                ConnectionMeta {
                    user_id: Some(user_id),
                    auction_id: None,
                    room_id: None,
                },
                tx,
            )
            .await;
        settle().await;

        hub.unregister(conn_id).await;
        settle().await;

        // 연결이 제거되면 송신 채널이 닫힌다
        assert!(rx.recv().await.is_none());

        // 제거 이후 전송은 무시된다
        hub.send_to_user(user_id, TYPE_OUTBID_ALERT, &json!({})).await;
    }

    #[tokio::test]
    async fn test_reregister_is_last_writer_wins() {
        let hub = test_hub();
        let user_id = Uuid::new_v4();
        let (old_tx, mut old_rx) = mpsc::channel(8);
        let (new_tx, mut new_rx) = mpsc::channel(8);

        let old_conn = hub
            .register(
                ConnectionMeta {
                    user_id: Some(user_id),
                    auction_id: None,
                    room_id: None,
                },
                old_tx,
            )
            .await;
        hub.register(
            ConnectionMeta {
                user_id: Some(user_id),
                auction_id: None,
                room_id: None,
            },
            new_tx,
        )
        .await;
        settle().await;

        hub.send_to_user(user_id, TYPE_OUTBID_ALERT, &json!({"n": 1})).await;
        assert!(new_rx.recv().await.is_some());
        assert!(old_rx.try_recv().is_err());

        // 이전 연결의 해제가 새 연결을 인덱스에서 밀어내면 안 된다
        hub.unregister(old_conn).await;
        settle().await;

        hub.send_to_user(user_id, TYPE_OUTBID_ALERT, &json!({"n": 2})).await;
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_chat_broadcast_only_reaches_room() {
        let hub = test_hub();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = chat_room_id(a, b);
        let (tx_member, mut rx_member) = mpsc::channel(8);
        let (tx_other, mut rx_other) = mpsc::channel(8);

        hub.register(
            ConnectionMeta {
                user_id: Some(a),
                auction_id: None,
                room_id: Some(room.clone()),
            },
            tx_member,
        )
        .await;
        hub.register(
            ConnectionMeta {
                user_id: Some(Uuid::new_v4()),
                auction_id: None,
                room_id: Some("another_room".to_string()),
            },
            tx_other,
        )
        .await;
        settle().await;

        hub.broadcast_to_chat(&room, TYPE_CHAT_MESSAGE, &json!({"body": "hi"})).await;

        assert!(rx_member.recv().await.unwrap().contains("chat_message"));
        assert!(rx_other.try_recv().is_err());
    }
}
