use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::Error as SqlxError;
use uuid::Uuid;

use super::models::{
    AuctionDetailRow, BidHistoryRow, ConversationRow, MessageRecord, MyBidRow, TransactionRecord,
};

/// 경매 조회 저장소
pub struct AuctionRepository {
    pool: PgPool,
}

impl AuctionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 경매 상세 조회 (상품, 판매자, 정산 스냅샷 포함)
    pub async fn find_detail(&self, auction_id: Uuid) -> Result<Option<AuctionDetailRow>, SqlxError> {
        let row = sqlx::query_as::<_, AuctionDetailRow>(
            "SELECT a.id, a.product_id, p.title, p.description, p.image_url,
                    a.seller_id, u.name AS seller_name,
                    a.start_price, a.current_highest_bid, a.highest_bidder_id,
                    a.end_time, a.status,
                    s.winner_approved_at, s.seller_approved_at, s.status AS settlement_status
             FROM auctions a
             JOIN products p ON p.id = a.product_id
             JOIN users u ON u.id = a.seller_id
             LEFT JOIN settlements s ON s.auction_id = a.id
             WHERE a.id = $1",
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// 경매별 최근 입찰 이력 조회 (최근 20건)
    pub async fn recent_bids(&self, auction_id: Uuid) -> Result<Vec<BidHistoryRow>, SqlxError> {
        let bids = sqlx::query_as::<_, BidHistoryRow>(
            "SELECT b.amount, b.created_at, u.name AS bidder_name
             FROM bids b
             JOIN users u ON u.id = b.user_id
             WHERE b.auction_id = $1
             ORDER BY b.created_at DESC
             LIMIT 20",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bids)
    }

    /// 사용자별 입찰 내역 조회 (경매/상품 정보 포함)
    pub async fn bids_of_user(&self, user_id: Uuid) -> Result<Vec<MyBidRow>, SqlxError> {
        let bids = sqlx::query_as::<_, MyBidRow>(
            "SELECT b.id, b.amount, b.created_at,
                    a.id AS auction_id, a.current_highest_bid, a.end_time,
                    a.status AS auction_status, a.highest_bidder_id,
                    p.id AS product_id, p.title AS product_title,
                    p.image_url AS product_image_url
             FROM bids b
             JOIN auctions a ON a.id = b.auction_id
             JOIN products p ON p.id = a.product_id
             WHERE b.user_id = $1
             ORDER BY b.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bids)
    }
}

/// 지갑 조회 저장소
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 지갑 잔액 조회
    pub async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, SqlxError> {
        sqlx::query_scalar("SELECT wallet_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// 최근 거래 내역 조회 (최근 50건)
    pub async fn recent_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionRecord>, SqlxError> {
        let txns = sqlx::query_as::<_, TransactionRecord>(
            "SELECT id, amount, type AS kind, status, reference, created_at
             FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(txns)
    }
}

/// 채팅 저장소
#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 채팅 메시지 저장, 생성된 id와 시각 반환
    pub async fn insert_message(
        &self,
        room_id: &str,
        sender_id: Uuid,
        body: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<(Uuid, DateTime<Utc>), SqlxError> {
        sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            "INSERT INTO messages (room_id, sender_id, body, image_url)
             VALUES ($1, $2, $3, $4)
             RETURNING id, created_at",
        )
        .bind(room_id)
        .bind(sender_id)
        .bind(body)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await
    }

    /// 발신자 표시 이름 조회
    pub async fn sender_name(&self, user_id: Uuid) -> Result<Option<String>, SqlxError> {
        sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// 방별 메시지 조회 (최근 50건, 오래된 순)
    pub async fn room_messages(&self, room_id: &str) -> Result<Vec<MessageRecord>, SqlxError> {
        let msgs = sqlx::query_as::<_, MessageRecord>(
            "SELECT m.id, m.room_id, m.sender_id, u.name AS sender_name,
                    m.body, m.image_url, m.created_at
             FROM (
                 SELECT * FROM messages
                 WHERE room_id = $1
                 ORDER BY created_at DESC
                 LIMIT 50
             ) m
             JOIN users u ON u.id = m.sender_id
             ORDER BY m.created_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(msgs)
    }

    /// 대화방 목록 조회 (방별 마지막 메시지 + 상대방 이름)
    pub async fn conversations(&self, caller_id: Uuid) -> Result<Vec<ConversationRow>, SqlxError> {
        // room_id는 두 참여자 id를 정렬해 '_'로 이은 문자열이므로
        // split_part로 상대방 id를 복원한다.
        let convos = sqlx::query_as::<_, ConversationRow>(
            "WITH latest AS (
                 SELECT DISTINCT ON (room_id)
                        room_id, body, image_url, created_at
                 FROM messages
                 WHERE room_id LIKE '%' || $1 || '%'
                 ORDER BY room_id, created_at DESC
             )
             SELECT l.room_id, u.id AS other_user_id, u.name AS other_name,
                    l.body AS last_body, l.image_url AS last_image_url,
                    l.created_at AS last_at
             FROM latest l
             JOIN users u ON u.id::text = CASE
                     WHEN split_part(l.room_id, '_', 1) = $1
                         THEN split_part(l.room_id, '_', 2)
                     ELSE split_part(l.room_id, '_', 1)
                 END
             ORDER BY l.created_at DESC",
        )
        .bind(caller_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(convos)
    }
}
