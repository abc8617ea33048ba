use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 경매 행 잠금 결과 (SELECT ... FOR UPDATE)
#[derive(Debug, Clone, FromRow)]
pub struct AuctionLockRow {
    pub current_highest_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub status: String,
    pub end_time: DateTime<Utc>,
    pub seller_id: Uuid,
}

/// 정산 행 잠금 결과 (SELECT ... FOR UPDATE)
#[derive(Debug, Clone, FromRow)]
pub struct SettlementLockRow {
    pub id: Uuid,
    pub winner_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub winner_approved_at: Option<DateTime<Utc>>,
    pub seller_approved_at: Option<DateTime<Utc>>,
    pub status: String,
}

/// 미해제 홀드 행 (경매 종료 시 환불 대상 조회용)
#[derive(Debug, Clone, FromRow)]
pub struct OpenHoldRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
}

/// 거래 원장 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub amount: Decimal,
    pub kind: String,
    pub status: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 경매 상세 조회 행 (상품/판매자/정산 스냅샷 조인)
#[derive(Debug, Clone, FromRow)]
pub struct AuctionDetailRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub seller_id: Uuid,
    pub seller_name: String,
    pub start_price: Decimal,
    pub current_highest_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub winner_approved_at: Option<DateTime<Utc>>,
    pub seller_approved_at: Option<DateTime<Utc>>,
    pub settlement_status: Option<String>,
}

/// 경매 입찰 이력 행 (입찰자 이름 포함)
#[derive(Debug, Clone, FromRow)]
pub struct BidHistoryRow {
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub bidder_name: String,
}

/// 내 입찰 내역 행 (경매/상품 상태 포함)
#[derive(Debug, Clone, FromRow)]
pub struct MyBidRow {
    pub id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub auction_id: Uuid,
    pub current_highest_bid: Decimal,
    pub end_time: DateTime<Utc>,
    pub auction_status: String,
    pub highest_bidder_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_title: String,
    pub product_image_url: Option<String>,
}

/// 채팅 메시지 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRecord {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 대화방 목록 행 (방별 마지막 메시지)
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub room_id: String,
    pub other_user_id: Uuid,
    pub other_name: String,
    pub last_body: Option<String>,
    pub last_image_url: Option<String>,
    pub last_at: DateTime<Utc>,
}
