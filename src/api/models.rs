use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{
    AuctionDetailRow, BidHistoryRow, ConversationRow, MessageRecord, MyBidRow, TransactionRecord,
};

/// 입찰 요청
#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// 입찰 응답
#[derive(Debug, Serialize)]
pub struct PlaceBidResponse {
    pub success: bool,
    pub auction_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_high_bid: Decimal,
}

/// 새 입찰 브로드캐스트 페이로드 (경매 방 전체 대상)
#[derive(Debug, Serialize)]
pub struct BidPayload {
    pub auction_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub bidder_id: Uuid,
    pub timestamp: String,
}

/// 상위 입찰 알림 페이로드 (밀려난 사용자 1:1 대상)
#[derive(Debug, Serialize)]
pub struct OutbidPayload {
    pub auction_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub your_bid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_high_bid: Decimal,
    pub new_bidder: Uuid,
}

/// 경매 상세 응답
#[derive(Debug, Serialize)]
pub struct AuctionDetailResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub seller_id: Uuid,
    pub seller_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub start_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_highest_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub end_time: String,
    pub status: String,
    pub winner_approved_at: Option<String>,
    pub seller_approved_at: Option<String>,
    pub settlement_status: Option<String>,
}

impl From<AuctionDetailRow> for AuctionDetailResponse {
    fn from(row: AuctionDetailRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            seller_id: row.seller_id,
            seller_name: row.seller_name,
            start_price: row.start_price,
            current_highest_bid: row.current_highest_bid,
            highest_bidder_id: row.highest_bidder_id,
            end_time: rfc3339(row.end_time),
            status: row.status,
            winner_approved_at: row.winner_approved_at.map(rfc3339),
            seller_approved_at: row.seller_approved_at.map(rfc3339),
            settlement_status: row.settlement_status,
        }
    }
}

/// 입찰 이력 항목 (입찰자 이름 마스킹)
#[derive(Debug, Serialize)]
pub struct BidHistoryItem {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub placed_at: String,
    pub bidder_tag: String,
}

impl From<BidHistoryRow> for BidHistoryItem {
    fn from(row: BidHistoryRow) -> Self {
        Self {
            amount: row.amount,
            placed_at: rfc3339(row.created_at),
            bidder_tag: mask_bidder_tag(&row.bidder_name),
        }
    }
}

/// 내 입찰 내역 항목
#[derive(Debug, Serialize)]
pub struct MyBidItem {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub placed_at: String,
    pub auction_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_high_bid: Decimal,
    pub end_time: String,
    pub auction_status: String,
    pub highest_bidder_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_title: String,
    pub product_image_url: Option<String>,
    pub is_winning: bool,
}

impl MyBidItem {
    pub fn from_row(row: MyBidRow, caller: Uuid) -> Self {
        let is_winning = row.highest_bidder_id == Some(caller);
        Self {
            id: row.id,
            amount: row.amount,
            placed_at: rfc3339(row.created_at),
            auction_id: row.auction_id,
            current_high_bid: row.current_highest_bid,
            end_time: rfc3339(row.end_time),
            auction_status: row.auction_status,
            highest_bidder_id: row.highest_bidder_id,
            product_id: row.product_id,
            product_title: row.product_title,
            product_image_url: row.product_image_url,
            is_winning,
        }
    }
}

/// 정산 승인 응답
#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub success: bool,
    pub both_approved: bool,
    pub winner_approved: bool,
    pub seller_approved: bool,
    pub settlement_status: String,
}

/// 입금 요청
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub upi_ref: Option<String>,
}

/// 출금 요청
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub upi_id: String,
}

/// 입출금 응답
#[derive(Debug, Serialize)]
pub struct WalletMutationResponse {
    pub success: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
}

/// 지갑 조회 응답
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transactions: Vec<TransactionView>,
}

/// 거래 내역 항목
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub reference: Option<String>,
    pub created_at: String,
}

impl From<TransactionRecord> for TransactionView {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            kind: record.kind,
            status: record.status,
            reference: record.reference,
            created_at: rfc3339(record.created_at),
        }
    }
}

/// 채팅 메시지 전송 요청 (REST)
#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    pub body: Option<String>,
    pub image_url: Option<String>,
}

/// 채팅 메시지 응답 항목
#[derive(Debug, Serialize)]
pub struct ChatMessageView {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl From<MessageRecord> for ChatMessageView {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            room_id: record.room_id,
            sender_id: record.sender_id,
            sender_name: record.sender_name,
            body: record.body,
            image_url: record.image_url,
            created_at: rfc3339(record.created_at),
        }
    }
}

/// 대화방 목록 항목
#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub room_id: String,
    pub other_user_id: Uuid,
    pub other_name: String,
    pub last_body: Option<String>,
    pub last_image_url: Option<String>,
    pub last_at: String,
}

impl From<ConversationRow> for ConversationView {
    fn from(row: ConversationRow) -> Self {
        Self {
            room_id: row.room_id,
            other_user_id: row.other_user_id,
            other_name: row.other_name,
            last_body: row.last_body,
            last_image_url: row.last_image_url,
            last_at: rfc3339(row.last_at),
        }
    }
}

/// RFC 3339 UTC 포맷 (초 단위)
pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 입찰자 이름 마스킹: 앞 4글자 + "***"
pub fn mask_bidder_tag(name: &str) -> String {
    if name.chars().count() > 4 {
        let prefix: String = name.chars().take(4).collect();
        format!("{}***", prefix)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mask_bidder_tag() {
        assert_eq!(mask_bidder_tag("alexander"), "alex***");
        assert_eq!(mask_bidder_tag("anna"), "anna");
        assert_eq!(mask_bidder_tag("bo"), "bo");
        assert_eq!(mask_bidder_tag(""), "");
        // 바이트가 아닌 글자 경계로 자른다
        assert_eq!(mask_bidder_tag("김철수판매자"), "김철수판***");
    }

    #[test]
    fn test_bid_request_accepts_json_number() {
        let req: PlaceBidRequest = serde_json::from_str(r#"{"amount": 1500.50}"#).unwrap();
        assert_eq!(req.amount, dec!(1500.50));
    }

    #[test]
    fn test_bid_payload_serializes_amount_as_number() {
        let payload = BidPayload {
            auction_id: Uuid::nil(),
            amount: dec!(2000),
            bidder_id: Uuid::nil(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"amount\":2000"));
        assert!(!json.contains("\"amount\":\""));
    }

    #[test]
    fn test_transaction_view_renames_kind_to_type() {
        let view = TransactionView {
            id: Uuid::nil(),
            amount: dec!(100),
            kind: "DEPOSIT".to_string(),
            status: "COMPLETED".to_string(),
            reference: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"type\":\"DEPOSIT\""));
    }
}
