use axum::extract::{Path, State};
use axum::response::Json;
use log::debug;
use uuid::Uuid;

use crate::api::models::*;
use crate::api::CallerId;
use crate::db::{AuctionRepository, WalletRepository};
use crate::error::AppError;
use crate::hub::{TYPE_BROADCAST_NEW_BID, TYPE_OUTBID_ALERT};
use crate::server::ServerState;

/// 입찰 핸들러
///
/// 커밋이 성공한 뒤에만 허브 팬아웃이 일어난다. 팬아웃 실패는
/// 커밋된 상태에 영향을 주지 않는다.
pub async fn place_bid(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Path(auction_id): Path<Uuid>,
    Json(payload): Json<PlaceBidRequest>,
) -> Result<Json<PlaceBidResponse>, AppError> {
    let commit = state.engine.place_bid(caller, auction_id, payload.amount).await?;

    // 커밋 이후: 경매 방 전체에 새 입찰 브로드캐스트
    let bid_event = BidPayload {
        auction_id: commit.auction_id,
        amount: commit.amount,
        bidder_id: commit.bidder_id,
        timestamp: rfc3339(chrono::Utc::now()),
    };
    state
        .hub
        .broadcast_to_auction(commit.auction_id, TYPE_BROADCAST_NEW_BID, &bid_event)
        .await;

    // 밀려난 이전 최고 입찰자에게 1:1 알림
    if let Some(displaced) = &commit.displaced {
        let outbid_event = OutbidPayload {
            auction_id: commit.auction_id,
            your_bid: displaced.amount,
            new_high_bid: commit.amount,
            new_bidder: commit.bidder_id,
        };
        state
            .hub
            .send_to_user(displaced.user_id, TYPE_OUTBID_ALERT, &outbid_event)
            .await;
    }

    Ok(Json(PlaceBidResponse {
        success: true,
        auction_id: commit.auction_id,
        new_high_bid: commit.amount,
    }))
}

/// 경매 상세 조회 핸들러
///
/// 조회 전에 만료된 경매의 지연 종료 전환을 시도한다 (best-effort).
pub async fn get_auction(
    State(state): State<ServerState>,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<AuctionDetailResponse>, AppError> {
    if let Err(err) = state.engine.finalize_if_expired(auction_id).await {
        debug!("경매 종료 전환 생략: auction={} err={}", auction_id, err);
    }

    let detail = AuctionRepository::new(state.pool.clone())
        .find_detail(auction_id)
        .await?
        .ok_or_else(|| AppError::NotFound("경매를 찾을 수 없습니다".to_string()))?;

    Ok(Json(detail.into()))
}

/// 경매 입찰 이력 조회 핸들러 (최근 20건, 입찰자 이름 마스킹)
pub async fn get_auction_bids(
    State(state): State<ServerState>,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<Vec<BidHistoryItem>>, AppError> {
    let bids = AuctionRepository::new(state.pool.clone())
        .recent_bids(auction_id)
        .await?;

    Ok(Json(bids.into_iter().map(BidHistoryItem::from).collect()))
}

/// 정산 승인 핸들러
pub async fn approve_settlement(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<SettleResponse>, AppError> {
    let outcome = state.engine.approve_settlement(caller, auction_id).await?;

    Ok(Json(SettleResponse {
        success: true,
        both_approved: outcome.both_approved,
        winner_approved: outcome.winner_approved,
        seller_approved: outcome.seller_approved,
        settlement_status: outcome.status.as_str().to_string(),
    }))
}

/// 내 입찰 내역 조회 핸들러
pub async fn list_my_bids(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
) -> Result<Json<Vec<MyBidItem>>, AppError> {
    let bids = AuctionRepository::new(state.pool.clone())
        .bids_of_user(caller)
        .await?;

    Ok(Json(
        bids.into_iter().map(|row| MyBidItem::from_row(row, caller)).collect(),
    ))
}

/// 지갑 조회 핸들러 (잔액 + 최근 거래 50건)
pub async fn get_wallet(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
) -> Result<Json<WalletResponse>, AppError> {
    let repo = WalletRepository::new(state.pool.clone());

    let balance = repo
        .balance(caller)
        .await?
        .ok_or_else(|| AppError::NotFound("사용자를 찾을 수 없습니다".to_string()))?;
    let transactions = repo.recent_transactions(caller).await?;

    Ok(Json(WalletResponse {
        balance,
        transactions: transactions.into_iter().map(TransactionView::from).collect(),
    }))
}

/// 입금 핸들러 (upi_ref가 멱등성 키)
pub async fn deposit(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<WalletMutationResponse>, AppError> {
    let outcome = state.engine.deposit(caller, payload.amount, payload.upi_ref).await?;

    Ok(Json(WalletMutationResponse {
        success: true,
        new_balance: outcome.new_balance,
    }))
}

/// 출금 핸들러
pub async fn withdraw(
    State(state): State<ServerState>,
    CallerId(caller): CallerId,
    Json(payload): Json<WithdrawRequest>,
) -> Result<Json<WalletMutationResponse>, AppError> {
    if payload.upi_id.trim().is_empty() {
        return Err(AppError::InvalidInput("upi_id가 필요합니다".to_string()));
    }

    let outcome = state.engine.withdraw(caller, payload.amount, payload.upi_id).await?;

    Ok(Json(WalletMutationResponse {
        success: true,
        new_balance: outcome.new_balance,
    }))
}

/// 헬스체크 핸들러
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
