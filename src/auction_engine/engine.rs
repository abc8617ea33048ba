//! 경매 엔진 구현
//!
//! 입찰 처리와 경매 종료 전환을 단일 DB 트랜잭션으로 직렬화합니다.
//! 행 잠금 순서는 경매 → 입찰자 → 이전 최고 입찰자 → 정산으로 고정되어
//! 데드락을 방지합니다.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use crate::auction_engine::model::{
  validate_amount, AuctionStatus, BidCommit, DisplacedBidder, HoldStatus, JournalKind,
  JournalStatus,
};
use crate::db::models::{AuctionLockRow, OpenHoldRow};
use crate::error::AppError;

/// 입찰/정산 요청 데드라인
pub(crate) const BID_SETTLE_DEADLINE: Duration = Duration::from_secs(10);
/// 입출금 및 채팅 저장 데드라인
pub(crate) const WALLET_DEADLINE: Duration = Duration::from_secs(5);

/// 경매 엔진
///
/// 지갑 잔액과 홀드 원장을 함께 움직이는 모든 상태 전이를 담당합니다.
#[derive(Clone)]
pub struct AuctionEngine {
  pool: PgPool,
}

impl AuctionEngine {
  /// 새 경매 엔진 생성
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  /// 입찰 처리
  ///
  /// 단일 트랜잭션 안에서: 경매 행 잠금 → 검증 → 이전 최고 입찰자의
  /// SOFT 홀드 해제/환불 → 새 입찰자 차감 → SOFT 홀드 생성 → 입찰 기록
  /// → 경매 갱신 순으로 수행합니다. 어느 단계든 실패하면 전체 롤백되어
  /// 부분 효과가 남지 않습니다.
  pub async fn place_bid(
    &self,
    caller: Uuid,
    auction_id: Uuid,
    amount: Decimal,
  ) -> Result<BidCommit, AppError> {
    validate_amount(amount)?;
    with_deadline(BID_SETTLE_DEADLINE, self.place_bid_tx(caller, auction_id, amount)).await
  }

  async fn place_bid_tx(
    &self,
    caller: Uuid,
    auction_id: Uuid,
    amount: Decimal,
  ) -> Result<BidCommit, AppError> {
    let mut tx = self.pool.begin().await?;

    // 1. 경매 행 잠금
    let lock = sqlx::query_as::<_, AuctionLockRow>(
      "SELECT current_highest_bid, highest_bidder_id, status, end_time, seller_id
       FROM auctions
       WHERE id = $1
       FOR UPDATE",
    )
    .bind(auction_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("경매를 찾을 수 없습니다".to_string()))?;

    // 종료 시각 경계: end_time 정각 도달 시점부터 입찰 불가
    if lock.status != AuctionStatus::Active.as_str() || Utc::now() >= lock.end_time {
      return Err(AppError::Conflict("이미 종료된 경매입니다".to_string()));
    }

    // 2. 현재 최고가보다 엄격히 높아야 함 (동률 불가)
    if amount <= lock.current_highest_bid {
      return Err(AppError::Conflict(
        "현재 최고 입찰가보다 높은 금액이어야 합니다".to_string(),
      ));
    }

    // 3. 입찰자 지갑 행 잠금 및 잔액 검증
    let balance: Decimal = sqlx::query_scalar(
      "SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(caller)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("사용자를 찾을 수 없습니다".to_string()))?;

    if balance < amount {
      return Err(AppError::InsufficientFunds);
    }

    // 4. 이전 최고 입찰자의 SOFT 홀드 해제 + 환불.
    //    자기 자신의 재입찰도 동일하게 해제하여 (경매, 사용자)당
    //    미해제 홀드가 하나만 존재하도록 유지한다.
    let mut displaced = None;
    if let Some(prev_bidder) = lock.highest_bidder_id {
      let released = sqlx::query(
        "UPDATE bid_holds
         SET status = $1, updated_at = now()
         WHERE auction_id = $2 AND user_id = $3 AND status = $4",
      )
      .bind(HoldStatus::Released.as_str())
      .bind(auction_id)
      .bind(prev_bidder)
      .bind(HoldStatus::Soft.as_str())
      .execute(&mut *tx)
      .await?
      .rows_affected();

      // 최고 입찰자인데 SOFT 홀드가 없으면 원장 정합성이 깨진 것
      if released == 0 {
        return Err(AppError::Internal(format!(
          "SOFT 홀드 누락: auction={} user={}",
          auction_id, prev_bidder
        )));
      }

      adjust_balance(&mut tx, prev_bidder, lock.current_highest_bid).await?;
      append_journal(
        &mut tx,
        prev_bidder,
        lock.current_highest_bid,
        JournalKind::Refund,
        &auction_id.to_string(),
      )
      .await?;

      if prev_bidder != caller {
        displaced = Some(DisplacedBidder {
          user_id: prev_bidder,
          amount: lock.current_highest_bid,
        });
      }
    }

    // 5. 새 입찰자 지갑에서 차감 (soft-block)
    adjust_balance(&mut tx, caller, -amount).await?;

    // 6. BID_HOLD 원장 기록
    append_journal(&mut tx, caller, amount, JournalKind::BidHold, &auction_id.to_string()).await?;

    // 7. 새 SOFT 홀드 생성
    sqlx::query(
      "INSERT INTO bid_holds (auction_id, user_id, amount, status)
       VALUES ($1, $2, $3, $4)",
    )
    .bind(auction_id)
    .bind(caller)
    .bind(amount)
    .bind(HoldStatus::Soft.as_str())
    .execute(&mut *tx)
    .await?;

    // 8. 경매 최고가/최고 입찰자 갱신
    sqlx::query(
      "UPDATE auctions
       SET current_highest_bid = $1, highest_bidder_id = $2
       WHERE id = $3",
    )
    .bind(amount)
    .bind(caller)
    .bind(auction_id)
    .execute(&mut *tx)
    .await?;

    // 9. 입찰 기록 저장 (append-only)
    sqlx::query("INSERT INTO bids (auction_id, user_id, amount) VALUES ($1, $2, $3)")
      .bind(auction_id)
      .bind(caller)
      .bind(amount)
      .execute(&mut *tx)
      .await?;

    // 10. 커밋
    tx.commit().await?;

    info!("입찰 완료: auction={} bidder={} amount={}", auction_id, caller, amount);

    Ok(BidCommit {
      auction_id,
      bidder_id: caller,
      amount,
      displaced,
    })
  }

  /// 만료된 경매의 지연 종료 전환
  ///
  /// 읽기 경로에서 호출해도 안전한 멱등 연산입니다. 동시에 두 번 호출되면
  /// 경매 행 잠금에서 직렬화되고, 두 번째 호출은 이미 ENDED 상태를 보고
  /// 아무 것도 하지 않습니다.
  pub async fn finalize_if_expired(&self, auction_id: Uuid) -> Result<(), AppError> {
    let mut tx = self.pool.begin().await?;

    let lock = sqlx::query_as::<_, AuctionLockRow>(
      "SELECT current_highest_bid, highest_bidder_id, status, end_time, seller_id
       FROM auctions
       WHERE id = $1
       FOR UPDATE",
    )
    .bind(auction_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("경매를 찾을 수 없습니다".to_string()))?;

    // ACTIVE 상태이고 종료 시각이 지난 경매만 전환
    if lock.status != AuctionStatus::Active.as_str() || Utc::now() < lock.end_time {
      return Ok(());
    }

    sqlx::query("UPDATE auctions SET status = $1 WHERE id = $2")
      .bind(AuctionStatus::Ended.as_str())
      .bind(auction_id)
      .execute(&mut *tx)
      .await?;

    if let Some(winner) = lock.highest_bidder_id {
      // 낙찰자의 SOFT 홀드 → HARD
      let hardened = sqlx::query(
        "UPDATE bid_holds
         SET status = $1, updated_at = now()
         WHERE auction_id = $2 AND user_id = $3 AND status = $4",
      )
      .bind(HoldStatus::Hard.as_str())
      .bind(auction_id)
      .bind(winner)
      .bind(HoldStatus::Soft.as_str())
      .execute(&mut *tx)
      .await?
      .rows_affected();

      if hardened == 0 {
        warn!("낙찰자 SOFT 홀드 없음: auction={} winner={}", auction_id, winner);
      }

      // 남아 있는 다른 SOFT 홀드 전부 해제 + 환불.
      // 단일 낙찰자 설계에서는 없어야 정상이지만 방어적으로 처리한다.
      let others = sqlx::query_as::<_, OpenHoldRow>(
        "SELECT id, user_id, amount FROM bid_holds
         WHERE auction_id = $1 AND status = $2 AND user_id != $3",
      )
      .bind(auction_id)
      .bind(HoldStatus::Soft.as_str())
      .bind(winner)
      .fetch_all(&mut *tx)
      .await?;

      for hold in others {
        sqlx::query("UPDATE bid_holds SET status = $1, updated_at = now() WHERE id = $2")
          .bind(HoldStatus::Released.as_str())
          .bind(hold.id)
          .execute(&mut *tx)
          .await?;
        adjust_balance(&mut tx, hold.user_id, hold.amount).await?;
        append_journal(
          &mut tx,
          hold.user_id,
          hold.amount,
          JournalKind::Refund,
          &auction_id.to_string(),
        )
        .await?;
      }

      // PENDING 정산 생성 (경매당 하나, 이미 있으면 무시)
      sqlx::query(
        "INSERT INTO settlements (auction_id, winner_id, seller_id, amount)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (auction_id) DO NOTHING",
      )
      .bind(auction_id)
      .bind(winner)
      .bind(lock.seller_id)
      .bind(lock.current_highest_bid)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;

    info!("경매 종료 전환 완료: auction={}", auction_id);

    Ok(())
  }

  pub(crate) fn pool(&self) -> &PgPool {
    &self.pool
  }
}

/// 데드라인 안에서 트랜잭션 실행. 초과 시 트랜잭션이 드롭되어 롤백된다.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, AppError>
where
  F: Future<Output = Result<T, AppError>>,
{
  match tokio::time::timeout(deadline, fut).await {
    Ok(result) => result,
    Err(_) => Err(AppError::Timeout),
  }
}

/// 지갑 잔액을 부호 있는 증감분만큼 갱신
pub(crate) async fn adjust_balance(
  tx: &mut Transaction<'_, Postgres>,
  user_id: Uuid,
  delta: Decimal,
) -> Result<(), sqlx::Error> {
  sqlx::query("UPDATE users SET wallet_balance = wallet_balance + $1 WHERE id = $2")
    .bind(delta)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
  Ok(())
}

/// 거래 원장 항목 추가 (append-only)
pub(crate) async fn append_journal(
  tx: &mut Transaction<'_, Postgres>,
  user_id: Uuid,
  amount: Decimal,
  kind: JournalKind,
  reference: &str,
) -> Result<(), sqlx::Error> {
  sqlx::query(
    "INSERT INTO transactions (user_id, amount, type, status, reference)
     VALUES ($1, $2, $3, $4, $5)",
  )
  .bind(user_id)
  .bind(amount)
  .bind(kind.as_str())
  .bind(JournalStatus::Completed.as_str())
  .bind(reference)
  .execute(&mut **tx)
  .await?;
  Ok(())
}
