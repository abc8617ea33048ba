//! 정산 승인 처리
//!
//! 낙찰자와 판매자 양측의 승인을 기록하고, 두 번째 승인 시점에
//! HARD 홀드를 SETTLED로 전환하며 판매자 지갑에 대금을 입금합니다.

use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::auction_engine::engine::{
  adjust_balance, append_journal, with_deadline, AuctionEngine, BID_SETTLE_DEADLINE,
};
use crate::auction_engine::model::{HoldStatus, JournalKind, SettleOutcome, SettlementStatus};
use crate::db::models::SettlementLockRow;
use crate::error::AppError;

impl AuctionEngine {
  /// 정산 승인
  ///
  /// 호출자가 낙찰자면 낙찰자 승인 시각을, 판매자면 판매자 승인 시각을
  /// 기록합니다. 양측 승인이 모두 모이면 같은 트랜잭션 안에서 이체까지
  /// 수행합니다. 동시 승인은 정산 행 잠금에서 직렬화됩니다.
  pub async fn approve_settlement(
    &self,
    caller: Uuid,
    auction_id: Uuid,
  ) -> Result<SettleOutcome, AppError> {
    with_deadline(BID_SETTLE_DEADLINE, self.approve_settlement_tx(caller, auction_id)).await
  }

  async fn approve_settlement_tx(
    &self,
    caller: Uuid,
    auction_id: Uuid,
  ) -> Result<SettleOutcome, AppError> {
    let mut tx = self.pool().begin().await?;

    // 정산 행 잠금
    let lock = sqlx::query_as::<_, SettlementLockRow>(
      "SELECT id, winner_id, seller_id, amount,
              winner_approved_at, seller_approved_at, status
       FROM settlements
       WHERE auction_id = $1
       FOR UPDATE",
    )
    .bind(auction_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
      AppError::NotFound("정산 정보가 없습니다. 경매가 아직 진행 중일 수 있습니다".to_string())
    })?;

    if lock.status == SettlementStatus::Completed.as_str() {
      return Err(AppError::Conflict("이미 완료된 정산입니다".to_string()));
    }

    // 호출자 측 승인 기록
    let now = Utc::now();
    let (mut winner_approved, mut seller_approved) =
      (lock.winner_approved_at.is_some(), lock.seller_approved_at.is_some());

    if caller == lock.winner_id {
      if winner_approved {
        return Err(AppError::Conflict("이미 승인했습니다".to_string()));
      }
      sqlx::query("UPDATE settlements SET winner_approved_at = $1 WHERE id = $2")
        .bind(now)
        .bind(lock.id)
        .execute(&mut *tx)
        .await?;
      winner_approved = true;
    } else if caller == lock.seller_id {
      if seller_approved {
        return Err(AppError::Conflict("이미 승인했습니다".to_string()));
      }
      sqlx::query("UPDATE settlements SET seller_approved_at = $1 WHERE id = $2")
        .bind(now)
        .bind(lock.id)
        .execute(&mut *tx)
        .await?;
      seller_approved = true;
    } else {
      return Err(AppError::Forbidden("이 정산의 당사자가 아닙니다".to_string()));
    }

    // 양측 승인이 모이면 같은 트랜잭션에서 이체 실행
    let both_approved = winner_approved && seller_approved;
    let mut status = SettlementStatus::Pending;
    if both_approved {
      sqlx::query("UPDATE settlements SET status = $1 WHERE id = $2")
        .bind(SettlementStatus::Completed.as_str())
        .bind(lock.id)
        .execute(&mut *tx)
        .await?;

      // 낙찰자의 HARD 홀드 → SETTLED
      sqlx::query(
        "UPDATE bid_holds
         SET status = $1, updated_at = now()
         WHERE auction_id = $2 AND user_id = $3 AND status = $4",
      )
      .bind(HoldStatus::Settled.as_str())
      .bind(auction_id)
      .bind(lock.winner_id)
      .bind(HoldStatus::Hard.as_str())
      .execute(&mut *tx)
      .await?;

      // 판매자 지갑에 대금 입금
      adjust_balance(&mut tx, lock.seller_id, lock.amount).await?;

      // 양측 모두에 TRANSFER 원장 기록
      append_journal(&mut tx, lock.winner_id, lock.amount, JournalKind::Transfer, &auction_id.to_string()).await?;
      append_journal(&mut tx, lock.seller_id, lock.amount, JournalKind::Transfer, &auction_id.to_string()).await?;

      status = SettlementStatus::Completed;
      info!("정산 완료: auction={} amount={}", auction_id, lock.amount);
    }

    tx.commit().await?;

    Ok(SettleOutcome {
      both_approved,
      winner_approved,
      seller_approved,
      status,
    })
  }
}
