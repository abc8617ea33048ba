//! 지갑 입출금 처리
//!
//! 입금은 참조 문자열로 멱등하고, 출금은 잔액 검증 후 차감합니다.
//! 두 연산 모두 입찰 경로와 같은 원장 불변식을 공유합니다.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auction_engine::engine::{
  adjust_balance, append_journal, with_deadline, AuctionEngine, WALLET_DEADLINE,
};
use crate::auction_engine::model::{validate_amount, JournalKind, WalletOutcome};
use crate::error::AppError;

impl AuctionEngine {
  /// 지갑 입금
  ///
  /// 참조 문자열이 멱등성 키입니다. 클라이언트가 주지 않으면 서버가
  /// 생성합니다. 동일 참조의 DEPOSIT이 이미 있으면 Conflict로 거절되어
  /// 잔액은 정확히 한 번만 증가합니다.
  pub async fn deposit(
    &self,
    user_id: Uuid,
    amount: Decimal,
    reference: Option<String>,
  ) -> Result<WalletOutcome, AppError> {
    validate_amount(amount)?;
    let reference =
      reference.unwrap_or_else(|| format!("FE{}", Utc::now().timestamp_millis()));
    with_deadline(WALLET_DEADLINE, self.deposit_tx(user_id, amount, reference)).await
  }

  async fn deposit_tx(
    &self,
    user_id: Uuid,
    amount: Decimal,
    reference: String,
  ) -> Result<WalletOutcome, AppError> {
    let mut tx = self.pool().begin().await?;

    // 사용자 행 잠금
    let balance: Decimal = sqlx::query_scalar(
      "SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("사용자를 찾을 수 없습니다".to_string()))?;

    // 멱등성 검사. 검사를 비껴간 동시 중복은 부분 유니크 인덱스가 잡아
    // 23505 → Conflict로 변환된다.
    let duplicates: i64 = sqlx::query_scalar(
      "SELECT COUNT(*) FROM transactions WHERE reference = $1 AND type = $2",
    )
    .bind(&reference)
    .bind(JournalKind::Deposit.as_str())
    .fetch_one(&mut *tx)
    .await?;

    if duplicates > 0 {
      return Err(AppError::Conflict("이미 처리된 입금 요청입니다".to_string()));
    }

    adjust_balance(&mut tx, user_id, amount).await?;
    append_journal(&mut tx, user_id, amount, JournalKind::Deposit, &reference).await?;

    tx.commit().await?;

    Ok(WalletOutcome {
      new_balance: balance + amount,
    })
  }

  /// 지갑 출금
  pub async fn withdraw(
    &self,
    user_id: Uuid,
    amount: Decimal,
    upi_id: String,
  ) -> Result<WalletOutcome, AppError> {
    validate_amount(amount)?;
    with_deadline(WALLET_DEADLINE, self.withdraw_tx(user_id, amount, upi_id)).await
  }

  async fn withdraw_tx(
    &self,
    user_id: Uuid,
    amount: Decimal,
    upi_id: String,
  ) -> Result<WalletOutcome, AppError> {
    let mut tx = self.pool().begin().await?;

    let balance: Decimal = sqlx::query_scalar(
      "SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("사용자를 찾을 수 없습니다".to_string()))?;

    if balance < amount {
      return Err(AppError::InsufficientFunds);
    }

    adjust_balance(&mut tx, user_id, -amount).await?;
    append_journal(&mut tx, user_id, amount, JournalKind::Withdraw, &upi_id).await?;

    tx.commit().await?;

    Ok(WalletOutcome {
      new_balance: balance - amount,
    })
  }
}
