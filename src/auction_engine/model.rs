//! 경매 엔진의 기본 모델
//!
//! 이 모듈은 경매 상태, 홀드 수명주기, 거래 원장 종류 등
//! 경매 엔진의 핵심 데이터 모델을 정의합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
  /// 진행 중 - 입찰 가능
  Active,
  /// 종료 - 더 이상 입찰 불가
  Ended,
  /// 취소됨
  Cancelled,
}

impl AuctionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      AuctionStatus::Active => "ACTIVE",
      AuctionStatus::Ended => "ENDED",
      AuctionStatus::Cancelled => "CANCELLED",
    }
  }
}

/// 입찰 보증금(홀드) 상태
///
/// 수명주기: SOFT → RELEASED (상위 입찰 발생)
///           SOFT → HARD (낙찰자로 경매 종료)
///           HARD → SETTLED (정산 완료, 대금 이체)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
  /// 입찰 중 임시 보증금
  Soft,
  /// 낙찰 확정 보증금
  Hard,
  /// 해제됨 (환불 완료)
  Released,
  /// 정산 완료 (판매자에게 이체됨)
  Settled,
}

impl HoldStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      HoldStatus::Soft => "SOFT",
      HoldStatus::Hard => "HARD",
      HoldStatus::Released => "RELEASED",
      HoldStatus::Settled => "SETTLED",
    }
  }
}

/// 거래 원장 항목 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalKind {
  /// 외부 입금
  Deposit,
  /// 외부 출금
  Withdraw,
  /// 입찰 보증금 차감
  BidHold,
  /// 보증금 환불
  Refund,
  /// 정산 대금 이체
  Transfer,
}

impl JournalKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      JournalKind::Deposit => "DEPOSIT",
      JournalKind::Withdraw => "WITHDRAW",
      JournalKind::BidHold => "BID_HOLD",
      JournalKind::Refund => "REFUND",
      JournalKind::Transfer => "TRANSFER",
    }
  }
}

/// 거래 원장 항목 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
  Pending,
  Completed,
  Failed,
}

impl JournalStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JournalStatus::Pending => "PENDING",
      JournalStatus::Completed => "COMPLETED",
      JournalStatus::Failed => "FAILED",
    }
  }
}

/// 정산 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
  /// 승인 대기 중
  Pending,
  /// 양측 승인 완료, 대금 이체됨
  Completed,
}

impl SettlementStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SettlementStatus::Pending => "PENDING",
      SettlementStatus::Completed => "COMPLETED",
    }
  }
}

/// 밀려난 이전 최고 입찰자 정보 (outbid 알림 대상)
#[derive(Debug, Clone)]
pub struct DisplacedBidder {
  pub user_id: Uuid,
  pub amount: Decimal,
}

/// 입찰 커밋 결과
///
/// 트랜잭션 커밋 이후 허브 팬아웃에 필요한 정보를 담습니다.
#[derive(Debug, Clone)]
pub struct BidCommit {
  pub auction_id: Uuid,
  pub bidder_id: Uuid,
  pub amount: Decimal,
  /// 밀려난 이전 입찰자 (자기 자신 재입찰이면 None)
  pub displaced: Option<DisplacedBidder>,
}

/// 정산 승인 결과
#[derive(Debug, Clone)]
pub struct SettleOutcome {
  pub both_approved: bool,
  pub winner_approved: bool,
  pub seller_approved: bool,
  pub status: SettlementStatus,
}

/// 지갑 입출금 결과
#[derive(Debug, Clone)]
pub struct WalletOutcome {
  pub new_balance: Decimal,
}

/// 금액 유효성 검사: 양수이고 소수점 둘째 자리까지만 허용
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
  if amount <= Decimal::ZERO {
    return Err(AppError::InvalidInput("금액은 0보다 커야 합니다".to_string()));
  }
  if amount.normalize().scale() > 2 {
    return Err(AppError::InvalidInput(
      "금액은 소수점 둘째 자리까지만 허용됩니다".to_string(),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn test_status_strings_round_trip() {
    assert_eq!(AuctionStatus::Active.as_str(), "ACTIVE");
    assert_eq!(HoldStatus::Soft.as_str(), "SOFT");
    assert_eq!(HoldStatus::Settled.as_str(), "SETTLED");
    assert_eq!(JournalKind::BidHold.as_str(), "BID_HOLD");
    assert_eq!(SettlementStatus::Completed.as_str(), "COMPLETED");
  }

  #[test]
  fn test_validate_amount_positive() {
    assert!(validate_amount(dec!(1500)).is_ok());
    assert!(validate_amount(dec!(0.01)).is_ok());
    assert!(validate_amount(dec!(999.99)).is_ok());
  }

  #[test]
  fn test_validate_amount_rejects_zero_and_negative() {
    assert!(validate_amount(dec!(0)).is_err());
    assert!(validate_amount(dec!(-10)).is_err());
  }

  #[test]
  fn test_validate_amount_rejects_sub_cent_precision() {
    assert!(validate_amount(dec!(10.001)).is_err());
    assert!(validate_amount(dec!(0.999)).is_err());
    // 끝자리 0은 정규화 후 허용됨
    assert!(validate_amount(dec!(10.100)).is_ok());
  }
}
