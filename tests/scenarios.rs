//! 원장 시나리오 테스트
//!
//! 실제 PostgreSQL이 필요한 종단 간 시나리오입니다. 기본 테스트
//! 실행에서는 제외되며, XAUCTION_TEST_DATABASE_URL을 지정하고
//! `cargo test -- --ignored`로 실행합니다.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use xauction::auction_engine::model::SettlementStatus;
use xauction::auction_engine::AuctionEngine;
use xauction::db;
use xauction::error::AppError;

async fn test_pool() -> PgPool {
    let url = std::env::var("XAUCTION_TEST_DATABASE_URL")
        .expect("XAUCTION_TEST_DATABASE_URL이 설정되어야 합니다");
    db::init_database(&url).await.expect("데이터베이스 초기화 실패")
}

async fn seed_user(pool: &PgPool, name: &str, balance: Decimal) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (name, email, wallet_balance) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(format!("{}-{}@test.local", name, Uuid::new_v4()))
    .bind(balance)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// 상품과 경매를 함께 생성한다. end_offset이 음수면 이미 만료된 경매.
async fn seed_auction(
    pool: &PgPool,
    seller: Uuid,
    start_price: Decimal,
    end_offset: Duration,
) -> Uuid {
    let product_id: Uuid = sqlx::query_scalar(
        "INSERT INTO products (seller_id, title) VALUES ($1, $2) RETURNING id",
    )
    .bind(seller)
    .bind("테스트 상품")
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query_scalar(
        "INSERT INTO auctions (product_id, seller_id, start_price, current_highest_bid, end_time)
         VALUES ($1, $2, $3, $3, $4) RETURNING id",
    )
    .bind(product_id)
    .bind(seller)
    .bind(start_price)
    .bind(Utc::now() + end_offset)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn balance_of(pool: &PgPool, user: Uuid) -> Decimal {
    sqlx::query_scalar("SELECT wallet_balance FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn hold_statuses(pool: &PgPool, auction: Uuid, user: Uuid) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT status FROM bid_holds WHERE auction_id = $1 AND user_id = $2 ORDER BY created_at",
    )
    .bind(auction)
    .bind(user)
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn journal_count(pool: &PgPool, user: Uuid, kind: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND type = $2")
        .bind(user)
        .bind(kind)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_bid_then_outbid_refunds_previous_bidder() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let alice = seed_user(&pool, "alice", dec!(10000)).await;
    let bob = seed_user(&pool, "bob", dec!(10000)).await;
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::hours(1)).await;

    // Alice 입찰: 1,500
    engine.place_bid(alice, auction, dec!(1500)).await.unwrap();
    assert_eq!(balance_of(&pool, alice).await, dec!(8500));
    assert_eq!(hold_statuses(&pool, auction, alice).await, vec!["SOFT"]);

    // Bob이 2,000으로 상회 입찰: Alice는 전액 환불
    let commit = engine.place_bid(bob, auction, dec!(2000)).await.unwrap();
    assert_eq!(balance_of(&pool, alice).await, dec!(10000));
    assert_eq!(balance_of(&pool, bob).await, dec!(8000));
    assert_eq!(hold_statuses(&pool, auction, alice).await, vec!["RELEASED"]);
    assert_eq!(hold_statuses(&pool, auction, bob).await, vec!["SOFT"]);
    assert_eq!(journal_count(&pool, alice, "REFUND").await, 1);

    // 밀려난 입찰자 정보가 팬아웃용으로 전달된다
    let displaced = commit.displaced.expect("밀려난 입찰자가 있어야 함");
    assert_eq!(displaced.user_id, alice);
    assert_eq!(displaced.amount, dec!(1500));
}

#[tokio::test]
#[ignore]
async fn test_bid_below_current_high_is_rejected() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let alice = seed_user(&pool, "alice", dec!(10000)).await;
    let bob = seed_user(&pool, "bob", dec!(10000)).await;
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::hours(1)).await;

    engine.place_bid(alice, auction, dec!(2000)).await.unwrap();

    // 동률 및 하회 입찰은 모두 Conflict
    let tie = engine.place_bid(bob, auction, dec!(2000)).await;
    assert!(matches!(tie, Err(AppError::Conflict(_))));
    let below = engine.place_bid(bob, auction, dec!(1500)).await;
    assert!(matches!(below, Err(AppError::Conflict(_))));
    assert_eq!(balance_of(&pool, bob).await, dec!(10000));
}

#[tokio::test]
#[ignore]
async fn test_insufficient_funds_leaves_no_trace() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let carol = seed_user(&pool, "carol", dec!(500)).await;
    let auction = seed_auction(&pool, seller, dec!(100), Duration::hours(1)).await;

    let result = engine.place_bid(carol, auction, dec!(1000)).await;
    assert!(matches!(result, Err(AppError::InsufficientFunds)));

    // 롤백 확인: 잔액, 홀드, 원장, 경매 상태 모두 무변화
    assert_eq!(balance_of(&pool, carol).await, dec!(500));
    assert!(hold_statuses(&pool, auction, carol).await.is_empty());
    assert_eq!(journal_count(&pool, carol, "BID_HOLD").await, 0);
    let high: Decimal =
        sqlx::query_scalar("SELECT current_highest_bid FROM auctions WHERE id = $1")
            .bind(auction)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(high, dec!(100));
}

#[tokio::test]
#[ignore]
async fn test_bid_after_end_time_is_rejected() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let alice = seed_user(&pool, "alice", dec!(10000)).await;
    // 종료 시각은 지났지만 상태는 아직 ACTIVE인 경매
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::seconds(-1)).await;

    let result = engine.place_bid(alice, auction, dec!(1500)).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
#[ignore]
async fn test_expired_auction_finalizes_with_winner() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let bob = seed_user(&pool, "bob", dec!(10000)).await;
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::seconds(2)).await;

    engine.place_bid(bob, auction, dec!(2000)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    engine.finalize_if_expired(auction).await.unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM auctions WHERE id = $1")
        .bind(auction)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "ENDED");
    assert_eq!(hold_statuses(&pool, auction, bob).await, vec!["HARD"]);

    let (settlement_amount, settlement_status): (Decimal, String) =
        sqlx::query_as("SELECT amount, status FROM settlements WHERE auction_id = $1")
            .bind(auction)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(settlement_amount, dec!(2000));
    assert_eq!(settlement_status, "PENDING");

    // 멱등성: 두 번째 호출은 아무 것도 바꾸지 않는다
    engine.finalize_if_expired(auction).await.unwrap();
    let settlements: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM settlements WHERE auction_id = $1")
            .bind(auction)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(settlements, 1);
}

#[tokio::test]
#[ignore]
async fn test_finalize_without_bids_creates_no_settlement() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::seconds(-1)).await;

    engine.finalize_if_expired(auction).await.unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM auctions WHERE id = $1")
        .bind(auction)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "ENDED");

    let settlements: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM settlements WHERE auction_id = $1")
            .bind(auction)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(settlements, 0);

    // 정산이 없으므로 승인 요청은 NotFound
    let result = engine.approve_settlement(seller, auction).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_dual_approval_settlement() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let dan = seed_user(&pool, "dan", dec!(0)).await;
    let bob = seed_user(&pool, "bob", dec!(10000)).await;
    let eve = seed_user(&pool, "eve", dec!(10000)).await;
    let auction = seed_auction(&pool, dan, dec!(1000), Duration::seconds(-1)).await;

    // 만료 전 입찰이 불가능하므로 낙찰 상태를 직접 구성한다
    sqlx::query(
        "UPDATE auctions SET current_highest_bid = $1, highest_bidder_id = $2 WHERE id = $3",
    )
    .bind(dec!(2000))
    .bind(bob)
    .bind(auction)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO bid_holds (auction_id, user_id, amount, status) VALUES ($1, $2, $3, 'SOFT')",
    )
    .bind(auction)
    .bind(bob)
    .bind(dec!(2000))
    .execute(&pool)
    .await
    .unwrap();

    engine.finalize_if_expired(auction).await.unwrap();

    // 낙찰자 단독 승인: 아직 PENDING
    let first = engine.approve_settlement(bob, auction).await.unwrap();
    assert!(!first.both_approved);
    assert!(first.winner_approved);
    assert!(!first.seller_approved);
    assert_eq!(first.status, SettlementStatus::Pending);

    // 같은 쪽의 중복 승인은 Conflict
    let repeat = engine.approve_settlement(bob, auction).await;
    assert!(matches!(repeat, Err(AppError::Conflict(_))));

    // 제3자는 Forbidden
    let outsider = engine.approve_settlement(eve, auction).await;
    assert!(matches!(outsider, Err(AppError::Forbidden(_))));

    // 판매자 승인: 이체 실행
    let second = engine.approve_settlement(dan, auction).await.unwrap();
    assert!(second.both_approved);
    assert_eq!(second.status, SettlementStatus::Completed);
    assert_eq!(balance_of(&pool, dan).await, dec!(2000));
    assert_eq!(hold_statuses(&pool, auction, bob).await, vec!["SETTLED"]);
    assert_eq!(journal_count(&pool, bob, "TRANSFER").await, 1);
    assert_eq!(journal_count(&pool, dan, "TRANSFER").await, 1);

    // 완료 이후 추가 승인은 Conflict, 판매자 입금은 한 번뿐
    let after = engine.approve_settlement(bob, auction).await;
    assert!(matches!(after, Err(AppError::Conflict(_))));
    assert_eq!(balance_of(&pool, dan).await, dec!(2000));
}

#[tokio::test]
#[ignore]
async fn test_deposit_is_idempotent_by_reference() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let user = seed_user(&pool, "user", dec!(0)).await;
    let reference = format!("UPI-{}", Uuid::new_v4());

    let first = engine.deposit(user, dec!(100), Some(reference.clone())).await.unwrap();
    assert_eq!(first.new_balance, dec!(100));

    let second = engine.deposit(user, dec!(100), Some(reference)).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));

    // 잔액은 정확히 한 번만 증가
    assert_eq!(balance_of(&pool, user).await, dec!(100));
    assert_eq!(journal_count(&pool, user, "DEPOSIT").await, 1);
}

#[tokio::test]
#[ignore]
async fn test_withdraw_requires_sufficient_balance() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let user = seed_user(&pool, "user", dec!(300)).await;

    let ok = engine.withdraw(user, dec!(200), "upi@test".to_string()).await.unwrap();
    assert_eq!(ok.new_balance, dec!(100));

    let over = engine.withdraw(user, dec!(200), "upi@test".to_string()).await;
    assert!(matches!(over, Err(AppError::InsufficientFunds)));
    assert_eq!(balance_of(&pool, user).await, dec!(100));
}

#[tokio::test]
#[ignore]
async fn test_self_outbid_releases_prior_hold() {
    let pool = test_pool().await;
    let engine = AuctionEngine::new(pool.clone());

    let seller = seed_user(&pool, "seller", dec!(0)).await;
    let alice = seed_user(&pool, "alice", dec!(10000)).await;
    let auction = seed_auction(&pool, seller, dec!(1000), Duration::hours(1)).await;

    engine.place_bid(alice, auction, dec!(1500)).await.unwrap();
    let commit = engine.place_bid(alice, auction, dec!(2000)).await.unwrap();

    // 자기 자신 재입찰: 이전 홀드는 해제되고 순 차감은 새 입찰액뿐
    assert_eq!(balance_of(&pool, alice).await, dec!(8000));
    assert_eq!(
        hold_statuses(&pool, auction, alice).await,
        vec!["RELEASED", "SOFT"]
    );
    assert_eq!(journal_count(&pool, alice, "REFUND").await, 1);
    assert_eq!(journal_count(&pool, alice, "BID_HOLD").await, 2);

    // 자기 자신에게는 outbid 알림을 보내지 않는다
    assert!(commit.displaced.is_none());
}
