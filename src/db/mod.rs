pub mod models;
pub mod repository;

use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;

pub use repository::{AuctionRepository, ChatRepository, WalletRepository};

/// PostgreSQL 데이터베이스 초기화 및 연결
pub async fn init_database(database_url: &str) -> Result<PgPool, SqlxError> {
    println!("🗄️  PostgreSQL 데이터베이스 초기화 중...");

    // 연결 풀 생성
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // 테이블 생성
    create_tables(&pool).await?;

    println!("✅ 데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 생성
///
/// 상태 컬럼은 CHECK 제약으로 문자열 집합을 강제하고, 금액 컬럼은
/// 소수점 둘째 자리 고정 NUMERIC(12,2)를 사용합니다.
pub async fn create_tables(pool: &PgPool) -> Result<(), SqlxError> {
    // 사용자 테이블 (지갑 잔액 포함)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            wallet_balance NUMERIC(12,2) NOT NULL DEFAULT 0 CHECK (wallet_balance >= 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 상품 테이블 (CRUD는 외부 컴포넌트 담당, 경매가 참조만 함)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            seller_id UUID NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            image_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 경매 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS auctions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            product_id UUID NOT NULL REFERENCES products(id),
            seller_id UUID NOT NULL REFERENCES users(id),
            start_price NUMERIC(12,2) NOT NULL,
            current_highest_bid NUMERIC(12,2) NOT NULL,
            highest_bidder_id UUID REFERENCES users(id),
            end_time TIMESTAMPTZ NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE'
                CHECK (status IN ('ACTIVE', 'ENDED', 'CANCELLED')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 입찰 기록 테이블 (append-only)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bids (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            auction_id UUID NOT NULL REFERENCES auctions(id),
            user_id UUID NOT NULL REFERENCES users(id),
            amount NUMERIC(12,2) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 입찰 보증금(홀드) 테이블: SOFT → HARD → SETTLED / RELEASED
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bid_holds (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            auction_id UUID NOT NULL REFERENCES auctions(id),
            user_id UUID NOT NULL REFERENCES users(id),
            amount NUMERIC(12,2) NOT NULL,
            status TEXT NOT NULL DEFAULT 'SOFT'
                CHECK (status IN ('SOFT', 'HARD', 'RELEASED', 'SETTLED')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 거래 원장 테이블 (append-only, 감사 및 멱등성 검사용)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id),
            amount NUMERIC(12,2) NOT NULL,
            type TEXT NOT NULL
                CHECK (type IN ('DEPOSIT', 'WITHDRAW', 'BID_HOLD', 'REFUND', 'TRANSFER')),
            status TEXT NOT NULL DEFAULT 'COMPLETED'
                CHECK (status IN ('PENDING', 'COMPLETED', 'FAILED')),
            reference TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 정산 테이블 (경매당 정확히 하나)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settlements (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            auction_id UUID NOT NULL UNIQUE REFERENCES auctions(id),
            winner_id UUID NOT NULL REFERENCES users(id),
            seller_id UUID NOT NULL REFERENCES users(id),
            amount NUMERIC(12,2) NOT NULL,
            winner_approved_at TIMESTAMPTZ,
            seller_approved_at TIMESTAMPTZ,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'COMPLETED')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // 채팅 메시지 테이블 (본문/이미지 중 하나는 필수)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id TEXT NOT NULL,
            sender_id UUID NOT NULL REFERENCES users(id),
            body TEXT,
            image_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            CHECK (body IS NOT NULL OR image_url IS NOT NULL)
        )",
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bids_auction ON bids(auction_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bids_user ON bids(user_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bid_holds_auction ON bid_holds(auction_id, status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, created_at)")
        .execute(pool)
        .await?;

    // DEPOSIT 멱등성: 동일 참조 문자열로는 단 한 번만 입금
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_deposit_ref
         ON transactions(reference) WHERE type = 'DEPOSIT'",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_id, created_at)")
        .execute(pool)
        .await?;

    info!("테이블 생성 완료");

    Ok(())
}
