use std::env;
use std::sync::Arc;

use axum::Router;
use log::info;
use sqlx::postgres::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::create_api_router;
use crate::auction_engine::AuctionEngine;
use crate::db;
use crate::hub::Hub;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/xauction".to_string(),
        }
    }
}

impl ServerConfig {
    /// 환경 변수에서 설정 로드 (PORT, DATABASE_URL)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        }
    }
}

/// 서버 상태
#[derive(Clone)]
pub struct ServerState {
    pub pool: PgPool,
    pub hub: Arc<Hub>,
    pub engine: AuctionEngine,
}

/// 서버 시작
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 xAuction 서버 시작 중...");

    // 데이터베이스 초기화
    let pool = db::init_database(&config.database_url).await?;

    // 연결 허브 초기화 (이벤트 루프는 전용 태스크로 실행)
    let hub = Hub::new(pool.clone());
    tokio::spawn(hub.clone().run());
    println!("✅ 연결 허브 시작 완료");

    let state = ServerState {
        engine: AuctionEngine::new(pool.clone()),
        pool,
        hub,
    };

    let app = Router::new()
        .merge(create_api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("서버 수신 대기: {}", addr);
    println!("✅ REST/WebSocket 서버 수신 대기: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
