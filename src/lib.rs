//! xAuction — 실시간 P2P 경매 마켓플레이스 백엔드
//!
//! 핵심 구성 요소:
//! - `auction_engine`: 입찰/종료/정산/입출금 상태 전이 (단일 트랜잭션)
//! - `hub`: 프로세스 로컬 WebSocket 연결 레지스트리와 팬아웃
//! - `db`: PostgreSQL 스키마, 행 모델, 읽기 전용 저장소
//! - `api`: REST/WebSocket 핸들러와 라우팅

pub mod api;
pub mod auction_engine;
pub mod db;
pub mod error;
pub mod hub;
pub mod server;
