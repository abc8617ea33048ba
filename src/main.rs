use log::error;

use xauction::server::{start_server, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ServerConfig::from_env();

    if let Err(err) = start_server(config).await {
        error!("서버 실행 오류: {}", err);
        std::process::exit(1);
    }
}
