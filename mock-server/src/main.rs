use log::info;
use mock_server::{MockConfig, MockState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let mut config = MockConfig::default();
    if let Some(page_size) = std::env::var("PAGE_SIZE").ok().and_then(|v| v.parse().ok()) {
        config.page_size = page_size;
    }
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr} (page size {})", config.page_size);
    mock_server::run_with(listener, MockState::new(config)).await
}
