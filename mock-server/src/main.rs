use mock_server::Options;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_server=info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");

    // MOCK_USER / MOCK_PASSWORD turn on the Basic-auth guard.
    let credentials = std::env::var("MOCK_USER")
        .ok()
        .map(|user| (user, std::env::var("MOCK_PASSWORD").unwrap_or_default()));
    let options = Options {
        credentials,
        location_base: std::env::var("LOCATION_BASE").ok(),
    };

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, auth = options.credentials.is_some(), "listening");
    mock_server::run_with(listener, options).await
}
