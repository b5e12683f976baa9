use tambola::{GuestAuthenticator, TambolaServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("TAMBOLA_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:9090".to_string());

    let server = TambolaServer::builder()
        .bind(&addr)
        .build(GuestAuthenticator)
        .await?;
    server.run().await?;
    Ok(())
}
