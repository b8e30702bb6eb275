/// Academy: enquiry-to-enrollment admissions service
///
/// Main entry point. Loads `.env`, reads configuration from the environment
/// and starts the HTTP server.

use academy::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Auth, catalog, enquiry, enrollment and report APIs under /api/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    start_server(config).await?;

    Ok(())
}
