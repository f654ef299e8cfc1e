/// Caseway: hyperminimalist case-management workflow engine
///
/// Main entry point for the Caseway server. Initializes configuration and
/// starts the HTTP server with workflow management, record transitions, and
/// SLA monitoring.

use caseway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow definition API at /api/workflows/*
/// - Record and transition API at /api/records/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults plus CASEWAY_* environment overrides)
    let config = Config::default();

    // Start the server
    start_server(config).await?;

    Ok(())
}
