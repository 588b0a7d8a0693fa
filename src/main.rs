use std::net::SocketAddr;

use clap::Parser;
use portal_gate::cli::{Args, build_config, init_logging, validate_backend_url};
use portal_gate::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(backend_url) = validate_backend_url(&args.backend_url, args.environment) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read local address");
            std::process::exit(1);
        }
    };

    let config = build_config(&args, backend_url);
    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build backend client");
        std::process::exit(1);
    });

    info!(
        address = %local_addr,
        backend = %config.backend_url,
        environment = ?config.environment,
        "Listening"
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
