//! Greeter demo server.
//!
//! Serves the greeter procedures over HTTP, or prints the generated
//! OpenAPI document and exits.

use anyhow::{Context, Result};
use clap::Parser;
use causeway_rest_gateway::GatewayConfig;
use greeter::{build_gateway, UserStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "greeter")]
#[command(about = "Greeter demo over the causeway REST gateway", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Print the OpenAPI document and exit
    #[arg(long)]
    print_openapi: bool,

    /// Largest accepted request body in bytes (0 disables the limit)
    #[arg(long, default_value_t = causeway_rest_gateway::config::DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Path the OpenAPI document is served at
    #[arg(long, default_value = "/openapi.json")]
    openapi_path: String,

    /// Include internal error messages in responses
    #[arg(long)]
    expose_internal_errors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = GatewayConfig {
        max_body_size: (args.max_body_size > 0).then_some(args.max_body_size),
        expose_internal_errors: args.expose_internal_errors,
        openapi_path: Some(args.openapi_path.clone()),
        ..GatewayConfig::default()
    };

    let gateway = build_gateway(config, Arc::new(UserStore::new()))
        .context("Invalid procedure definitions")?;

    if args.print_openapi {
        let json = gateway
            .document()
            .to_json_pretty()
            .context("Failed to serialize OpenAPI document")?;
        println!("{}", json);
        return Ok(());
    }

    info!(
        "Serving {} routes on http://{} (document at {})",
        gateway.route_count(),
        args.addr,
        args.openapi_path
    );

    let app = gateway.into_router().layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
