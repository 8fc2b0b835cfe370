//! # HTTP Mock Server CLI
//!
//! Runs the mock server with mocks loaded from a YAML definition file.

use std::io;
use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use http_mock_rs::definitions::MockBook;
use http_mock_rs::http::{build_router, AppState};
use http_mock_rs::CorsPolicy;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let mut builder = AppState::builder()
        .with_no_match_status(cli.no_match_status)
        .with_forward_timeout(cli.forward_timeout)
        .with_fail_fast(cli.fail_fast);

    if cli.cors || cli.cors_origin.is_some() {
        let mut cors = CorsPolicy::new();
        if let Some(origin) = &cli.cors_origin {
            cors = cors.allow_origin(origin.clone());
        }
        builder = builder.with_cors(cors);
    }
    if let Some(seed) = cli.seed {
        builder = builder.with_seed(seed);
    }

    let state = builder.build()?;

    // Can run without a file: every request then gets the no-match response
    if let Some(path) = &cli.mocks {
        let book = MockBook::load_from_path(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let handles = book
            .register_all(&state.dispatcher)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        tracing::info!("loaded {} mock(s) from {}", handles.len(), path.display());
    }

    let app = build_router(state);

    let addr: SocketAddr = cli.listen.parse().map_err(io::Error::other)?;
    tracing::info!("starting http-mock on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
