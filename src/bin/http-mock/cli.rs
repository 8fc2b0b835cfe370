//! Command-line interface definitions for the HTTP mock server.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;

/// Command-line arguments for the HTTP mock server.
#[derive(Debug, Parser)]
#[command(name = "http-mock")]
#[command(
    author,
    version,
    about = "HTTP mock server answering requests from YAML mock definitions"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Path to YAML mock definitions
    #[arg(long)]
    pub mocks: Option<PathBuf>,

    /// Answer CORS preflight requests and add CORS headers to responses
    #[arg(long)]
    pub cors: bool,

    /// Allowed CORS origin (implies --cors)
    #[arg(long)]
    pub cors_origin: Option<String>,

    /// Status returned when no mock matches
    #[arg(long, value_parser = parse_status, default_value = "418")]
    pub no_match_status: StatusCode,

    /// Default timeout for forwarding replies (e.g. 500ms, 10s)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub forward_timeout: Duration,

    /// Seed for random replies, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop matching at the first matcher evaluation failure
    #[arg(long)]
    pub fail_fast: bool,
}

/// Parse a numeric HTTP status code.
///
/// # Errors
///
/// Returns error if the input is not a status code between 100 and 999.
fn parse_status(s: &str) -> Result<StatusCode, String> {
    let code: u16 = s.parse().map_err(|e| format!("invalid status code: {e}"))?;
    StatusCode::from_u16(code).map_err(|e| format!("invalid status code: {e}"))
}
