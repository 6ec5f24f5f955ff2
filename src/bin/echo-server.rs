//! Echo upstream for trying the proxy by hand.
//!
//! `/echo` answers 200 with the request headers and body reflected back.

use axum::{
    body::Bytes,
    http::{
        header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING},
        HeaderMap, StatusCode,
    },
    routing::any,
    Router,
};
use clap::Parser;

#[derive(Parser)]
#[command(name = "echo-server")]
#[command(about = "Reflects request headers and body", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    bind: String,
}

async fn echo(mut headers: HeaderMap, body: Bytes) -> (StatusCode, HeaderMap, Bytes) {
    // Framing is recomputed for the reflected body.
    for name in [CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING] {
        headers.remove(name);
    }
    (StatusCode::OK, headers, body)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt::init();

    let app = Router::new().route("/echo", any(echo));

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Echo server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
