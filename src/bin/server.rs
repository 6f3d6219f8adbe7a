//! HTTP server for the prequalification SQL agent
//! Simple HTTP server using tokio and basic HTTP handling

use clap::Parser;
use prequal_sql_agent::api::handle_request;
use prequal_sql_agent::config::AppConfig;
use prequal_sql_agent::{Catalog, QueryAgent};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

const MAX_REQUEST_BYTES: usize = 1_000_000;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "HTTP surface for generating and running prequalification reports")]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let bind = args.bind.unwrap_or_else(|| config.bind_addr.clone());

    info!(llm_url = %config.llm_url, model = %config.llm_model, "service starting");
    let agent = Arc::new(QueryAgent::from_config(&config, Arc::new(Catalog::standard()))?);

    let listener = TcpListener::bind(&bind).await?;
    info!(%bind, "server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        let agent = agent.clone();
        let span = info_span!("connection", %addr, request_id = %uuid::Uuid::new_v4());
        tokio::spawn(handle_connection(stream, agent).instrument(span));
    }
}

async fn handle_connection(mut stream: TcpStream, agent: Arc<QueryAgent>) {
    // Read request with timeout to prevent hanging
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if let Some(headers_end) = find_headers_end(&buffer) {
                        let head = String::from_utf8_lossy(&buffer[..headers_end]);
                        let content_length = extract_content_length(&head).unwrap_or(0);
                        if buffer.len() >= headers_end + content_length {
                            break;
                        }
                    }
                    if buffer.len() > MAX_REQUEST_BYTES {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("request read timeout");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read from stream");
            return;
        }
        Ok(Ok(())) => {}
    }
    if buffer.is_empty() {
        return;
    }

    let request = String::from_utf8_lossy(&buffer).into_owned();
    let response = match parse_request(&request) {
        Some((method, target, body)) => {
            info!(method, target, "request");
            let api = handle_request(&agent, method, target, body).await;
            create_response(api.status, &api.body)
        }
        None => create_response(
            400,
            &serde_json::json!({"status": "error", "error_kind": "invalid_input", "error": "Malformed request"}),
        ),
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!(error = %e, "failed to write response");
    }
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn extract_content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Split into method, request target and body.
fn parse_request(request: &str) -> Option<(&str, &str, &str)> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let body = request
        .find("\r\n\r\n")
        .map(|idx| &request[idx + 4..])
        .unwrap_or("");
    Some((method, target, body))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

fn create_response(status: u16, body: &serde_json::Value) -> String {
    let body = if body.is_null() {
        String::new()
    } else {
        body.to_string()
    };
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Access-Control-Allow-Credentials: true\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        reason_phrase(status),
        body.len(),
        body
    )
}
