//! Operator control surface.
//!
//! Deliberately minimal HTTP over a raw TCP listener; three routes:
//! `GET /status`, `POST /start`, `POST /stop`. Responses are JSON. The
//! engine itself never depends on this surface — it only reads engine
//! state and forwards the two idempotent transitions.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::settlement::SettlementEngine;

/// Serve the control endpoints until the task is dropped.
pub async fn serve_control(addr: &str, engine: Arc<SettlementEngine>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(target: "control", addr, "control surface listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, engine).await {
                warn!(target: "control", %peer, error = %err, "control request failed");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    engine: Arc<SettlementEngine>,
) -> anyhow::Result<()> {
    let mut buf = [0u8; 1024];
    let n = socket.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    let (status_line, body) = match (method, path) {
        ("GET", "/status") => {
            let status = engine.status().await;
            ("HTTP/1.1 200 OK", serde_json::to_string(&status)?)
        }
        ("POST", "/start") => {
            let running = Arc::clone(&engine).start();
            info!(target: "control", running, "start requested");
            ("HTTP/1.1 200 OK", format!("{{\"running\":{running}}}"))
        }
        ("POST", "/stop") => {
            let running = engine.stop();
            info!(target: "control", running, "stop requested");
            ("HTTP/1.1 200 OK", format!("{{\"running\":{running}}}"))
        }
        _ => (
            "HTTP/1.1 404 Not Found",
            "{\"error\":\"unknown route\"}".to_string(),
        ),
    };

    let response = format!(
        "{status_line}\r\nContent-Length: {}\r\nContent-Type: application/json\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}
