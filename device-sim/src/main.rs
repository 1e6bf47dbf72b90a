//! HC-05 stand-in: serves telemetry lines over TCP for `VITALS_LINK=sim`

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vitals_shared::TelemetryReading;

/// Reading number `tick`, wandering around resting values
fn reading_at(tick: u64) -> TelemetryReading {
    let wave = (tick % 8) as i64 - 4;
    let heart_rate = 72 + wave;
    let spo2 = 97 + (tick % 3) as i64;
    let temp_tenths = 366 + wave.signum();

    // Every fifth line only carries the heart rate
    if tick % 5 == 4 {
        return TelemetryReading {
            heart_rate: Some(heart_rate.to_string()),
            ..Default::default()
        };
    }

    TelemetryReading {
        heart_rate: Some(heart_rate.to_string()),
        spo2: Some(spo2.to_string()),
        temperature: Some(format!("{}.{}", temp_tenths / 10, temp_tenths % 10)),
    }
}

async fn serve_client(mut socket: TcpStream, interval: Duration) {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    info!("[SIM] Client connected: {}", peer);

    let mut ticker = tokio::time::interval(interval);
    let mut tick = 0u64;
    loop {
        ticker.tick().await;
        let line = format!("{}\r\n", reading_at(tick).to_line());
        if let Err(e) = socket.write_all(line.as_bytes()).await {
            warn!("[SIM] Client {} gone: {}", peer, e);
            break;
        }
        tick += 1;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let listen = std::env::var("SIM_LISTEN").unwrap_or_else(|_| "0.0.0.0:9000".into());
    let interval_ms: u64 = match std::env::var("SIM_INTERVAL_MS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid SIM_INTERVAL_MS: '{}'", value))?,
        Err(_) => 1000,
    };
    let interval = Duration::from_millis(interval_ms.max(1));

    let listener = TcpListener::bind(&listen).await?;
    info!("[SIM] HC-05 simulator listening on {}", listen);

    loop {
        let (socket, _) = listener.accept().await?;
        tokio::spawn(serve_client(socket, interval));
    }
}
