mod config;
mod display;
mod session;
mod transport;

use anyhow::Result;
use config::{LinkMode, SessionConfig};
use display::VitalsDisplay;
use session::{ConnectionSession, SessionEvent};
use std::sync::Arc;
use transport::{
    ConnectStrategy, DeviceAdapter, PairedDevice, SerialStrategy, StaticAdapter, TcpStrategy,
};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Adapter plus the ordered strategies to try
type Link = (Arc<dyn DeviceAdapter>, Vec<Box<dyn ConnectStrategy>>);

/// Address reported for links that do not come from the pairing database
const LOCAL_LINK_ADDRESS: &str = "00:00:00:00:00:00";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = SessionConfig::from_env()?;

    info!("Vitals monitor starting");
    info!("  Link: {:?}", config.mode);
    info!("  Device: {}", config.device_name);
    if let Some(ref address) = config.device_address {
        info!("  Address: {}", address);
    }

    let (adapter, strategies) = build_link(&config)?;
    let mut session = ConnectionSession::new(config, adapter, strategies);
    session.start().await?;

    let mut view = VitalsDisplay::new();

    // Main event loop
    loop {
        tokio::select! {
            event = session.recv() => match event {
                Some(event) => {
                    handle_event(&mut view, &event);
                }
                None => {
                    info!("[MAIN] Session finished");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[MAIN] Shutting down (read loop running: {})", session.is_running());
                break;
            }
        }
    }

    session.stop().await;
    info!(
        "[MAIN] Session {} with status '{}'",
        session.state().await,
        view.status()
    );
    Ok(())
}

fn handle_event(view: &mut VitalsDisplay, event: &SessionEvent) -> bool {
    let vitals_changed = view.apply(event);

    match event {
        SessionEvent::StatusChanged(text) => info!("[MAIN] Status: {}", text),
        SessionEvent::Connected => info!("[MAIN] Connected, waiting for readings"),
        SessionEvent::Disconnected { reason } => warn!("[MAIN] Disconnected: {}", reason),
        SessionEvent::Failed(err) => error!("[MAIN] {}", err),
        SessionEvent::TelemetryUpdate(_) => {}
    }

    if vitals_changed {
        info!("[MAIN] {}", view);
    }
    vitals_changed
}

/// Pick the adapter and ordered connection strategies for the link mode
fn build_link(config: &SessionConfig) -> Result<Link> {
    if config.mode == LinkMode::Rfcomm {
        return rfcomm_link(config);
    }

    // Simulated and serial links have no pairing database to consult
    let address = config
        .device_address
        .clone()
        .unwrap_or_else(|| LOCAL_LINK_ADDRESS.into());
    let adapter: Arc<dyn DeviceAdapter> = Arc::new(StaticAdapter::new(vec![PairedDevice::new(
        Some(config.device_name.as_str()),
        address,
    )]));

    let strategy: Box<dyn ConnectStrategy> = match config.mode {
        LinkMode::Serial => Box::new(SerialStrategy::new(
            config.serial_port.clone(),
            config.serial_baud,
        )),
        _ => Box::new(TcpStrategy::new(config.sim_address.clone())),
    };

    Ok((adapter, vec![strategy]))
}

#[cfg(feature = "bluez")]
fn rfcomm_link(config: &SessionConfig) -> Result<Link> {
    use transport::{BluezAdapter, ChannelStrategy, ServiceRecordStrategy};

    let adapter: Arc<dyn DeviceAdapter> = Arc::new(BluezAdapter::new());
    let strategies: Vec<Box<dyn ConnectStrategy>> = vec![
        Box::new(ServiceRecordStrategy::new()),
        Box::new(ChannelStrategy::new(config.rfcomm_channel)),
    ];
    Ok((adapter, strategies))
}

#[cfg(not(feature = "bluez"))]
fn rfcomm_link(_config: &SessionConfig) -> Result<Link> {
    Err(anyhow::anyhow!(
        "RFCOMM links need the `bluez` feature; set VITALS_LINK=sim or serial"
    ))
}
