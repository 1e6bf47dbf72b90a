//! TCP transport used to simulate the HC-05 during development

use crate::transport::traits::{ConnectStrategy, DeviceAdapter, PairedDevice, TransportStream};
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::info;
use vitals_shared::LinkError;

#[async_trait]
impl TransportStream for TcpStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Connects to a simulated device over TCP, ignoring the device address
pub struct TcpStrategy {
    address: String,
}

impl TcpStrategy {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl ConnectStrategy for TcpStrategy {
    async fn connect(&self, device: &PairedDevice) -> Result<Box<dyn TransportStream>, LinkError> {
        info!("[LINK] Simulating {} over TCP at {}", device.address, self.address);
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| LinkError::from_connect_io(&e))?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "TCP simulation"
    }
}

/// Adapter with a fixed, always-powered pairing list
///
/// Stands in for the radio when the link is simulated or already bound
/// to a serial node.
#[derive(Debug, Clone, Default)]
pub struct StaticAdapter {
    devices: Vec<PairedDevice>,
}

impl StaticAdapter {
    pub fn new(devices: Vec<PairedDevice>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceAdapter for StaticAdapter {
    async fn is_powered(&self) -> Result<bool, LinkError> {
        Ok(true)
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, LinkError> {
        Ok(self.devices.clone())
    }
}
