//! Serial-node transport for an HC-05 already bound by the OS
//! (for example `rfcomm bind /dev/rfcomm0 <addr> 1`)

use crate::transport::traits::{ConnectStrategy, PairedDevice, TransportStream};
use anyhow::Result;
use async_trait::async_trait;
use std::io;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;
use vitals_shared::LinkError;

/// Baud rate the HC-05 ships with in data mode
pub const DEFAULT_BAUD: u32 = 9600;

#[async_trait]
impl TransportStream for SerialStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

fn map_serial_error(err: tokio_serial::Error) -> LinkError {
    match err.kind {
        tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => LinkError::PermissionDenied,
        _ => LinkError::ConnectFailed(err.to_string()),
    }
}

/// Opens a serial device node
pub struct SerialStrategy {
    port: String,
    baud: u32,
}

impl SerialStrategy {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
        }
    }
}

#[async_trait]
impl ConnectStrategy for SerialStrategy {
    async fn connect(&self, device: &PairedDevice) -> Result<Box<dyn TransportStream>, LinkError> {
        info!(
            "[LINK] Opening {} at {} baud for {}",
            self.port, self.baud, device.address
        );
        let stream = tokio_serial::new(&self.port, self.baud)
            .open_native_async()
            .map_err(map_serial_error)?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "serial node"
    }
}
