//! RFCOMM transport for the HC-05 through BlueZ

use crate::transport::traits::{ConnectStrategy, DeviceAdapter, PairedDevice, TransportStream};
use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, Address, Session, Uuid};
use futures::StreamExt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};
use vitals_shared::link::{FALLBACK_RFCOMM_CHANNEL, SPP_UUID_U128};
use vitals_shared::LinkError;

/// Serial Port Profile service UUID
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(SPP_UUID_U128);

/// Map a BlueZ error raised while connecting
fn map_bluer_error(err: bluer::Error) -> LinkError {
    match err.kind {
        bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
            LinkError::PermissionDenied
        }
        _ => LinkError::ConnectFailed(err.to_string()),
    }
}

fn parse_address(device: &PairedDevice) -> Result<Address, LinkError> {
    device
        .address
        .parse::<Address>()
        .map_err(|_| LinkError::ConnectFailed(format!("invalid address {}", device.address)))
}

/// Open the default adapter
async fn default_adapter() -> Result<(Session, Adapter), LinkError> {
    let session = Session::new().await.map_err(|e| {
        debug!("[BT] No BlueZ session: {}", e);
        LinkError::AdapterUnavailable
    })?;
    let adapter = session.default_adapter().await.map_err(|e| {
        debug!("[BT] No default adapter: {}", e);
        LinkError::AdapterUnavailable
    })?;
    Ok((session, adapter))
}

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    /// Keeps the SPP profile registered while the stream is open
    _profile: Option<ProfileHandle>,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream) -> Self {
        Self {
            inner: stream,
            _profile: None,
        }
    }

    fn with_profile(stream: RfcommStream, profile: ProfileHandle) -> Self {
        Self {
            inner: stream,
            _profile: Some(profile),
        }
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for RfcommTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// The local BlueZ adapter
#[derive(Debug, Default)]
pub struct BluezAdapter;

impl BluezAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceAdapter for BluezAdapter {
    async fn is_powered(&self) -> Result<bool, LinkError> {
        let (_session, adapter) = default_adapter().await?;
        adapter
            .is_powered()
            .await
            .map_err(|_| LinkError::AdapterUnavailable)
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, LinkError> {
        let (_session, adapter) = default_adapter().await?;
        let addresses = adapter.device_addresses().await.map_err(map_bluer_error)?;

        let mut devices = Vec::new();
        for addr in addresses {
            let device = match adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    debug!("[BT] Skipping {}: {}", addr, e);
                    continue;
                }
            };
            if !device.is_paired().await.unwrap_or(false) {
                continue;
            }
            let name = device.name().await.ok().flatten();
            devices.push(PairedDevice {
                name,
                address: addr.to_string(),
            });
        }

        debug!("[BT] {} paired device(s)", devices.len());
        Ok(devices)
    }
}

/// Primary strategy: connect through the SPP service record
///
/// Registers the SPP profile as a client and asks BlueZ to connect it, which
/// resolves the RFCOMM channel from the device's SDP record.
#[derive(Debug, Default)]
pub struct ServiceRecordStrategy;

impl ServiceRecordStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectStrategy for ServiceRecordStrategy {
    async fn connect(&self, device: &PairedDevice) -> Result<Box<dyn TransportStream>, LinkError> {
        let target_addr = parse_address(device)?;
        let (session, adapter) = default_adapter().await?;

        let profile = Profile {
            uuid: SPP_SERVICE_UUID,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = session.register_profile(profile).await.map_err(map_bluer_error)?;
        let bt_device = adapter.device(target_addr).map_err(map_bluer_error)?;

        info!("[BT] Connecting to {} via SPP service record", target_addr);

        let request = tokio::select! {
            req = handle.next() => req,
            res = bt_device.connect_profile(&SPP_SERVICE_UUID) => {
                res.map_err(map_bluer_error)?;
                handle.next().await
            }
        };
        let request = request
            .ok_or_else(|| LinkError::ConnectFailed("SPP profile closed".into()))?;
        let stream = request
            .accept()
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;

        info!("[BT] Connected to {}", target_addr);
        Ok(Box::new(RfcommTransportStream::with_profile(stream, handle)))
    }

    fn name(&self) -> &'static str {
        "SPP service record"
    }
}

/// Fallback strategy: open a fixed RFCOMM channel directly
#[derive(Debug)]
pub struct ChannelStrategy {
    channel: u8,
}

impl ChannelStrategy {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }
}

impl Default for ChannelStrategy {
    fn default() -> Self {
        Self::new(FALLBACK_RFCOMM_CHANNEL)
    }
}

#[async_trait]
impl ConnectStrategy for ChannelStrategy {
    async fn connect(&self, device: &PairedDevice) -> Result<Box<dyn TransportStream>, LinkError> {
        let target_addr = parse_address(device)?;
        let socket_addr = RfcommAddr::new(target_addr, self.channel);
        info!("[BT] Connecting to {} channel {}", target_addr, self.channel);

        let stream = RfcommStream::connect(socket_addr).await.map_err(|e| {
            warn!("[BT] RFCOMM connect failed: {}", e);
            LinkError::from_connect_io(&e)
        })?;

        info!("[BT] Connected to {}", target_addr);
        Ok(Box::new(RfcommTransportStream::new(stream)))
    }

    fn name(&self) -> &'static str {
        "RFCOMM channel"
    }
}
