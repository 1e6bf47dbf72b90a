//! Transport seams: byte streams, connection strategies and the adapter
//! that lists paired devices

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use vitals_shared::LinkError;

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// One way of opening a byte stream to a paired device
///
/// A session holds an ordered list of strategies and tries them in turn.
#[async_trait]
pub trait ConnectStrategy: Send + Sync {
    /// Attempt to connect, returning a stream on success
    async fn connect(&self, device: &PairedDevice) -> Result<Box<dyn TransportStream>, LinkError>;

    /// Human-readable name for this strategy
    fn name(&self) -> &'static str;
}

/// Local radio adapter as seen by the session
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Whether the adapter is switched on
    ///
    /// Fails with [`LinkError::AdapterUnavailable`] when there is no adapter.
    async fn is_powered(&self) -> Result<bool, LinkError>;

    /// Devices the platform already knows as paired. No scanning is done.
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, LinkError>;
}

/// A device known to the platform's pairing database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// Advertised name, if the platform has one
    pub name: Option<String>,
    /// MAC address in `AA:BB:CC:DD:EE:FF` form
    pub address: String,
}

impl PairedDevice {
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
        }
    }
}

/// Which paired device a session should connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    /// Expected device name, compared case-insensitively
    pub name: String,
    /// Explicit address, also accepted when set
    pub address: Option<String>,
}

impl DeviceTarget {
    /// Check whether a paired device is the target
    pub fn matches(&self, device: &PairedDevice) -> bool {
        let name_matches = device
            .name
            .as_deref()
            .unwrap_or("")
            .eq_ignore_ascii_case(&self.name);
        let address_matches = self
            .address
            .as_deref()
            .is_some_and(|addr| addr.eq_ignore_ascii_case(&device.address));

        name_matches || address_matches
    }

    /// First matching device, in the order the platform listed them
    pub fn find<'a>(&self, devices: &'a [PairedDevice]) -> Option<&'a PairedDevice> {
        devices.iter().find(|device| self.matches(device))
    }
}
