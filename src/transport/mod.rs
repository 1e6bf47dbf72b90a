#[cfg(feature = "bluez")]
pub mod rfcomm;
pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(feature = "bluez")]
pub use rfcomm::{BluezAdapter, ChannelStrategy, ServiceRecordStrategy};
pub use serial::SerialStrategy;
pub use tcp::{StaticAdapter, TcpStrategy};
pub use traits::{ConnectStrategy, DeviceAdapter, DeviceTarget, PairedDevice, TransportStream};
