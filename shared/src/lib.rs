//! Vitals Monitor Shared Types
//!
//! This crate provides the transport-agnostic pieces of the vitals link:
//! line framing, telemetry parsing and the connection state machine.

pub mod codec;
pub mod error;
pub mod state_machine;
pub mod telemetry;

pub use codec::FrameAssembler;
pub use error::LinkError;
pub use state_machine::{ConnectionState, ConnectionStateMachine, SessionTrigger, TransitionResult};
pub use telemetry::TelemetryReading;

/// Link parameters for the HC-05 serial bridge
pub mod link {
    /// Standard Serial Port Profile service identifier
    pub const SPP_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

    /// Same identifier as a 128-bit value
    pub const SPP_UUID_U128: u128 = 0x0000_1101_0000_1000_8000_0080_5F9B_34FB;

    /// Name the HC-05 module advertises out of the box
    pub const DEFAULT_DEVICE_NAME: &str = "HC-05";

    /// RFCOMM channel used when the service record lookup fails
    pub const FALLBACK_RFCOMM_CHANNEL: u8 = 1;

    /// Bytes requested per transport read
    pub const READ_CHUNK_SIZE: usize = 1024;

    /// Value shown for a vital with no current reading
    pub const PLACEHOLDER: &str = "--";
}
