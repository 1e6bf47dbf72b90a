//! Link session management
//!
//! This module handles:
//! - Finding the sensor among already paired devices
//! - Connecting through an ordered list of strategies (primary, then fallback)
//! - The telemetry read loop and its line framing
//! - Lifecycle events for the consumer

mod manager;

pub use manager::{ConnectionSession, SessionEvent};
