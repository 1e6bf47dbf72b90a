//! Application configuration
//!
//! Defaults target a real HC-05 over BlueZ. Every field can be overridden
//! from the environment, see [`SessionConfig::from_env`].

use crate::transport::DeviceTarget;
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use vitals_shared::link::{DEFAULT_DEVICE_NAME, FALLBACK_RFCOMM_CHANNEL, READ_CHUNK_SIZE};

/// How the byte stream to the sensor is obtained
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Real RFCOMM link through BlueZ (requires the `bluez` feature)
    #[default]
    Rfcomm,
    /// TCP stand-in served by `device-sim`
    TcpSimulation,
    /// Device node already bound to the HC-05
    Serial,
}

impl FromStr for LinkMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rfcomm" | "bluetooth" => Ok(LinkMode::Rfcomm),
            "sim" | "tcp" => Ok(LinkMode::TcpSimulation),
            "serial" => Ok(LinkMode::Serial),
            other => Err(anyhow!("unknown link mode '{}'", other)),
        }
    }
}

/// Configuration for a link session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Link backend
    pub mode: LinkMode,
    /// Expected device name among paired devices
    pub device_name: String,
    /// Configured device address (MAC), accepted besides the name
    pub device_address: Option<String>,
    /// RFCOMM channel for the fallback connection
    pub rfcomm_channel: u8,
    /// TCP simulation address (when mode is TcpSimulation)
    pub sim_address: String,
    /// Serial device node (when mode is Serial)
    pub serial_port: String,
    /// Serial baud rate
    pub serial_baud: u32,
    /// Bytes requested per read
    pub read_chunk_size: usize,
    /// Cap on an unterminated line, `None` for unbounded
    pub max_line_bytes: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: LinkMode::default(),
            device_name: DEFAULT_DEVICE_NAME.into(),
            device_address: None,
            rfcomm_channel: FALLBACK_RFCOMM_CHANNEL,
            sim_address: "127.0.0.1:9000".into(),
            serial_port: "/dev/rfcomm0".into(),
            serial_baud: crate::transport::serial::DEFAULT_BAUD,
            read_chunk_size: READ_CHUNK_SIZE,
            max_line_bytes: Some(4096),
        }
    }
}

impl SessionConfig {
    /// Build a configuration from `VITALS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("VITALS_LINK") {
            config.mode = mode.parse()?;
        }
        if let Some(name) = lookup("VITALS_DEVICE_NAME") {
            config.device_name = name;
        }
        if let Some(address) = lookup("VITALS_DEVICE_ADDRESS") {
            let address = address.trim().to_string();
            config.device_address = (!address.is_empty()).then_some(address);
        }
        if let Some(channel) = lookup("VITALS_RFCOMM_CHANNEL") {
            config.rfcomm_channel = parse_number("VITALS_RFCOMM_CHANNEL", &channel)?;
        }
        if let Some(addr) = lookup("VITALS_SIM_ADDR") {
            config.sim_address = addr;
        }
        if let Some(port) = lookup("VITALS_SERIAL_PORT") {
            config.serial_port = port;
        }
        if let Some(baud) = lookup("VITALS_SERIAL_BAUD") {
            config.serial_baud = parse_number("VITALS_SERIAL_BAUD", &baud)?;
        }
        if let Some(max) = lookup("VITALS_MAX_LINE_BYTES") {
            let max: usize = parse_number("VITALS_MAX_LINE_BYTES", &max)?;
            config.max_line_bytes = (max > 0).then_some(max);
        }

        Ok(config)
    }

    /// The paired device this configuration selects
    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            name: self.device_name.clone(),
            address: self.device_address.clone(),
        }
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {}: '{}'", key, value))
}
