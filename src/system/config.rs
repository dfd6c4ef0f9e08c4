//! Configuration management for the ground station
//!
//! Loaded once at startup from a TOML file; every field has a default so a
//! missing key never stops the station.
//!
//! ```toml
//! robot_count = 3
//! robot_radius = 0.35
//! heartbeat_enabled = true
//! shape = [[0.0, 2.0, 0.0], [1.0, 2.0, 0.0], [2.0, 2.0, 0.0]]
//!
//! [transport]
//! kind = "serial"
//! port = "/dev/ttyUSB0"
//! baud = 57600
//! ```

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::control::formation::FormationShape;
use crate::error::ConfigError;
use crate::types::{Position, BROADCAST_ADDRESS, DEFAULT_STATION_ADDRESS, MAX_FLEET_SIZE};

/// Control loop rate
pub const CONTROL_RATE_HZ: u32 = 10;

/// Physical link to the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Outbound UDP datagrams to `address`
    Udp {
        #[serde(default = "default_udp_address")]
        address: String,
    },
    /// Serial radio
    Serial {
        #[serde(default = "default_serial_port")]
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
}

impl TransportConfig {
    /// Connection string in `mavlink` syntax
    pub fn connection_string(&self) -> String {
        match self {
            TransportConfig::Udp { address } => format!("udpout:{}", address),
            TransportConfig::Serial { port, baud } => format!("serial:{}:{}", port, baud),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Udp {
            address: default_udp_address(),
        }
    }
}

/// Ground station configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Number of robots in the fleet
    pub robot_count: usize,
    /// Robot radius (meters)
    pub robot_radius: f32,
    /// Maximum robot velocity (m/s)
    pub max_velocity: f32,
    /// Ground station wire address
    pub station_address: u8,
    /// Verbose logging
    pub debug: bool,
    /// Send 2 Hz ground-station heartbeats
    pub heartbeat_enabled: bool,
    /// Local frame origin broadcast by `origin` without coordinates
    pub origin: [f32; 3],
    /// East reference broadcast by `east` without coordinates
    pub east: [f32; 3],
    /// Formation slots, one per robot
    pub shape: Vec<[f32; 3]>,
    /// Pause between per-robot goal messages (milliseconds)
    pub burst_delay_ms: u64,
    /// Poll cap for non-blocking transports
    pub receive_poll_hz: u32,
    /// Report robots holding a mission barrier after this long (0 = never)
    pub stall_timeout_secs: u32,
    /// Link to the fleet
    pub transport: TransportConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            robot_count: 5,
            robot_radius: 0.5,
            max_velocity: 1.0,
            station_address: DEFAULT_STATION_ADDRESS,
            debug: false,
            heartbeat_enabled: false,
            origin: [0.0; 3],
            east: [0.0; 3],
            shape: Vec::new(),
            burst_delay_ms: 10,
            receive_poll_hz: 50,
            stall_timeout_secs: 30,
            transport: TransportConfig::default(),
        }
    }
}

fn default_udp_address() -> String {
    "127.0.0.1:30000".to_string()
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    57600
}

impl StationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: StationConfig = basic_toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.robot_count == 0 || self.robot_count > MAX_FLEET_SIZE {
            return Err(invalid(format!(
                "robot_count must be in 1..={}, got {}",
                MAX_FLEET_SIZE, self.robot_count
            )));
        }
        if self.station_address == BROADCAST_ADDRESS
            || usize::from(self.station_address) <= self.robot_count
        {
            return Err(invalid(format!(
                "station_address {} collides with the broadcast or robot addresses 0..={}",
                self.station_address, self.robot_count
            )));
        }
        if !self.robot_radius.is_finite() || self.robot_radius < 0.0 {
            return Err(invalid("robot_radius must be a non-negative number"));
        }
        if !self.max_velocity.is_finite() || self.max_velocity <= 0.0 {
            return Err(invalid("max_velocity must be positive"));
        }
        if self.shape.len() != self.robot_count {
            return Err(invalid(format!(
                "shape has {} slots for {} robots",
                self.shape.len(),
                self.robot_count
            )));
        }
        if let TransportConfig::Serial { baud: 0, .. } = self.transport {
            return Err(invalid("baud must be non-zero"));
        }
        Ok(())
    }

    /// Formation slots as a shape
    pub fn formation_shape(&self) -> Result<FormationShape, ConfigError> {
        let slots: Vec<Position> = self.shape.iter().copied().map(Position::from).collect();
        FormationShape::new(&slots).map_err(|e| invalid(e.to_string()))
    }

    /// Configured origin reference
    pub fn origin(&self) -> Position {
        Position::from(self.origin)
    }

    /// Configured east reference
    pub fn east(&self) -> Position {
        Position::from(self.east)
    }

    /// Pause between per-robot goal messages
    pub fn burst_delay(&self) -> Duration {
        Duration::from_millis(self.burst_delay_ms)
    }

    /// Stall report threshold in control ticks (0 = never)
    pub fn stall_timeout_ticks(&self) -> u32 {
        self.stall_timeout_secs.saturating_mul(CONTROL_RATE_HZ)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_robots() -> StationConfig {
        StationConfig {
            robot_count: 3,
            shape: vec![[0.0, 2.0, 0.0], [1.0, 2.0, 0.0], [2.0, 2.0, 0.0]],
            ..StationConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = StationConfig::default();
        assert_eq!(config.robot_count, 5);
        assert_eq!(config.station_address, 255);
        assert_eq!(config.burst_delay(), Duration::from_millis(10));
        assert_eq!(config.stall_timeout_ticks(), 300);
        assert!(!config.heartbeat_enabled);
        assert_eq!(config.transport.connection_string(), "udpout:127.0.0.1:30000");
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        assert!(three_robots().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_shape_mismatch() {
        let mut config = three_robots();
        config.shape.pop();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_station_in_robot_range() {
        let mut config = three_robots();
        config.station_address = 2;
        assert!(config.validate().is_err());
        config.station_address = 0;
        assert!(config.validate().is_err());
        config.station_address = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_physics() {
        let mut config = three_robots();
        config.max_velocity = 0.0;
        assert!(config.validate().is_err());

        let mut config = three_robots();
        config.robot_radius = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serial_connection_string() {
        let transport = TransportConfig::Serial {
            port: "/dev/ttyACM0".into(),
            baud: 115200,
        };
        assert_eq!(transport.connection_string(), "serial:/dev/ttyACM0:115200");
    }
}
