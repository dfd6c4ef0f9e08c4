//! Error taxonomy of the ground station.
//!
//! Only [`TransportError`] is fatal, and only to the telemetry receiver loop.
//! Everything else is reported as a warning and the station keeps running.

use crate::types::RobotId;

/// Result type for ground-station operations
pub type Result<T> = core::result::Result<T, Error>;

/// Invalid formation input; the mission does not start.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormationError {
    #[error("fleet is empty")]
    EmptyFleet,

    #[error("fleet of {0} robots exceeds the supported maximum")]
    FleetTooLarge(usize),

    #[error("{robots} start positions but {slots} formation slots")]
    SizeMismatch { robots: usize, slots: usize },

    #[error("{0} has not reported a position yet")]
    MissingPosition(RobotId),

    #[error("robots {first} and {second} are not well separated ({distance:.3} <= {threshold:.3})")]
    RobotsTooClose {
        first: usize,
        second: usize,
        distance: f32,
        threshold: f32,
    },

    #[error("goals {first} and {second} are not well separated ({distance:.3} <= {threshold:.3})")]
    GoalsTooClose {
        first: usize,
        second: usize,
        distance: f32,
        threshold: f32,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("assignment solver failed: {0}")]
    Solver(String),
}

/// Link failure. Fatal to the receive loop; there is no reconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write failed: {0}")]
    Write(String),

    #[error("link closed")]
    Closed,
}

/// Malformed or unrecognised wire message. Dropped, never fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("not a generic command message")]
    NotGenericCommand,

    #[error("source address {0} is not a robot")]
    UnknownSource(u8),

    #[error("addressed to {0}, not to the ground station")]
    NotForStation(u8),

    #[error("unexpected opcode class {0}")]
    UnexpectedClass(u16),

    #[error("unknown command id {0}")]
    UnknownCommand(u16),
}

/// Redundant or conflicting mission request. Ignored with a warning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MissionError {
    #[error("mission already started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] FormationError),
}

/// Failure to turn an operator command into a transmission.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("robot id {0} is outside the fleet")]
    RobotOutOfRange(u8),

    #[error("{expected} goals expected, got {actual}")]
    GoalCount { expected: usize, actual: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Startup configuration problem; the binary exits before opening a link.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] basic_toml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Any ground-station error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Formation(#[from] FormationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Mission(#[from] MissionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
