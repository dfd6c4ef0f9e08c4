//! # Formation Ground Station
//!
//! Ground-station side of a robot formation system: decides which robot flies
//! to which slot of a target formation, sequences the fleet through a
//! barrier-synchronised start, and relays commands and telemetry over a
//! MAVLink command channel.
//!
//! ## Features
//! - Spacing-checked Kuhn–Munkres slot assignment with a shared deadline
//! - Goal broadcast / go / arrival mission state machine
//! - Generic two-level opcode command codec over `COMMAND_LONG`
//! - Serial or UDP links, in-process loopback for tests
//! - Per-robot telemetry board shared with a dedicated receiver thread
//!
//! ## Data flow
//! ```text
//! operator -> CommandDispatcher -> codec -> CommandTransport -> robots
//! robots -> CommandTransport -> TelemetryReceiver -> StateBoard -> MissionController
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // f32 coordinates on the wire
#![allow(clippy::cast_possible_truncation)] // Checked at runtime where needed

/// Formation assignment, mission sequencing and command dispatch
pub mod control;
/// Error taxonomy
pub mod error;
/// Wire codec and transports
pub mod network;
/// Ground station runtime
pub mod station;
/// Startup configuration
pub mod system;
/// Telemetry receiver and per-robot state board
pub mod telemetry;
/// Core types (RobotId, Target, Position, RobotState)
pub mod types;

pub use control::{
    Assignment, CommandDispatcher, FormationEngine, FormationShape, MissionAction,
    MissionController, MissionPhase, OperatorCommand, StartConfiguration,
};
pub use error::{Error, Result};
pub use station::GroundStation;
pub use system::config::{StationConfig, TransportConfig};
pub use telemetry::{StateBoard, StatePublisher, TelemetryReceiver};
pub use types::*;
