//! Telemetry Receiver
//!
//! Drains the command transport, keeps only the robot-to-ground messages
//! addressed to this ground station, and republishes them per robot.
//!
//! # Features
//! - Source/target/class filtering of generic command messages
//! - Per-robot state board with whole-record, tear-free updates
//! - Acknowledgment logging by catalog name
//! - Poll throttling for non-blocking transports
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use formation_master::telemetry::{StateBoard, TelemetryReceiver};
//!
//! let board = Arc::new(StateBoard::new(5));
//! let receiver = TelemetryReceiver::new(255, 5, board.clone(), 50);
//! receiver.run(&link, &running)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;

use crate::error::{ProtocolError, TransportError};
use crate::network::codec::{decode, CommandId, OpcodeClass, Report};
use crate::network::transport::{is_heartbeat, CommandTransport, RawMessage};
use crate::types::{now_ms, RobotId, RobotState};

/// Consumer of decoded robot reports
pub trait StatePublisher: Send + Sync {
    /// Latest state of one robot
    fn publish_state(&self, robot: RobotId, state: RobotState);

    /// Robot confirmed reception of `command`
    fn publish_ack(&self, _robot: RobotId, _command: CommandId) {}
}

impl<T: StatePublisher + ?Sized> StatePublisher for Arc<T> {
    fn publish_state(&self, robot: RobotId, state: RobotState) {
        (**self).publish_state(robot, state)
    }

    fn publish_ack(&self, robot: RobotId, command: CommandId) {
        (**self).publish_ack(robot, command)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    state: Option<RobotState>,
    last_ack: Option<CommandId>,
}

/// Latest reported state of every robot.
///
/// One lock per robot: the receiver thread writes a whole record at a time and
/// the control loop never observes half an update.
#[derive(Debug)]
pub struct StateBoard {
    slots: Vec<Mutex<Slot>>,
}

impl StateBoard {
    /// Board for a fleet of `fleet_size` robots, all unreported
    pub fn new(fleet_size: usize) -> Self {
        Self {
            slots: (0..fleet_size).map(|_| Mutex::new(Slot::default())).collect(),
        }
    }

    /// Number of robots tracked
    pub fn fleet_size(&self) -> usize {
        self.slots.len()
    }

    /// Latest state of `robot`, if it has reported
    pub fn state(&self, robot: RobotId) -> Option<RobotState> {
        self.slots.get(robot.index()).and_then(|slot| slot.lock().state)
    }

    /// Last command `robot` acknowledged
    pub fn last_ack(&self, robot: RobotId) -> Option<CommandId> {
        self.slots.get(robot.index()).and_then(|slot| slot.lock().last_ack)
    }

    /// Copy of every robot's latest state, indexed by RobotId
    pub fn snapshot(&self) -> Vec<Option<RobotState>> {
        self.slots.iter().map(|slot| slot.lock().state).collect()
    }
}

impl StatePublisher for StateBoard {
    fn publish_state(&self, robot: RobotId, state: RobotState) {
        if let Some(slot) = self.slots.get(robot.index()) {
            slot.lock().state = Some(state);
        }
    }

    fn publish_ack(&self, robot: RobotId, command: CommandId) {
        if let Some(slot) = self.slots.get(robot.index()) {
            slot.lock().last_ack = Some(command);
        }
    }
}

/// Receive loop feeding a [`StatePublisher`]
pub struct TelemetryReceiver<P: StatePublisher> {
    station_address: u8,
    fleet_size: usize,
    publisher: P,
    /// Back-off when a non-blocking transport has nothing pending
    idle_wait: Duration,
}

impl<P: StatePublisher> TelemetryReceiver<P> {
    /// Create a receiver for a fleet of `fleet_size` robots.
    ///
    /// `poll_hz` caps how often an idle non-blocking transport is polled;
    /// 0 disables the cap.
    pub fn new(station_address: u8, fleet_size: usize, publisher: P, poll_hz: u32) -> Self {
        let idle_wait = if poll_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(poll_hz))
        };
        Self {
            station_address,
            fleet_size,
            publisher,
            idle_wait,
        }
    }

    /// Publisher this receiver feeds
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Filter and decode one raw message.
    ///
    /// Accepts only generic command messages from a robot of this fleet,
    /// addressed to the ground station, carrying a state report or an
    /// acknowledgment. The returned state is stamped with the reception time.
    pub fn handle(&self, raw: &RawMessage) -> Result<Report, ProtocolError> {
        let message = decode(raw).ok_or(ProtocolError::NotGenericCommand)?;
        if message.target != self.station_address {
            return Err(ProtocolError::NotForStation(message.target));
        }
        match message.class() {
            Some(OpcodeClass::RobotState) | Some(OpcodeClass::Acknowledge) => {}
            _ => return Err(ProtocolError::UnexpectedClass(message.opcode_class)),
        }

        let report = match message.to_report(self.fleet_size)? {
            Report::State { robot, mut state } => {
                state.timestamp_ms = now_ms();
                Report::State { robot, state }
            }
            ack => ack,
        };
        Ok(report)
    }

    /// Handle one raw message and publish the result.
    ///
    /// Returns whether the message was accepted.
    pub fn process(&self, raw: &RawMessage) -> bool {
        match self.handle(raw) {
            Ok(Report::State { robot, state }) => {
                self.publisher.publish_state(robot, state);
                true
            }
            Ok(Report::Acknowledgment { robot, command }) => {
                info!("Acknowledgment of {} from {}", command.name(), robot);
                self.publisher.publish_ack(robot, command);
                true
            }
            Err(e) => {
                if !is_heartbeat(raw) {
                    debug!("Dropped message from system {}: {}", raw.header.system_id, e);
                }
                false
            }
        }
    }

    /// Run until `running` is cleared or the link fails.
    pub fn run<T>(&self, transport: &T, running: &AtomicBool) -> Result<(), TransportError>
    where
        T: CommandTransport + ?Sized,
    {
        info!(
            "Telemetry receiver started for {} robots (station {})",
            self.fleet_size, self.station_address
        );

        while running.load(Ordering::Relaxed) {
            match transport.receive()? {
                Some(raw) => {
                    self.process(&raw);
                }
                None => {
                    if !self.idle_wait.is_zero() {
                        std::thread::sleep(self.idle_wait);
                    }
                }
            }
        }

        info!("Telemetry receiver stopped");
        Ok(())
    }
}
