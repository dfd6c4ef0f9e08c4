//! In-process link for tests and dry runs.
//!
//! [`LoopbackTransport::pair`] returns the station side, which implements
//! [`CommandTransport`], and a [`RobotEndpoint`] that plays the whole fleet:
//! it sees every frame the station sent and can inject state reports and
//! acknowledgments. Frames cross the link as MAVLink messages, so the codec is
//! exercised exactly as on a real link.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use mavlink::MavHeader;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::network::codec::{decode, CommandId, CommandMessage, COMPONENT_ID};
use crate::network::transport::{heartbeat_message, is_heartbeat, CommandTransport, RawMessage};
use crate::types::{RobotId, RobotState};

/// How long `receive` waits before reporting "nothing yet"
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// Station side of an in-process link
pub struct LoopbackTransport {
    station_address: u8,
    to_robots: Mutex<Sender<RawMessage>>,
    from_robots: Mutex<Receiver<RawMessage>>,
    poll_timeout: Duration,
    sequence: AtomicU8,
}

/// Fleet side of an in-process link
pub struct RobotEndpoint {
    station_address: u8,
    from_station: Receiver<RawMessage>,
    to_station: Sender<RawMessage>,
}

impl LoopbackTransport {
    /// Create a connected station/fleet pair
    pub fn pair(station_address: u8) -> (LoopbackTransport, RobotEndpoint) {
        let (to_robots, from_station) = mpsc::channel();
        let (to_station, from_robots) = mpsc::channel();

        let station = LoopbackTransport {
            station_address,
            to_robots: Mutex::new(to_robots),
            from_robots: Mutex::new(from_robots),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            sequence: AtomicU8::new(0),
        };
        let fleet = RobotEndpoint {
            station_address,
            from_station,
            to_station,
        };
        (station, fleet)
    }

    /// Change how long `receive` waits for a frame
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    fn push(&self, raw: RawMessage) -> Result<(), TransportError> {
        self.to_robots
            .lock()
            .send(raw)
            .map_err(|_| TransportError::Closed)
    }

    fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl CommandTransport for LoopbackTransport {
    fn send(&self, message: &CommandMessage) -> Result<(), TransportError> {
        self.push(RawMessage {
            header: message.header(self.next_sequence()),
            message: message.to_mavlink(),
        })
    }

    fn receive(&self) -> Result<Option<RawMessage>, TransportError> {
        match self.from_robots.lock().recv_timeout(self.poll_timeout) {
            Ok(raw) => Ok(Some(raw)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.push(RawMessage {
            header: MavHeader {
                system_id: self.station_address,
                component_id: COMPONENT_ID,
                sequence: self.next_sequence(),
            },
            message: heartbeat_message(),
        })
    }
}

impl RobotEndpoint {
    /// Send an arbitrary frame to the station
    pub fn inject(&self, raw: RawMessage) -> bool {
        self.to_station.send(raw).is_ok()
    }

    /// Send a generic message to the station
    pub fn send(&self, message: &CommandMessage) -> bool {
        self.inject(RawMessage {
            header: message.header(0),
            message: message.to_mavlink(),
        })
    }

    /// Report `state` on behalf of `robot`
    pub fn report_state(&self, robot: RobotId, state: &RobotState) -> bool {
        self.send(&CommandMessage::state_report(robot, self.station_address, state))
    }

    /// Acknowledge `command` on behalf of `robot`
    pub fn acknowledge(&self, robot: RobotId, command: CommandId) -> bool {
        self.send(&CommandMessage::acknowledgment(robot, self.station_address, command))
    }

    /// Every frame the station sent since the last drain
    pub fn drain(&self) -> Vec<RawMessage> {
        self.from_station.try_iter().collect()
    }

    /// Generic command messages the station sent since the last drain.
    ///
    /// Heartbeats are counted separately and returned as the second value.
    pub fn drain_commands(&self) -> (Vec<CommandMessage>, usize) {
        let mut commands = Vec::new();
        let mut heartbeats = 0;
        for raw in self.drain() {
            if is_heartbeat(&raw) {
                heartbeats += 1;
            } else if let Some(message) = decode(&raw) {
                commands.push(message);
            }
        }
        (commands, heartbeats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::codec::{Command, Report};
    use crate::types::{Position, Target};

    #[test]
    fn test_station_to_fleet() {
        let (station, fleet) = LoopbackTransport::pair(255);
        station
            .send(&Command::Hold.to_message(255, Target::All))
            .unwrap();
        station.send_heartbeat().unwrap();

        let (commands, heartbeats) = fleet.drain_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_command(), Ok(Command::Hold));
        assert_eq!(heartbeats, 1);
    }

    #[test]
    fn test_fleet_to_station() {
        let (station, fleet) = LoopbackTransport::pair(255);
        let state = RobotState {
            position: Position::new(1.0, 2.0, 3.0),
            ..RobotState::default()
        };
        assert!(fleet.report_state(RobotId::new(0), &state));

        let raw = station.receive().unwrap().expect("frame");
        let report = decode(&raw).unwrap().to_report(1).unwrap();
        assert_eq!(
            report,
            Report::State {
                robot: RobotId::new(0),
                state
            }
        );
    }

    #[test]
    fn test_receive_times_out_then_closes() {
        let (station, fleet) = LoopbackTransport::pair(255);
        let station = station.with_poll_timeout(Duration::from_millis(1));
        assert!(matches!(station.receive(), Ok(None)));

        drop(fleet);
        assert!(matches!(station.receive(), Err(TransportError::Closed)));
        assert!(matches!(
            station.send(&Command::Go.to_message(255, Target::All)),
            Err(TransportError::Closed)
        ));
    }
}
