//! Link abstraction between the ground station and the fleet

use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};
use mavlink::MavHeader;

use crate::error::TransportError;
use crate::network::codec::CommandMessage;

/// One message as it came off the link, before any filtering
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// MAVLink header (sender system id, component, sequence)
    pub header: MavHeader,
    /// Message body
    pub message: MavMessage,
}

/// Point-to-point command channel to the fleet.
///
/// Implementations are shared between the control loop (sending) and the
/// telemetry receiver thread (receiving), so every method takes `&self`.
pub trait CommandTransport: Send + Sync {
    /// Send one message. Best effort: success only means the bytes left.
    fn send(&self, message: &CommandMessage) -> Result<(), TransportError>;

    /// Wait for the next message.
    ///
    /// Blocking links return only once a message arrived. Non-blocking links
    /// return `Ok(None)` when nothing is pending. Errors mean the link is gone.
    fn receive(&self) -> Result<Option<RawMessage>, TransportError>;

    /// Send the ground-station liveness beacon.
    fn send_heartbeat(&self) -> Result<(), TransportError>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for std::sync::Arc<T> {
    fn send(&self, message: &CommandMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn receive(&self) -> Result<Option<RawMessage>, TransportError> {
        (**self).receive()
    }

    fn send_heartbeat(&self) -> Result<(), TransportError> {
        (**self).send_heartbeat()
    }
}

/// Ground-station HEARTBEAT: a GCS with no autopilot, not yet initialised.
pub fn heartbeat_message() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_UNINIT,
        mavlink_version: 3,
    })
}

/// Whether a raw message is a liveness beacon rather than a command
pub fn is_heartbeat(raw: &RawMessage) -> bool {
    matches!(raw.message, MavMessage::HEARTBEAT(_))
}
