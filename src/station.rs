//! Ground station runtime
//!
//! Owns the mission controller and the dispatcher, runs the 10 Hz control
//! loop, and spawns the telemetry receiver thread. The only state shared with
//! the receiver is the [`StateBoard`] and the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::control::dispatcher::CommandDispatcher;
use crate::control::formation::FormationEngine;
use crate::control::mission::{MissionAction, MissionController};
use crate::control::operator::OperatorCommand;
use crate::error::{Error, TransportError};
use crate::network::transport::CommandTransport;
use crate::system::config::{StationConfig, CONTROL_RATE_HZ};
use crate::telemetry::{StateBoard, TelemetryReceiver};

/// Control ticks per heartbeat (10 Hz loop, 2 Hz beacon)
pub const HEARTBEAT_DIVIDER: u64 = 5;

/// Ground station: mission, dispatcher and shared telemetry
pub struct GroundStation {
    config: StationConfig,
    transport: Arc<dyn CommandTransport>,
    board: Arc<StateBoard>,
    mission: MissionController,
    dispatcher: CommandDispatcher,
    ticks: u64,
}

impl GroundStation {
    /// Build a station from a validated configuration
    pub fn new(config: StationConfig, transport: Arc<dyn CommandTransport>) -> Result<Self, Error> {
        config.validate()?;
        let engine = FormationEngine::new(config.robot_radius, config.max_velocity)?;
        let shape = config.formation_shape()?;

        let mission = MissionController::new(engine, shape, config.robot_count)
            .with_stall_timeout(config.stall_timeout_ticks());
        let dispatcher =
            CommandDispatcher::new(transport.clone(), config.station_address, config.robot_count)
                .with_burst_delay(config.burst_delay())
                .with_references(config.origin(), config.east());

        Ok(Self {
            board: Arc::new(StateBoard::new(config.robot_count)),
            config,
            transport,
            mission,
            dispatcher,
            ticks: 0,
        })
    }

    /// Latest telemetry of every robot
    pub fn board(&self) -> &Arc<StateBoard> {
        &self.board
    }

    /// Mission controller
    pub fn mission(&self) -> &MissionController {
        &self.mission
    }

    /// Configuration the station runs with
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Start the telemetry receiver thread.
    ///
    /// The thread clears `running` when it exits, so a dead link stops the
    /// control loop too.
    pub fn spawn_receiver(
        &self,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<Result<(), TransportError>>> {
        let receiver = TelemetryReceiver::new(
            self.config.station_address,
            self.config.robot_count,
            self.board.clone(),
            self.config.receive_poll_hz,
        );
        let transport = self.transport.clone();

        thread::Builder::new()
            .name("telemetry-rx".into())
            .spawn(move || {
                let result = receiver.run(&*transport, &running);
                if let Err(e) = &result {
                    error!("Telemetry receiver failed: {}", e);
                }
                running.store(false, Ordering::Relaxed);
                result
            })
    }

    /// Apply one operator request.
    ///
    /// Land and hold abort the mission whether or not the command reaches the
    /// robots; one addressed outside the fleet is refused and leaves the
    /// mission running.
    pub fn handle_operator(&mut self, command: &OperatorCommand) -> Result<(), Error> {
        debug!("Operator: {:?}", command);
        match command {
            OperatorCommand::StartMission => {
                let snapshot = self.board.snapshot();
                self.mission.start(&snapshot)?;
                Ok(())
            }
            OperatorCommand::Land(id) | OperatorCommand::Hold(id) => {
                self.dispatcher.target(*id)?;
                self.mission.abort();
                self.dispatcher.dispatch(command)?;
                Ok(())
            }
            _ => {
                self.dispatcher.dispatch(command)?;
                Ok(())
            }
        }
    }

    /// One control period: advance the mission, transmit its action, beacon.
    pub fn tick(&mut self) {
        let snapshot = self.board.snapshot();
        let sent = match self.mission.tick(&snapshot) {
            Some(MissionAction::BroadcastGoals {
                goals,
                completion_time,
            }) => self.dispatcher.broadcast_goals(&goals, completion_time),
            Some(MissionAction::Go) => self.dispatcher.send_go(),
            None => Ok(()),
        };
        if let Err(e) = sent {
            warn!("Mission transmission failed: {}", e);
        }

        if self.config.heartbeat_enabled && self.ticks % HEARTBEAT_DIVIDER == 0 {
            if let Err(e) = self.transport.send_heartbeat() {
                warn!("Heartbeat failed: {}", e);
            }
        }
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// Run the control loop until `running` is cleared.
    pub fn run(&mut self, commands: &Receiver<OperatorCommand>, running: &AtomicBool) {
        let period = Duration::from_secs(1) / CONTROL_RATE_HZ;
        let mut next = Instant::now();
        info!(
            "Ground station {} running: {} robots, control loop {} Hz",
            self.config.station_address, self.config.robot_count, CONTROL_RATE_HZ
        );

        while running.load(Ordering::Relaxed) {
            while let Ok(command) = commands.try_recv() {
                match self.handle_operator(&command) {
                    // the controller already warned
                    Ok(()) | Err(Error::Mission(_)) => {}
                    Err(e) => warn!("{:?} ignored: {}", command, e),
                }
            }
            self.tick();

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        info!("Ground station stopped");
    }
}
