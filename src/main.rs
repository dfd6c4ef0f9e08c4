//! Formation ground station binary
//!
//! Loads the configuration, opens the MAVLink link, starts the telemetry
//! receiver, and reads operator commands from stdin.

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{error, info, warn};

use formation_master::network::MavlinkTransport;
use formation_master::{GroundStation, OperatorCommand, StationConfig};

#[derive(Parser, Debug)]
#[command(name = "formation-master", version, about = "Formation ground station")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "formation.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match StationConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("formation-master: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = if args.debug || config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let address = config.transport.connection_string();
    let transport = match MavlinkTransport::connect(&address, config.station_address) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut station = match GroundStation::new(config, transport) {
        Ok(station) => station,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    }) {
        error!("Cannot install Ctrl-C handler: {}", e);
        return ExitCode::FAILURE;
    }

    let receiver = match station.spawn_receiver(running.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Cannot start telemetry receiver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (commands_tx, commands_rx) = mpsc::channel();
    let console = thread::Builder::new().name("console".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<OperatorCommand>() {
                Ok(command) => {
                    if commands_tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{:?}: {}", line.trim(), e),
            }
        }
    });
    if let Err(e) = console {
        error!("Cannot start console: {}", e);
        return ExitCode::FAILURE;
    }

    station.run(&commands_rx, &running);

    // A receiver still blocked in recv() is left behind; the process exits anyway.
    if receiver.is_finished() {
        match receiver.join() {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return ExitCode::FAILURE,
            Err(_) => {
                error!("Telemetry receiver panicked");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
