//! Driving Trip Demo
//!
//! Drives the emulator through a short trip: engine start, acceleration,
//! braking and engine stop, reading values back along the way.
//!
//! Usage:
//!   cargo run --example drive_trip -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial port, or CHOOSE_FIRST_AVAILABLE (default: simulator)
//!   --config FILE     JSON connection config (port, baud_rate, idle_quantum_ms, max_wait_ms)
//!   --pause MS        Pause between trip legs in ms (default: 1000, 0 with the simulator)
//!
//! Set RUST_LOG=obdemu_core=debug to see the wire traffic.

use std::time::Duration;

use anyhow::{bail, Context};
use obdemu_core::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn drive<P: PortProvider>(car: &mut ProtocolClient<P>, pause: Duration) -> anyhow::Result<()> {
    car.set_engine_started(false)?;
    car.set_speed(0)?;
    car.set_battery_voltage(12)?;
    std::thread::sleep(pause);

    car.set_engine_started(true)?;
    car.set_vin_reporting_enabled(true)?;
    car.set_vin_reporting_number("wdd2040081a123456")?;
    car.set_engine_rpm(2400)?;
    // 5 L/h is frugal, 10 is thirsty
    car.set_fuel_rate(5)?;
    car.set_fuel_percentage(70)?;
    std::thread::sleep(pause);

    for speed in (0..=140).step_by(35) {
        car.set_speed(speed)?;
        car.set_engine_rpm(2400 + speed * 3)?;
        car.set_fuel_percentage(70 - speed / 10)?;
        info!(
            "speed {} km/h, rpm {}, fuel {} %",
            car.get_speed()?,
            car.get_engine_rpm()?,
            car.get_fuel_percentage()?
        );
        std::thread::sleep(pause);
    }

    info!("Braking from 140 km/h to 90 km/h");
    car.set_speed(90)?;
    car.set_engine_rpm(2400)?;
    std::thread::sleep(pause);

    info!("Misfire: lighting the MIL");
    car.set_mil_active(true)?;
    car.set_mil_distance_traveled(3)?;
    std::thread::sleep(pause);

    car.set_speed(0)?;
    car.set_engine_rpm(0)?;
    car.set_engine_started(false)?;
    info!(
        "Parked: battery {} V, fuel rate {} L/h",
        car.get_battery_voltage()?,
        car.get_fuel_rate()?
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut port: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut pause_ms: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                port = args.get(i).cloned();
            }
            "--config" | "-c" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            "--pause" => {
                i += 1;
                let value = args.get(i).context("--pause needs a value")?;
                pause_ms = Some(value.parse().context("--pause expects milliseconds")?);
            }
            other => bail!("unknown argument '{}'", other),
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => ConnectionConfig::load(path)
            .with_context(|| format!("reading config from {}", path))?,
        None => ConnectionConfig::default(),
    };
    if let Some(port) = &port {
        config.port = port.parse()?;
    }

    if port.is_some() || config_path.is_some() {
        let pause = Duration::from_millis(pause_ms.unwrap_or(1000));
        let mut car = ProtocolClient::new(config);
        let name = car.connect_configured()?;
        info!("Driving the emulator on {}", name);
        drive(&mut car, pause)?;
        car.close()?;
    } else {
        let pause = Duration::from_millis(pause_ms.unwrap_or(0));
        let (ports, emulator) = SimulatedPorts::single("sim0");
        config.idle_quantum_ms = 0;
        let mut car = ProtocolClient::with_provider(ports, config);
        car.connect(&PortSelector::FirstAvailable)?;
        info!("Driving the simulated emulator");
        drive(&mut car, pause)?;
        car.close()?;
        info!(
            "Simulator saw {} commands, DTC {:?}, VIN {:?}",
            emulator.received().len(),
            emulator.dtc_codes(),
            emulator.vin()
        );
    }

    Ok(())
}
