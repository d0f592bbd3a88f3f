//! Demo binary wiring the execution substrate to whatever peripherals are
//! present in `config.toml`. This is intentionally thin: the crate's value
//! is the library (`substrate::*`), not this binary.

use std::sync::Arc;

use anyhow::Result;

use substrate::config::{self, Config};
use substrate::drivers::rplidar_a1::{Delegate as LidarDelegate, RPLidarA1};
use substrate::serial::{Parity, SystemSerialPort};
use substrate::thread::sleep_ms;

/// Logs every decoded measurement at `info` level.
struct LoggingDelegate;

impl LidarDelegate for LoggingDelegate {
    fn receive_measurement(&self, quality: f32, angle: f32, distance: f32) {
        log::info!("lidar sample: quality={quality} angle={angle:.2}deg distance={distance:.3}m");
    }
}

fn run_lidar(config: &Config) -> Result<()> {
    let Some(lidar_config) = &config.lidar else {
        log::info!("no [lidar] section in config, skipping RPLidar A1 demo");
        return Ok(());
    };

    let serial = SystemSerialPort::open(&lidar_config.path, lidar_config.baud, Parity::None)?;
    let lidar = RPLidarA1::new(serial);
    lidar.set_delegate(Arc::new(LoggingDelegate));
    lidar.start_scan();

    log::info!("RPLidar A1 scanning on {}", lidar_config.path);
    sleep_ms(5_000);

    lidar.stop_scan();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    log::info!("starting substrate demo");

    let config = config::load_config("config.toml").unwrap_or_else(|e| {
        log::warn!("couldn't load config.toml ({e}), running with an empty configuration");
        Config::default()
    });

    run_lidar(&config)?;

    log::info!("substrate demo finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_delegate_does_not_panic() {
        let delegate = LoggingDelegate;
        delegate.receive_measurement(50.0, 180.0, 1.5);
    }
}
