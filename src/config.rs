//! Application-level configuration: serial port paths/bauds, EtherCAT
//! device addresses, filter cutoff frequencies, and servo motion-profile
//! defaults. Loaded from a TOML file with `serde` + kebab-case field
//! renaming, the same pattern the teacher repo's own `config.rs` uses.
//!
//! No environment-variable or CLI surface is defined by the core
//! (spec.md §6); an embedding application may add one.

use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct SerialPortConfig {
    pub path: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_baud() -> u32 {
    115_200
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    #[serde(default = "default_lowpass_frequency")]
    pub lowpass_frequency: f64,
    #[serde(default = "default_highpass_frequency")]
    pub highpass_frequency: f64,
    #[serde(default = "default_period")]
    pub period: f64,
}

fn default_lowpass_frequency() -> f64 {
    1000.0
}

fn default_highpass_frequency() -> f64 {
    10.0
}

fn default_period() -> f64 {
    1.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            lowpass_frequency: default_lowpass_frequency(),
            highpass_frequency: default_highpass_frequency(),
            period: default_period(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServoConfig {
    pub device_address: u16,
    #[serde(default = "default_velocity")]
    pub profile_velocity: u16,
    #[serde(default = "default_acceleration")]
    pub profile_acceleration: u16,
    #[serde(default = "default_acceleration")]
    pub profile_deceleration: u16,
}

fn default_velocity() -> u16 {
    crate::drivers::servo_jxce1::PROFILE_VELOCITY
}

fn default_acceleration() -> u16 {
    crate::drivers::servo_jxce1::PROFILE_ACCELERATION
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub lidar: Option<SerialPortConfig>,
    pub servo: Option<ServoConfig>,
    #[serde(default)]
    pub filters: FilterConfig,
}

/// Loads and parses `path` as TOML. Missing optional sections (`lidar`,
/// `servo`) let an embedding application run with only the peripherals it
/// actually has attached.
pub fn load_config(path: &str) -> Result<Config> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    let config: Config = toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_config_defaults_match_spec_defaults() {
        let config: FilterConfig = toml::from_str("").unwrap();
        assert_eq!(config.lowpass_frequency, 1000.0);
        assert_eq!(config.highpass_frequency, 10.0);
        assert_eq!(config.period, 1.0);
    }

    #[test]
    fn full_config_parses_kebab_case_fields() {
        let toml = r#"
            [lidar]
            path = "/dev/ttyUSB0"
            baud = 115200

            [servo]
            device-address = 4097
            profile-velocity = 100

            [filters]
            lowpass-frequency = 500.0
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let lidar = config.lidar.unwrap();
        assert_eq!(lidar.path, "/dev/ttyUSB0");
        assert_eq!(lidar.baud, 115_200);

        let servo = config.servo.unwrap();
        assert_eq!(servo.device_address, 4097);
        assert_eq!(servo.profile_velocity, 100);
        assert_eq!(servo.profile_deceleration, crate::drivers::servo_jxce1::PROFILE_ACCELERATION);

        assert_eq!(config.filters.lowpass_frequency, 500.0);
    }
}
