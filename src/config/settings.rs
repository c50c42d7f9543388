use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cli::commands::BAUD_USAGE;
use crate::devices::smart_display::RegisterMap;
use crate::modbus::client::exchange_wire_time;
use crate::modbus::protocol::Framing;
use crate::utils::error::ConfigError;

pub const DEFAULT_PORT_NAME: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
/// SmartDisplay factory slave id.
pub const SMARTDISPLAY_SLAVE_ID: u8 = 0x7B;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const TEMPERATURE_WIDGET: u8 = 1;
pub const HUMIDITY_WIDGET: u8 = 3;

const MIN_TIMEOUT: Duration = Duration::from_millis(100);
/// Slave turnaround allowance on top of the wire time.
const TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub framing: Framing,
    pub parity: ParityConfig,
    pub slave_id: u8,
    /// Overrides the timeout derived from framing and baud rate.
    pub timeout_ms: Option<u64>,

    // Monitoring settings
    pub poll_interval_ms: u64,

    // Display layout (assigned by the display firmware)
    pub temperature_widget: u8,
    pub humidity_widget: u8,

    /// IIO device directory of the sensor. Discovered when absent.
    pub sensor_device: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_PORT_NAME.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            framing: Framing::Rtu,
            parity: ParityConfig::None,
            slave_id: SMARTDISPLAY_SLAVE_ID,
            timeout_ms: None,

            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,

            temperature_widget: TEMPERATURE_WIDGET,
            humidity_widget: HUMIDITY_WIDGET,

            sensor_device: None,
        }
    }
}

impl Config {
    /// Defaults, then the optional `--config` file, then command line flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(framing) = matches.get_one::<String>("framing") {
            config.framing = match framing.as_str() {
                "ascii" => Framing::Ascii,
                _ => Framing::Rtu,
            };
        }

        if let Some(baud) = matches.get_one::<String>("baud") {
            config.baud_rate = baud
                .parse()
                .map_err(|_| ConfigError::Usage(BAUD_USAGE.to_string()))?;
        }

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }

        if let Some(timeout) = matches.get_one::<u64>("timeout-ms") {
            config.timeout_ms = Some(*timeout);
        }

        if let Some(interval) = matches.get_one::<u64>("interval-ms") {
            config.poll_interval_ms = *interval;
        }

        if let Some(sensor) = matches.get_one::<String>("sensor") {
            config.sensor_device = Some(sensor.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::File {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::File {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        info!("📄 Loaded configuration from {}", path_str);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=247).contains(&self.slave_id) {
            return Err(ConfigError::Invalid(format!(
                "slave_id {} outside 1-247",
                self.slave_id
            )));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.serial_port.is_empty() {
            return Err(ConfigError::Invalid("serial_port is empty".to_string()));
        }
        RegisterMap::from_widgets(self.temperature_widget, self.humidity_widget)?;

        if let Some(configured) = self.timeout_ms.map(Duration::from_millis) {
            let recommended = self.recommended_timeout();
            if configured < recommended {
                warn!(
                    "⚠️  Timeout {} ms is below the {} ms needed for {} at {} baud; expect spurious read timeouts",
                    configured.as_millis(),
                    recommended.as_millis(),
                    self.framing,
                    self.baud_rate
                );
            }
        }
        Ok(())
    }

    /// Timeout derived from the line settings: twice the exchange wire time
    /// plus slave turnaround, never below 100 ms.
    pub fn recommended_timeout(&self) -> Duration {
        let wire = exchange_wire_time(self.framing, self.baud_rate, &self.parity);
        (wire * 2 + TIMEOUT_MARGIN).max(MIN_TIMEOUT)
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.recommended_timeout())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
