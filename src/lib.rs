//! SmartDisplay temperature/humidity monitor
//!
//! Samples a DHT11 sensor and publishes the readings to a SmartDisplay
//! panel over Modbus RTU or ASCII (write single register), once per
//! polling cycle, until cancelled.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{Dht11Sensor, Sample, Sensor, SmartDisplay};
pub use modbus::{Framing, ModbusClient, ModbusClientTrait};
pub use services::{CycleOutcome, MonitorService, RunSummary};
pub use utils::error::{ConfigError, ModbusError, MonitorError, SensorError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
