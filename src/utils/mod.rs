pub mod error;

pub use error::{ConfigError, ExceptionCode, ModbusError, MonitorError, SensorError};
