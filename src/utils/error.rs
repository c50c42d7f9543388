use std::fmt;
use std::io;
use thiserror::Error;

/// Linux `EIO`. The dht11 IIO driver reports checksum and bit-timing
/// glitches with it.
const EIO: i32 = 5;

/// Exception code carried by a Modbus exception reply (function | 0x80).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    Other(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            other => ExceptionCode::Other(other),
        }
    }
}

impl ExceptionCode {
    pub fn code(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::Other(code) => *code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::ServerDeviceBusy => "server device busy",
            ExceptionCode::Other(_) => "unknown exception",
        };
        write!(f, "{} (0x{:02x})", name, self.code())
    }
}

/// Transport-level failure of a register write. Never retried locally.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch (expected 0x{expected:04x}, received 0x{received:04x})")]
    CrcError { expected: u16, received: u16 },

    #[error("LRC checksum mismatch (expected 0x{expected:02x}, received 0x{received:02x})")]
    LrcError { expected: u8, received: u8 },

    #[error("Slave 0x{slave:02x} returned exception for function 0x{function:02x}: {code}")]
    Exception {
        slave: u8,
        function: u8,
        code: ExceptionCode,
    },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Timeout occurred waiting for slave response")]
    Timeout,
}

impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

/// Sensor read failure with an explicit transient/fatal discriminant.
#[derive(Error, Debug)]
pub enum SensorError {
    /// Expected glitch (noise, bit timing, checksum). Skip the cycle.
    #[error("Transient sensor error: {0}")]
    Transient(String),

    /// Wiring fault, missing device, permissions and everything unclassified.
    #[error("Sensor failure: {0}")]
    Fatal(String),
}

impl SensorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SensorError::Transient(_))
    }

    /// Classify an I/O error raised while reading a sensor attribute.
    pub fn from_io(context: &str, err: io::Error) -> Self {
        let transient = matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        ) || err.raw_os_error() == Some(EIO);

        if transient {
            SensorError::Transient(format!("{}: {}", context, err))
        } else {
            SensorError::Fatal(format!("{}: {}", context, err))
        }
    }
}

/// Problems detected before the polling loop starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed command line. The message is the usage hint shown to the user.
    #[error("{0}")]
    Usage(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load config file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("{what} unavailable: {reason}")]
    Unavailable { what: String, reason: String },
}

/// Anything that terminates the polling loop.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Transport(#[from] ModbusError),

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_maps_to_modbus_timeout() {
        let err: ModbusError = io::Error::new(io::ErrorKind::TimedOut, "no data").into();
        assert!(matches!(err, ModbusError::Timeout));
    }

    #[test]
    fn test_sensor_io_classification() {
        let eio = SensorError::from_io("in_temp_input", io::Error::from_raw_os_error(EIO));
        assert!(eio.is_transient());

        let timeout = SensorError::from_io("in_temp_input", io::ErrorKind::TimedOut.into());
        assert!(timeout.is_transient());

        let missing = SensorError::from_io("in_temp_input", io::ErrorKind::NotFound.into());
        assert!(!missing.is_transient());

        let denied = SensorError::from_io("in_temp_input", io::ErrorKind::PermissionDenied.into());
        assert!(!denied.is_transient());
    }

    #[test]
    fn test_exception_code_display() {
        let code = ExceptionCode::from(0x02);
        assert_eq!(code, ExceptionCode::IllegalDataAddress);
        assert_eq!(code.to_string(), "illegal data address (0x02)");
        assert_eq!(ExceptionCode::from(0x42).code(), 0x42);
    }
}
