use async_trait::async_trait;
use log::{debug, error, info};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::protocol::{
    check_response, decode_adu, encode_adu, Framing, ModbusRequest, EXCEPTION_FLAG,
    MAX_ASCII_FRAME_LEN,
};
use crate::config::settings::{Config, ParityConfig};
use crate::utils::error::ModbusError;

/// Single-register write access to a Modbus slave.
#[async_trait]
pub trait ModbusClientTrait: Send {
    async fn write_single_register(
        &mut self,
        slave_id: u8,
        register_addr: u16,
        value: u16,
    ) -> Result<(), ModbusError>;
}

/// Byte stream the client talks through. A serial port in production.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

pub struct ModbusClient {
    port: Box<dyn Transport>,
    framing: Framing,
    /// Budget for a whole request/reply exchange.
    timeout: Duration,
}

impl ModbusClient {
    /// Open the serial port described by `config`. The read timeout of the
    /// port is the session's timeout budget.
    pub fn open(config: &Config) -> Result<Self, ModbusError> {
        let timeout = config.effective_timeout();
        info!("🔌 Connecting to Modbus {} port: {}", config.framing, config.serial_port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, parity {:?}, timeout {} ms",
            config.baud_rate,
            config.parity,
            timeout.as_millis()
        );

        let serial_parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(config.serial_port.as_str(), config.baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.serial_port, e);
                ModbusError::ConnectionError(format!(
                    "Failed to open port {}: {}",
                    config.serial_port, e
                ))
            })?;

        info!("✅ Modbus {} connection established", config.framing);
        Ok(Self::with_transport(Box::new(port), config.framing, timeout))
    }

    pub fn with_transport(port: Box<dyn Transport>, framing: Framing, timeout: Duration) -> Self {
        Self {
            port,
            framing,
            timeout,
        }
    }

    fn transact(&mut self, slave_id: u8, request: &ModbusRequest) -> Result<(), ModbusError> {
        let frame = encode_adu(self.framing, slave_id, &request.to_pdu());
        debug!("📤 Sending {} frame: {}", self.framing, hex::encode(&frame));

        self.port.write_all(&frame)?;
        self.port.flush()?;

        // The port timeout restarts on every byte; this bounds the reply as a whole
        let deadline = Instant::now() + self.timeout;
        let response = match self.framing {
            Framing::Rtu => self.read_rtu_frame(request.response_pdu_len(), deadline)?,
            Framing::Ascii => self.read_ascii_frame(deadline)?,
        };
        debug!("📨 Received {} frame: {}", self.framing, hex::encode(&response));

        let (reply_slave, reply_pdu) = decode_adu(self.framing, &response)?;
        check_response(request, slave_id, reply_slave, &reply_pdu)
    }

    /// Fill `buf` from the port, failing with `Timeout` once `deadline` has
    /// passed even while the line keeps delivering bytes.
    fn read_exact_until(&mut self, buf: &mut [u8], deadline: Instant) -> Result<(), ModbusError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => return Err(ModbusError::Timeout),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if filled < buf.len() && Instant::now() >= deadline {
                return Err(ModbusError::Timeout);
            }
        }
        Ok(())
    }

    /// RTU has no delimiter, so the length comes from the function byte:
    /// an exception reply is 5 bytes, a normal one is slave + PDU + CRC.
    fn read_rtu_frame(&mut self, pdu_len: usize, deadline: Instant) -> Result<Vec<u8>, ModbusError> {
        let mut frame = vec![0u8; 2];
        self.read_exact_until(&mut frame, deadline)?;

        let remaining = if frame[1] & EXCEPTION_FLAG != 0 {
            3
        } else {
            Framing::Rtu.frame_chars(pdu_len) - 2
        };
        let mut rest = vec![0u8; remaining];
        self.read_exact_until(&mut rest, deadline)?;
        frame.extend_from_slice(&rest);
        Ok(frame)
    }

    /// ASCII frames run from ':' to LF. Bytes before the start mark are
    /// noise, tolerated up to one maximum frame length.
    fn read_ascii_frame(&mut self, deadline: Instant) -> Result<Vec<u8>, ModbusError> {
        let mut frame = Vec::new();
        let mut skipped = 0usize;
        let mut byte = [0u8; 1];
        loop {
            self.read_exact_until(&mut byte, deadline)?;
            if frame.is_empty() && byte[0] != b':' {
                skipped += 1;
                if skipped > MAX_ASCII_FRAME_LEN {
                    return Err(ModbusError::InvalidResponse(format!(
                        "no ASCII start mark within {} characters",
                        MAX_ASCII_FRAME_LEN
                    )));
                }
            } else {
                frame.push(byte[0]);
                if byte[0] == b'\n' {
                    return Ok(frame);
                }
                if frame.len() > MAX_ASCII_FRAME_LEN {
                    return Err(ModbusError::InvalidResponse(format!(
                        "ASCII frame exceeds {} characters",
                        MAX_ASCII_FRAME_LEN
                    )));
                }
            }
            if Instant::now() >= deadline {
                return Err(ModbusError::Timeout);
            }
        }
    }
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn write_single_register(
        &mut self,
        slave_id: u8,
        register_addr: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        debug!(
            "📝 Writing register {} = {} on slave 0x{:02x}",
            register_addr, value, slave_id
        );
        let request = ModbusRequest::WriteSingleRegister {
            register_addr,
            value,
        };
        self.transact(slave_id, &request)
    }
}

/// Minimum time for a request/reply exchange at the given line settings.
pub fn exchange_wire_time(framing: Framing, baud_rate: u32, parity: &ParityConfig) -> Duration {
    let bits_per_char: u64 = match parity {
        ParityConfig::None => 10,
        ParityConfig::Even | ParityConfig::Odd => 11,
    };
    // Request and echo reply are the same size for a register write.
    let chars = 2 * framing.frame_chars(5) as u64;
    Duration::from_micros(chars * bits_per_char * 1_000_000 / baud_rate.max(1) as u64)
}
