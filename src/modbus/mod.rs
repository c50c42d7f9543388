pub mod client;
pub mod crc;
pub mod protocol;

pub use client::{ModbusClient, ModbusClientTrait, Transport};
pub use crc::{crc16_modbus, lrc};
pub use protocol::{Framing, ModbusRequest, ModbusResponse};
