use serde::{Deserialize, Serialize};
use std::fmt;

use super::crc::{crc16_modbus, lrc};
use crate::utils::error::{ExceptionCode, ModbusError};

pub const FN_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Longest ASCII ADU allowed on a Modbus serial line.
pub const MAX_ASCII_FRAME_LEN: usize = 513;

const ASCII_START: u8 = b':';
const ASCII_END: &[u8] = b"\r\n";

/// Wire encoding of the session. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    Rtu,
    Ascii,
}

impl Framing {
    /// Characters on the wire for an ADU carrying `pdu_len` PDU bytes.
    pub fn frame_chars(&self, pdu_len: usize) -> usize {
        match self {
            // slave + pdu + crc(2)
            Framing::Rtu => 1 + pdu_len + 2,
            // ':' + hex(slave + pdu + lrc) + CRLF
            Framing::Ascii => 1 + 2 * (1 + pdu_len + 1) + 2,
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Rtu => write!(f, "RTU"),
            Framing::Ascii => write!(f, "ASCII"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    WriteSingleRegister { register_addr: u16, value: u16 },
}

impl ModbusRequest {
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::WriteSingleRegister { .. } => FN_WRITE_SINGLE_REGISTER,
        }
    }

    pub fn to_pdu(&self) -> Vec<u8> {
        match self {
            ModbusRequest::WriteSingleRegister {
                register_addr,
                value,
            } => {
                let mut pdu = vec![FN_WRITE_SINGLE_REGISTER];
                pdu.extend_from_slice(&register_addr.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
                pdu
            }
        }
    }

    /// PDU length of a normal (non-exception) reply.
    pub fn response_pdu_len(&self) -> usize {
        match self {
            // Echo of the request
            ModbusRequest::WriteSingleRegister { .. } => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    Success(Vec<u8>),
    Exception { function: u8, code: ExceptionCode },
}

impl ModbusResponse {
    pub fn from_pdu(pdu: &[u8]) -> Result<Self, ModbusError> {
        match pdu {
            [] => Err(ModbusError::InvalidResponse("empty PDU".to_string())),
            [function, code] if function & EXCEPTION_FLAG != 0 => Ok(ModbusResponse::Exception {
                function: function & !EXCEPTION_FLAG,
                code: ExceptionCode::from(*code),
            }),
            [function, ..] if function & EXCEPTION_FLAG != 0 => Err(ModbusError::InvalidResponse(
                format!("exception PDU of {} bytes", pdu.len()),
            )),
            _ => Ok(ModbusResponse::Success(pdu.to_vec())),
        }
    }
}

/// Wrap a PDU into an application data unit for the given framing.
pub fn encode_adu(framing: Framing, slave_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(pdu.len() + 3);
    body.push(slave_id);
    body.extend_from_slice(pdu);

    match framing {
        Framing::Rtu => {
            let crc = crc16_modbus(&body);
            body.extend_from_slice(&crc.to_le_bytes());
            body
        }
        Framing::Ascii => {
            body.push(lrc(&body));
            let mut frame = Vec::with_capacity(framing.frame_chars(pdu.len()));
            frame.push(ASCII_START);
            frame.extend_from_slice(hex::encode_upper(&body).as_bytes());
            frame.extend_from_slice(ASCII_END);
            frame
        }
    }
}

/// Validate a complete ADU and split it into slave id and PDU.
pub fn decode_adu(framing: Framing, frame: &[u8]) -> Result<(u8, Vec<u8>), ModbusError> {
    match framing {
        Framing::Rtu => {
            if frame.len() < 4 {
                return Err(ModbusError::InvalidResponse(format!(
                    "RTU frame too short: {} bytes",
                    frame.len()
                )));
            }
            let data_len = frame.len() - 2;
            let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
            let expected = crc16_modbus(&frame[..data_len]);
            if received != expected {
                return Err(ModbusError::CrcError { expected, received });
            }
            Ok((frame[0], frame[1..data_len].to_vec()))
        }
        Framing::Ascii => {
            let inner = frame
                .strip_prefix(&[ASCII_START])
                .and_then(|f| f.strip_suffix(ASCII_END))
                .ok_or_else(|| {
                    ModbusError::InvalidResponse("ASCII frame not delimited by ':' and CRLF".to_string())
                })?;
            let body = hex::decode(inner)
                .map_err(|e| ModbusError::InvalidResponse(format!("ASCII frame: {}", e)))?;
            if body.len() < 3 {
                return Err(ModbusError::InvalidResponse(format!(
                    "ASCII frame too short: {} bytes",
                    body.len()
                )));
            }
            let (data, tail) = body.split_at(body.len() - 1);
            let received = tail[0];
            let expected = lrc(data);
            if received != expected {
                return Err(ModbusError::LrcError { expected, received });
            }
            Ok((data[0], data[1..].to_vec()))
        }
    }
}

/// Match a decoded reply against the request that produced it.
pub fn check_response(
    request: &ModbusRequest,
    slave_id: u8,
    reply_slave: u8,
    reply_pdu: &[u8],
) -> Result<(), ModbusError> {
    if reply_slave != slave_id {
        return Err(ModbusError::InvalidResponse(format!(
            "reply from slave 0x{:02x}, expected 0x{:02x}",
            reply_slave, slave_id
        )));
    }

    match ModbusResponse::from_pdu(reply_pdu)? {
        ModbusResponse::Exception { function, code } => Err(ModbusError::Exception {
            slave: reply_slave,
            function,
            code,
        }),
        ModbusResponse::Success(pdu) => match request {
            ModbusRequest::WriteSingleRegister { .. } => {
                if pdu == request.to_pdu() {
                    Ok(())
                } else {
                    Err(ModbusError::InvalidResponse(format!(
                        "write echo mismatch: sent {}, received {}",
                        hex::encode(request.to_pdu()),
                        hex::encode(&pdu)
                    )))
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_request() -> ModbusRequest {
        ModbusRequest::WriteSingleRegister {
            register_addr: 106,
            value: 25,
        }
    }

    #[test]
    fn test_write_single_register_pdu() {
        assert_eq!(write_request().to_pdu(), vec![0x06, 0x00, 0x6A, 0x00, 0x19]);
    }

    #[test]
    fn test_rtu_frame_layout() {
        let frame = encode_adu(Framing::Rtu, 0x7B, &write_request().to_pdu());
        assert_eq!(frame.len(), Framing::Rtu.frame_chars(5));
        assert_eq!(&frame[..6], &[0x7B, 0x06, 0x00, 0x6A, 0x00, 0x19]);
        let crc = crc16_modbus(&frame[..6]);
        assert_eq!(frame[6], (crc & 0xFF) as u8);
        assert_eq!(frame[7], (crc >> 8) as u8);
    }

    #[test]
    fn test_ascii_frame_layout() {
        let frame = encode_adu(Framing::Ascii, 0x7B, &write_request().to_pdu());
        // 7B+06+00+6A+00+19 = 0x104 -> low byte 0x04 -> LRC 0xFC
        assert_eq!(frame, b":7B06006A0019FC\r\n".to_vec());
        assert_eq!(frame.len(), Framing::Ascii.frame_chars(5));
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let mut frame = encode_adu(Framing::Rtu, 0x7B, &write_request().to_pdu());
        frame[5] ^= 0x01;
        assert!(matches!(
            decode_adu(Framing::Rtu, &frame),
            Err(ModbusError::CrcError { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_lrc() {
        assert!(matches!(
            decode_adu(Framing::Ascii, b":7B06006A0019FD\r\n"),
            Err(ModbusError::LrcError {
                expected: 0xFC,
                received: 0xFD
            })
        ));
    }

    #[test]
    fn test_decode_rejects_undelimited_ascii() {
        assert!(matches!(
            decode_adu(Framing::Ascii, b"7B06006A0019FC\r\n"),
            Err(ModbusError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_decode_ascii_accepts_lowercase_hex() {
        let (slave, pdu) = decode_adu(Framing::Ascii, b":7b06006a0019fc\r\n").unwrap();
        assert_eq!(slave, 0x7B);
        assert_eq!(pdu, write_request().to_pdu());
    }

    #[test]
    fn test_check_response_exception() {
        let result = check_response(&write_request(), 0x7B, 0x7B, &[0x86, 0x02]);
        match result {
            Err(ModbusError::Exception {
                slave,
                function,
                code,
            }) => {
                assert_eq!(slave, 0x7B);
                assert_eq!(function, 0x06);
                assert_eq!(code, ExceptionCode::IllegalDataAddress);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_response_wrong_slave_and_echo() {
        let pdu = write_request().to_pdu();
        assert!(check_response(&write_request(), 0x7B, 0x7B, &pdu).is_ok());
        assert!(matches!(
            check_response(&write_request(), 0x7B, 0x01, &pdu),
            Err(ModbusError::InvalidResponse(_))
        ));
        assert!(matches!(
            check_response(&write_request(), 0x7B, 0x7B, &[0x06, 0x00, 0x6A, 0x00, 0x18]),
            Err(ModbusError::InvalidResponse(_))
        ));
    }
}
