// Protocol 2.0 framing
//
// Packet format: [0xFF, 0xFF, 0xFD, 0x00, ID, Len_L, Len_H, Instruction, Params..., CRC_L, CRC_H]
// Status format: [0xFF, 0xFF, 0xFD, 0x00, ID, Len_L, Len_H, 0x55, Error, Params..., CRC_L, CRC_H]
// Length counts instruction + params + CRC after byte stuffing.

use std::io::Read;

use crc16::{BUYPASS, State};
use tracing::debug;

use super::{MAX_STRAY_PACKETS, PacketCodec, read_error};
use crate::error::CommError;

const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;
const INST_STATUS: u8 = 0x55;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolV2;

impl ProtocolV2 {
    fn crc(data: &[u8]) -> u16 {
        State::<BUYPASS>::calculate(data)
    }

    /// Insert 0xFD after every 0xFF 0xFF 0xFD run so the body never looks like a header.
    fn add_stuffing(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + body.len() / 3);
        for &b in body {
            out.push(b);
            let n = out.len();
            if n >= 3 && out[n - 3..] == [0xFF, 0xFF, 0xFD] {
                out.push(0xFD);
            }
        }
        out
    }

    fn remove_stuffing(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            out.push(body[i]);
            let n = out.len();
            if n >= 3 && out[n - 3..] == [0xFF, 0xFF, 0xFD] && body.get(i + 1) == Some(&0xFD) {
                i += 1;
            }
            i += 1;
        }
        out
    }

    fn build_packet(id: u8, instruction: u8, params: &[u8]) -> Result<Vec<u8>, CommError> {
        let mut body = Vec::with_capacity(1 + params.len());
        body.push(instruction);
        body.extend_from_slice(params);
        let body = Self::add_stuffing(&body);

        let length = u16::try_from(body.len() + 2).map_err(|_| {
            CommError::InvalidRequest(format!("{} byte packet is too long", body.len()))
        })?;

        let mut packet = Vec::with_capacity(HEADER.len() + 3 + body.len() + 2);
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.extend_from_slice(&length.to_le_bytes());
        packet.extend_from_slice(&body);

        let crc = Self::crc(&packet);
        packet.extend_from_slice(&crc.to_le_bytes());
        Ok(packet)
    }
}

impl PacketCodec for ProtocolV2 {
    fn write_packet(&self, id: u8, address: u16, data: &[u8]) -> Result<Vec<u8>, CommError> {
        let mut params = Vec::with_capacity(2 + data.len());
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(data);
        Self::build_packet(id, INST_WRITE, &params)
    }

    fn read_packet(&self, id: u8, address: u16, length: u16) -> Result<Vec<u8>, CommError> {
        let mut params = [0u8; 4];
        params[..2].copy_from_slice(&address.to_le_bytes());
        params[2..].copy_from_slice(&length.to_le_bytes());
        Self::build_packet(id, INST_READ, &params)
    }

    fn read_status(&self, port: &mut dyn Read, id: u8) -> Result<Vec<u8>, CommError> {
        for _ in 0..=MAX_STRAY_PACKETS {
            let mut head = [0u8; 7];
            port.read_exact(&mut head).map_err(|e| read_error(id, e))?;
            if head[..4] != HEADER {
                return Err(CommError::InvalidResponse {
                    id,
                    reason: format!("Invalid header: {:02X?}", &head[..4]),
                });
            }

            let length = u16::from_le_bytes([head[5], head[6]]) as usize;
            // instruction + error + crc at minimum
            if length < 4 {
                return Err(CommError::InvalidResponse {
                    id,
                    reason: format!("Length field {} too short", length),
                });
            }

            let mut rest = vec![0u8; length];
            port.read_exact(&mut rest).map_err(|e| read_error(id, e))?;

            if head[4] != id {
                debug!("Skipping stray status from motor {} while waiting for {}", head[4], id);
                continue;
            }

            let mut checked = head.to_vec();
            checked.extend_from_slice(&rest[..length - 2]);
            let received = u16::from_le_bytes([rest[length - 2], rest[length - 1]]);
            if Self::crc(&checked) != received {
                return Err(CommError::ChecksumMismatch { id });
            }

            let body = Self::remove_stuffing(&rest[..length - 2]);
            if body[0] != INST_STATUS {
                return Err(CommError::InvalidResponse {
                    id,
                    reason: format!("Expected status instruction, got 0x{:02X}", body[0]),
                });
            }

            // bit 7 flags a hardware alert; any non-zero byte is a fault
            let error = body[1];
            if error != 0 {
                return Err(CommError::DeviceFault { id, code: error });
            }

            return Ok(body[2..].to_vec());
        }

        Err(CommError::InvalidResponse {
            id,
            reason: format!("No status among {} stray packets", MAX_STRAY_PACKETS + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_crc() {
        // FF FF FD 00 01 03 00 01 -> CRC 0x4E19
        let packet = ProtocolV2::build_packet(1, 0x01, &[]).unwrap();
        assert_eq!(packet, vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01, 0x19, 0x4E]);
    }

    #[test]
    fn test_read_packet() {
        let packet = ProtocolV2.read_packet(1, 132, 4).unwrap();
        assert_eq!(
            packet,
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x07, 0x00, 0x02, 0x84, 0x00, 0x04, 0x00, 0x1D, 0x15]
        );
    }

    #[test]
    fn test_write_packet() {
        let packet = ProtocolV2.write_packet(1, 116, &512u32.to_le_bytes()).unwrap();
        assert_eq!(
            packet,
            vec![
                0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x09, 0x00, 0x03, 0x74, 0x00, 0x00, 0x02, 0x00, 0x00,
                0xCA, 0x89
            ]
        );
    }

    #[test]
    fn test_byte_stuffing() {
        let body = [0x03, 0xFF, 0xFF, 0xFD, 0x01];
        let stuffed = ProtocolV2::add_stuffing(&body);
        assert_eq!(stuffed, vec![0x03, 0xFF, 0xFF, 0xFD, 0xFD, 0x01]);
        assert_eq!(ProtocolV2::remove_stuffing(&stuffed), body.to_vec());
    }

    #[test]
    fn test_status_with_fault() {
        let mut packet = vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x04, 0x00, 0x55, 0x04];
        let crc = ProtocolV2::crc(&packet);
        packet.extend_from_slice(&crc.to_le_bytes());

        let mut port = &packet[..];
        assert!(matches!(
            ProtocolV2.read_status(&mut port, 1),
            Err(CommError::DeviceFault { id: 1, code: 0x04 })
        ));
    }

    #[test]
    fn test_stray_status_is_skipped_whole() {
        let mut stream = Vec::new();
        for (id, value) in [(2u8, 300u16), (1, 1000)] {
            let mut packet = vec![0xFF, 0xFF, 0xFD, 0x00, id, 0x06, 0x00, 0x55, 0x00];
            packet.extend_from_slice(&value.to_le_bytes());
            let crc = ProtocolV2::crc(&packet);
            packet.extend_from_slice(&crc.to_le_bytes());
            stream.extend(packet);
        }

        let mut port = &stream[..];
        assert_eq!(ProtocolV2.read_status(&mut port, 1).unwrap(), vec![0xE8, 0x03]);
        assert!(port.is_empty());
    }
}
