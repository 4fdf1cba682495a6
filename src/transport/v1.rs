// Protocol 1.0 framing
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status format: [0xFF, 0xFF, ID, Length, Error, Params..., Checksum]

use std::io::Read;

use tracing::debug;

use super::{MAX_STRAY_PACKETS, PacketCodec, read_error};
use crate::error::CommError;

const HEADER: [u8; 2] = [0xFF, 0xFF];

const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolV1;

impl ProtocolV1 {
    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u32 = data.iter().map(|&b| b as u32).sum();
        !(sum as u8)
    }

    fn build_packet(id: u8, instruction: u8, params: &[u8]) -> Result<Vec<u8>, CommError> {
        if params.len() + 2 > u8::MAX as usize {
            return Err(CommError::InvalidRequest(format!(
                "{} parameter bytes do not fit a protocol 1 packet",
                params.len()
            )));
        }
        let length = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);
        Ok(packet)
    }

    fn short_address(address: u16) -> Result<u8, CommError> {
        u8::try_from(address).map_err(|_| {
            CommError::InvalidRequest(format!("address {address} is out of range for protocol 1"))
        })
    }
}

impl PacketCodec for ProtocolV1 {
    fn write_packet(&self, id: u8, address: u16, data: &[u8]) -> Result<Vec<u8>, CommError> {
        let mut params = Vec::with_capacity(1 + data.len());
        params.push(Self::short_address(address)?);
        params.extend_from_slice(data);
        Self::build_packet(id, INST_WRITE, &params)
    }

    fn read_packet(&self, id: u8, address: u16, length: u16) -> Result<Vec<u8>, CommError> {
        let length = u8::try_from(length).map_err(|_| {
            CommError::InvalidRequest(format!("cannot read {length} bytes with protocol 1"))
        })?;
        Self::build_packet(id, INST_READ, &[Self::short_address(address)?, length])
    }

    fn read_status(&self, port: &mut dyn Read, id: u8) -> Result<Vec<u8>, CommError> {
        for _ in 0..=MAX_STRAY_PACKETS {
            let mut header = [0u8; 2];
            port.read_exact(&mut header).map_err(|e| read_error(id, e))?;
            if header != HEADER {
                return Err(CommError::InvalidResponse {
                    id,
                    reason: format!("Invalid header: {:02X?}", header),
                });
            }

            let mut id_length = [0u8; 2];
            port.read_exact(&mut id_length).map_err(|e| read_error(id, e))?;
            let (got_id, length) = (id_length[0], id_length[1] as usize);
            if length < 2 {
                return Err(CommError::InvalidResponse {
                    id,
                    reason: format!("Length field {} too short", length),
                });
            }

            // error + params + checksum
            let mut remaining = vec![0u8; length];
            port.read_exact(&mut remaining).map_err(|e| read_error(id, e))?;

            if got_id != id {
                debug!("Skipping stray status from motor {} while waiting for {}", got_id, id);
                continue;
            }

            let mut checked = vec![got_id, length as u8];
            checked.extend_from_slice(&remaining[..length - 1]);
            if Self::checksum(&checked) != remaining[length - 1] {
                return Err(CommError::ChecksumMismatch { id });
            }

            let error = remaining[0];
            if error != 0 {
                return Err(CommError::DeviceFault { id, code: error });
            }

            return Ok(remaining[1..length - 1].to_vec());
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
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        assert_eq!(ProtocolV1::checksum(&data), 215);
    }

    #[test]
    fn test_write_packet() {
        let packet = ProtocolV1.write_packet(1, 30, &[0x00, 0x02]).unwrap();
        assert_eq!(packet, vec![0xFF, 0xFF, 0x01, 0x05, 0x03, 0x1E, 0x00, 0x02, 0xD6]);
    }

    #[test]
    fn test_wide_address_rejected() {
        assert!(matches!(
            ProtocolV1.write_packet(1, 300, &[1]),
            Err(CommError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_corrupted_status() {
        let mut bad = &[0xFF, 0xFF, 0x01, 0x02, 0x00, 0x00][..];
        assert!(matches!(
            ProtocolV1.read_status(&mut bad, 1),
            Err(CommError::ChecksumMismatch { id: 1 })
        ));

        // a lone packet from another motor is skipped, then the line is silent
        let mut wrong_id = &[0xFF, 0xFF, 0x02, 0x02, 0x00, 0xFB][..];
        assert!(matches!(
            ProtocolV1.read_status(&mut wrong_id, 1),
            Err(CommError::NoResponse { id: 1 })
        ));
    }

    #[test]
    fn test_stray_status_is_skipped_whole() {
        let mut stream = vec![0xFF, 0xFF, 0x02, 0x04, 0x00, 0x2C, 0x01, 0xCC];
        // id 1, params 0xE8 0x03 (1000)
        stream.extend_from_slice(&[0xFF, 0xFF, 0x01, 0x04, 0x00, 0xE8, 0x03, 0x0F]);

        let mut port = &stream[..];
        assert_eq!(ProtocolV1.read_status(&mut port, 1).unwrap(), vec![0xE8, 0x03]);
        assert!(port.is_empty());
    }
}
