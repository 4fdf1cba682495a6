// Bus transport: width-parameterized register read/write over a shared port
//
// One request/response exchange holds the port lock from the first byte
// written until the status packet has been read, so exchanges from several
// motors (or the heartbeat thread) never interleave on the half-duplex bus.

mod v1;
mod v2;

use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::error::{CommError, OpenError};
use crate::protocol::ProtocolVersion;
use crate::table::RegisterWidth;

pub use v1::ProtocolV1;
pub use v2::ProtocolV2;

/// Broadcast id; devices never answer a request sent to it.
pub const BROADCAST_ID: u8 = 0xFE;

/// Status packets from other ids skipped before giving up on one exchange.
pub(crate) const MAX_STRAY_PACKETS: usize = 8;

/// Register-level access to devices on one bus.
pub trait Transport: Send + Sync {
    fn write_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
        value: u32,
    ) -> Result<(), CommError>;

    fn read_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
    ) -> Result<u32, CommError>;
}

/// Framing for one protocol revision.
pub trait PacketCodec: Sync {
    /// Instruction packet writing `data` starting at `address`.
    fn write_packet(&self, id: u8, address: u16, data: &[u8]) -> Result<Vec<u8>, CommError>;

    /// Instruction packet reading `length` bytes starting at `address`.
    fn read_packet(&self, id: u8, address: u16, length: u16) -> Result<Vec<u8>, CommError>;

    /// Read one status packet from `id` and return its parameters.
    fn read_status(&self, port: &mut dyn Read, id: u8) -> Result<Vec<u8>, CommError>;
}

/// Byte stream a `PortTransport` can drive.
pub trait BusPort: Read + Write + Send {
    /// Discard anything received but not yet read, such as a status packet
    /// that arrived after its exchange timed out.
    fn clear_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl BusPort for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

pub fn codec_for(protocol: ProtocolVersion) -> &'static dyn PacketCodec {
    match protocol {
        ProtocolVersion::V1 => &ProtocolV1,
        ProtocolVersion::V2 => &ProtocolV2,
    }
}

/// Map a failed read on the port to a bus error. Running out of bytes means
/// the device stopped answering, same as a timeout.
pub(crate) fn read_error(id: u8, e: std::io::Error) -> CommError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
            CommError::NoResponse { id }
        }
        _ => CommError::Io(e),
    }
}

/// Transport over any bus port, serialized by a mutex.
pub struct PortTransport<P> {
    port: Mutex<P>,
}

/// Transport over a real serial port.
pub type SerialTransport = PortTransport<Box<dyn SerialPort>>;

impl<P: BusPort> PortTransport<P> {
    pub fn new(port: P) -> Self {
        Self {
            port: Mutex::new(port),
        }
    }

    fn lock(&self) -> MutexGuard<'_, P> {
        // a panic mid-exchange leaves the port usable; leftover bytes are
        // drained before the next request
        self.port.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Send one instruction packet and, unless broadcast, collect the status.
    fn exchange(
        &self,
        codec: &dyn PacketCodec,
        id: u8,
        packet: &[u8],
    ) -> Result<Option<Vec<u8>>, CommError> {
        let mut port = self.lock();
        // a late reply to an earlier request must not answer this one
        port.clear_input()?;
        port.write_all(packet)?;
        port.flush()?;

        if id == BROADCAST_ID {
            return Ok(None);
        }
        codec.read_status(&mut *port, id).map(Some)
    }
}

impl SerialTransport {
    /// Open and configure a serial port.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, OpenError> {
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| OpenError::PortOpen {
                port: port_name.to_string(),
                source,
            })?;

        port.set_baud_rate(baud_rate)
            .map_err(|source| OpenError::BaudRate {
                port: port_name.to_string(),
                baud_rate,
                source,
            })?;

        info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self::new(port))
    }
}

impl<P: BusPort> Transport for PortTransport<P> {
    fn write_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
        value: u32,
    ) -> Result<(), CommError> {
        let codec = codec_for(protocol);
        let packet = codec.write_packet(id, address, &width.encode(value))?;
        debug!(
            "{} write to motor {}: addr={}, width={}, value={}",
            protocol,
            id,
            address,
            width.bytes(),
            value
        );
        self.exchange(codec, id, &packet)?;
        Ok(())
    }

    fn read_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
    ) -> Result<u32, CommError> {
        if id == BROADCAST_ID {
            return Err(CommError::InvalidRequest(
                "cannot read from the broadcast id".to_string(),
            ));
        }

        let codec = codec_for(protocol);
        let packet = codec.read_packet(id, address, width.bytes() as u16)?;
        let params = self.exchange(codec, id, &packet)?.unwrap_or_default();

        width
            .decode(&params)
            .ok_or_else(|| CommError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", width.bytes(), params.len()),
            })
    }
}
