// Error types for bus, table and motor operations

use thiserror::Error;

/// Failure of a single request/response exchange on the bus.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Timeout waiting for response from motor {id}")]
    NoResponse { id: u8 },

    #[error("Motor {id} returned error status: 0x{code:02X}")]
    DeviceFault { id: u8, code: u8 },

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommError {
    /// True when the device answered and reported a fault itself, as opposed
    /// to the exchange failing on the wire.
    pub fn is_device_fault(&self) -> bool {
        matches!(self, CommError::DeviceFault { .. })
    }
}

/// Failure to bring up the serial port.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Failed to change baud rate of {port} to {baud_rate}: {source}")]
    BaudRate {
        port: String,
        baud_rate: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to open port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

#[derive(Debug, Error)]
pub enum DynioError {
    #[error("Unknown register: {name}")]
    UnknownRegister { name: String },

    #[error("Invalid table description: {0}")]
    InvalidTableDescription(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("Failed to spawn heartbeat thread: {0}")]
    Heartbeat(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DynioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_fault_is_distinguished_from_wire_failure() {
        assert!(CommError::DeviceFault { id: 1, code: 0x04 }.is_device_fault());
        assert!(!CommError::NoResponse { id: 1 }.is_device_fault());
        assert!(!CommError::ChecksumMismatch { id: 1 }.is_device_fault());
    }

    #[test]
    fn comm_errors_convert_into_dynio_errors() {
        let err: DynioError = CommError::NoResponse { id: 7 }.into();
        assert!(matches!(err, DynioError::Comm(CommError::NoResponse { id: 7 })));
        assert_eq!(err.to_string(), "Timeout waiting for response from motor 7");
    }
}
