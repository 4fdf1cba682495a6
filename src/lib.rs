//! Host-side driver for Dynamixel-style serial servos and 3mxl boards.
//!
//! Motors are addressed through named registers resolved against a per-model
//! control table; operations such as "set velocity" or "get current" are
//! translated into the register writes the motor's table dialect expects.
//!
//! ```no_run
//! use dynio::{DynamixelBus, ProtocolVersion};
//!
//! let bus = DynamixelBus::open("/dev/ttyUSB0", 57_600)?;
//! let motor = bus.new_mx64(1, ProtocolVersion::V2, None)?;
//! motor.torque_enable()?;
//! motor.set_angle(90.0)?;
//! # Ok::<(), dynio::DynioError>(())
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod motor;
pub mod protocol;
pub mod table;
pub mod transport;

pub use bus::DynamixelBus;
pub use config::{BusConfig, CommErrorPolicy};
pub use error::{CommError, DynioError, OpenError, Result};
pub use motor::{DynamixelMotor, HeartbeatTask, Motor, ThreeMxlMode, ThreeMxlMotor};
pub use protocol::ProtocolVersion;
pub use table::{Model, ModelDescription, ModelLimits, Register, RegisterTable, RegisterWidth};
pub use transport::{BusPort, PortTransport, SerialTransport, Transport};
