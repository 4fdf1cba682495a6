// Motor handles
//
// Provides:
// - Named register access shared by all motor families
// - AX/MX motors with protocol-1 and protocol-2 control-table dialects
// - 3mxl boards with a cancellable keep-alive

mod access;
mod dialect;
mod dynamixel;
mod heartbeat;
mod three_mxl;

pub use dialect::{OperatingMode, decode_present_load, encode_wheel_velocity};
pub use dynamixel::DynamixelMotor;
pub use heartbeat::HeartbeatTask;
pub use three_mxl::{ThreeMxlMode, ThreeMxlMotor};

use crate::error::Result;
use crate::protocol::ProtocolVersion;
use crate::table::RegisterTable;

/// Register-level interface common to every motor family.
pub trait Motor: Send + Sync {
    fn id(&self) -> u8;

    /// Wire protocol requests are framed with.
    fn protocol(&self) -> ProtocolVersion;

    fn table(&self) -> &RegisterTable;

    fn write_named(&self, name: &str, value: u32) -> Result<()>;

    fn read_named(&self, name: &str) -> Result<u32>;
}
