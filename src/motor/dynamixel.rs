// Dynamixel AX/MX family motors driven through either control-table dialect

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tracing::debug;

use super::Motor;
use super::access::RegisterAccess;
use super::dialect::{Dialect, dialect_for};
use crate::config::CommErrorPolicy;
use crate::error::{DynioError, Result};
use crate::protocol::ProtocolVersion;
use crate::table::{ModelDescription, ModelLimits, RegisterTable};
use crate::transport::Transport;

/// One AX/MX motor on a shared bus.
///
/// `protocol` selects the wire framing, `control_table_protocol` the register
/// layout. They only differ for protocol-2 motors configured to keep the
/// protocol-1 table.
#[derive(Debug)]
pub struct DynamixelMotor {
    regs: RegisterAccess,
    control_table_protocol: ProtocolVersion,
    limits: Option<ModelLimits>,
}

impl DynamixelMotor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        id: u8,
        description: &ModelDescription,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
        policy: CommErrorPolicy,
        faults: Arc<AtomicU64>,
    ) -> Result<Self> {
        // a protocol-1 link can only carry the protocol-1 table
        let control_table_protocol = match (protocol, control_table_protocol) {
            (ProtocolVersion::V1, _) | (_, None) => protocol,
            (_, Some(table)) => table,
        };

        let dialect = description.dialect(control_table_protocol)?;
        let table = RegisterTable::from_description(dialect, control_table_protocol)?;
        let limits = dialect.limits()?;

        debug!(
            "Motor {}: {} wire, {} table, {} registers",
            id,
            protocol,
            control_table_protocol,
            table.len()
        );

        Ok(Self {
            regs: RegisterAccess::new(transport, protocol, id, table, policy, faults),
            control_table_protocol,
            limits,
        })
    }

    fn dialect(&self) -> &'static dyn Dialect {
        dialect_for(self.control_table_protocol)
    }

    fn required_limits(&self) -> Result<&ModelLimits> {
        self.limits.as_ref().ok_or_else(|| {
            DynioError::Configuration(format!(
                "motor {} has no position limits for angle conversion",
                self.regs.id()
            ))
        })
    }

    pub fn control_table_protocol(&self) -> ProtocolVersion {
        self.control_table_protocol
    }

    pub fn limits(&self) -> Option<&ModelLimits> {
        self.limits.as_ref()
    }

    /// Wheel mode, optionally capping current.
    pub fn set_velocity_mode(&self, goal_current: Option<u32>) -> Result<()> {
        self.dialect().set_velocity_mode(&self.regs, goal_current)
    }

    /// Joint mode.
    ///
    /// With the protocol-1 table, omitting either bound writes the model's
    /// full range for both. With the protocol-2 table only the bounds given
    /// are written.
    pub fn set_position_mode(
        &self,
        min_limit: Option<u32>,
        max_limit: Option<u32>,
        goal_current: Option<u32>,
    ) -> Result<()> {
        self.dialect().set_position_mode(
            &self.regs,
            self.limits.as_ref(),
            min_limit,
            max_limit,
            goal_current,
        )
    }

    /// Multi-turn mode.
    pub fn set_extended_position_mode(&self, goal_current: Option<u32>) -> Result<()> {
        self.dialect()
            .set_extended_position_mode(&self.regs, self.limits.as_ref(), goal_current)
    }

    pub fn set_velocity(&self, velocity: i32) -> Result<()> {
        self.dialect().set_velocity(&self.regs, velocity)
    }

    pub fn set_acceleration(&self, acceleration: u32) -> Result<()> {
        self.dialect().set_acceleration(&self.regs, acceleration)
    }

    pub fn set_position(&self, position: i32) -> Result<()> {
        self.regs.write_signed("Goal_Position", position)
    }

    pub fn get_position(&self) -> Result<i32> {
        Ok(self.regs.read("Present_Position")? as i32)
    }

    /// Move to an angle in degrees within `[0, max_angle]`.
    pub fn set_angle(&self, angle: f64) -> Result<()> {
        let position = self.required_limits()?.angle_to_position(angle)?;
        let position = i32::try_from(position).map_err(|_| {
            DynioError::Configuration(format!("angle {angle} maps outside the position range"))
        })?;
        self.set_position(position)
    }

    /// Present position in degrees.
    pub fn get_angle(&self) -> Result<f64> {
        let limits = *self.required_limits()?;
        let position = self.get_position()?;
        limits.position_to_angle(position as i64)
    }

    /// Present load (protocol-1 table) or present current (protocol-2 table).
    pub fn get_current(&self) -> Result<i32> {
        self.dialect().get_current(&self.regs)
    }

    pub fn torque_enable(&self) -> Result<()> {
        self.regs.write("Torque_Enable", 1)
    }

    pub fn torque_disable(&self) -> Result<()> {
        self.regs.write("Torque_Enable", 0)
    }
}

impl Motor for DynamixelMotor {
    fn id(&self) -> u8 {
        self.regs.id()
    }

    fn protocol(&self) -> ProtocolVersion {
        self.regs.protocol()
    }

    fn table(&self) -> &RegisterTable {
        self.regs.table()
    }

    fn write_named(&self, name: &str, value: u32) -> Result<()> {
        self.regs.write(name, value)
    }

    fn read_named(&self, name: &str) -> Result<u32> {
        self.regs.read(name)
    }
}
