// Control-table dialects
//
// Protocol 1 tables have no operating-mode register: wheel and multi-turn
// modes are entered through the CW/CCW angle limits, current limiting goes
// through Max_Torque, and signed values use a sign bit above the magnitude.
// Protocol 2 tables have an explicit Operating_Mode and plain signed registers.

use super::access::RegisterAccess;
use crate::error::{DynioError, Result};
use crate::protocol::ProtocolVersion;
use crate::table::ModelLimits;

/// Operating_Mode values used by protocol-2 tables
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Velocity = 1,
    Position = 3,
    ExtendedPosition = 4,
}

/// Magnitude at which protocol-1 speed registers flip direction
const V1_DIRECTION_BIT: u32 = 1024;

/// Threshold above which a protocol-1 load reading means the other direction
const V1_LOAD_OFFSET: i64 = 1023;

/// Encode a protocol-1 wheel speed: negative magnitudes get 1024 added,
/// non-negative values pass through.
pub fn encode_wheel_velocity(velocity: i32) -> u32 {
    if velocity < 0 {
        velocity.unsigned_abs() + V1_DIRECTION_BIT
    } else {
        velocity as u32
    }
}

/// Decode a protocol-1 Present_Load reading. A negative raw value is invalid
/// and yields -1.
pub fn decode_present_load(raw: i64) -> i32 {
    if raw < 0 {
        -1
    } else if raw > V1_LOAD_OFFSET {
        -((raw - V1_LOAD_OFFSET) as i32)
    } else {
        raw as i32
    }
}

fn require(limits: Option<&ModelLimits>) -> Result<&ModelLimits> {
    limits.ok_or_else(|| DynioError::Configuration("motor has no position limits".to_string()))
}

/// Per-dialect implementation of the mode and unit dependent operations.
pub(crate) trait Dialect: Sync {
    fn set_velocity_mode(&self, regs: &RegisterAccess, goal_current: Option<u32>) -> Result<()>;

    fn set_position_mode(
        &self,
        regs: &RegisterAccess,
        limits: Option<&ModelLimits>,
        min_limit: Option<u32>,
        max_limit: Option<u32>,
        goal_current: Option<u32>,
    ) -> Result<()>;

    fn set_extended_position_mode(
        &self,
        regs: &RegisterAccess,
        limits: Option<&ModelLimits>,
        goal_current: Option<u32>,
    ) -> Result<()>;

    fn set_velocity(&self, regs: &RegisterAccess, velocity: i32) -> Result<()>;

    fn set_acceleration(&self, regs: &RegisterAccess, acceleration: u32) -> Result<()>;

    fn get_current(&self, regs: &RegisterAccess) -> Result<i32>;
}

pub(crate) struct V1Table;

pub(crate) struct V2Table;

pub(crate) fn dialect_for(protocol: ProtocolVersion) -> &'static dyn Dialect {
    match protocol {
        ProtocolVersion::V1 => &V1Table,
        ProtocolVersion::V2 => &V2Table,
    }
}

impl V1Table {
    fn write_angle_limits(regs: &RegisterAccess, cw: u32, ccw: u32) -> Result<()> {
        regs.write("CW_Angle_Limit", cw)?;
        regs.write("CCW_Angle_Limit", ccw)
    }

    fn write_current_limit(regs: &RegisterAccess, goal_current: Option<u32>) -> Result<()> {
        match goal_current {
            Some(current) => regs.write("Max_Torque", current),
            None => Ok(()),
        }
    }
}

impl Dialect for V1Table {
    fn set_velocity_mode(&self, regs: &RegisterAccess, goal_current: Option<u32>) -> Result<()> {
        // both limits at 0 selects wheel mode
        Self::write_angle_limits(regs, 0, 0)?;
        Self::write_current_limit(regs, goal_current)
    }

    fn set_position_mode(
        &self,
        regs: &RegisterAccess,
        limits: Option<&ModelLimits>,
        min_limit: Option<u32>,
        max_limit: Option<u32>,
        goal_current: Option<u32>,
    ) -> Result<()> {
        // a missing bound resets both to the full range
        let (min, max) = match (min_limit, max_limit) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                let limits = require(limits)?;
                (limits.min_position, limits.max_position)
            }
        };
        Self::write_angle_limits(regs, min, max)?;
        Self::write_current_limit(regs, goal_current)
    }

    fn set_extended_position_mode(
        &self,
        regs: &RegisterAccess,
        limits: Option<&ModelLimits>,
        goal_current: Option<u32>,
    ) -> Result<()> {
        // both limits at max selects multi-turn mode
        let max = require(limits)?.max_position;
        Self::write_angle_limits(regs, max, max)?;
        Self::write_current_limit(regs, goal_current)
    }

    fn set_velocity(&self, regs: &RegisterAccess, velocity: i32) -> Result<()> {
        regs.write("Moving_Speed", encode_wheel_velocity(velocity))
    }

    fn set_acceleration(&self, regs: &RegisterAccess, acceleration: u32) -> Result<()> {
        regs.write("Goal_Acceleration", acceleration)
    }

    fn get_current(&self, regs: &RegisterAccess) -> Result<i32> {
        let raw = regs.read("Present_Load")?;
        Ok(decode_present_load(raw as i64))
    }
}

impl V2Table {
    fn write_mode(regs: &RegisterAccess, mode: OperatingMode) -> Result<()> {
        regs.write("Operating_Mode", mode as u32)
    }

    fn write_goal_current(regs: &RegisterAccess, goal_current: Option<u32>) -> Result<()> {
        match goal_current {
            Some(current) => regs.write("Goal_Current", current),
            None => Ok(()),
        }
    }
}

impl Dialect for V2Table {
    fn set_velocity_mode(&self, regs: &RegisterAccess, goal_current: Option<u32>) -> Result<()> {
        Self::write_mode(regs, OperatingMode::Velocity)?;
        Self::write_goal_current(regs, goal_current)
    }

    fn set_position_mode(
        &self,
        regs: &RegisterAccess,
        _limits: Option<&ModelLimits>,
        min_limit: Option<u32>,
        max_limit: Option<u32>,
        goal_current: Option<u32>,
    ) -> Result<()> {
        // unlike protocol 1, omitted bounds leave the stored limits untouched
        Self::write_mode(regs, OperatingMode::Position)?;
        if let Some(min) = min_limit {
            regs.write("Min_Position_Limit", min)?;
        }
        if let Some(max) = max_limit {
            regs.write("Max_Position_Limit", max)?;
        }
        Self::write_goal_current(regs, goal_current)
    }

    fn set_extended_position_mode(
        &self,
        regs: &RegisterAccess,
        _limits: Option<&ModelLimits>,
        goal_current: Option<u32>,
    ) -> Result<()> {
        Self::write_mode(regs, OperatingMode::ExtendedPosition)?;
        Self::write_goal_current(regs, goal_current)
    }

    fn set_velocity(&self, regs: &RegisterAccess, velocity: i32) -> Result<()> {
        // outside velocity mode the speed caps position moves instead
        if regs.read("Operating_Mode")? == OperatingMode::Velocity as u32 {
            regs.write_signed("Goal_Velocity", velocity)
        } else {
            regs.write_signed("Profile_Velocity", velocity)
        }
    }

    fn set_acceleration(&self, regs: &RegisterAccess, acceleration: u32) -> Result<()> {
        regs.write("Profile_Acceleration", acceleration)
    }

    fn get_current(&self, regs: &RegisterAccess) -> Result<i32> {
        Ok(regs.read("Present_Current")? as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_velocity_encoding() {
        assert_eq!(encode_wheel_velocity(-5), 1029);
        assert_eq!(encode_wheel_velocity(5), 5);
        assert_eq!(encode_wheel_velocity(0), 0);
        assert_eq!(encode_wheel_velocity(-1023), 2047);
    }

    #[test]
    fn test_present_load_decoding() {
        assert_eq!(decode_present_load(2000), -977);
        assert_eq!(decode_present_load(500), 500);
        assert_eq!(decode_present_load(1023), 1023);
        assert_eq!(decode_present_load(1024), -1);
        assert_eq!(decode_present_load(-1), -1);
    }
}
