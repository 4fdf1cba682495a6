// 3mxl motor control board (protocol 1 wire, its own control table)

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use super::Motor;
use super::access::RegisterAccess;
use super::heartbeat::HeartbeatTask;
use crate::config::{
    CommErrorPolicy, HEARTBEAT_INTERVAL, HEARTBEAT_REGISTER, MIN_HEARTBEAT_INTERVAL,
};
use crate::error::{DynioError, Result};
use crate::protocol::ProtocolVersion;
use crate::table::{ModelDescription, RegisterTable};
use crate::transport::Transport;

/// Speed and acceleration registers hold hundredths of the user unit
const CENTI: i32 = 100;

/// Values of M3XL_CONTROL_MODE
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreeMxlMode {
    Position = 0,
    Velocity = 1,
    Current = 2,
    Torque = 3,
    Sea = 4,
    Pwm = 5,
    Stop = 12,
    StartUp = 15,
    SinusoidalPosition = 16,
    Test = 17,
}

pub struct ThreeMxlMotor {
    regs: Arc<RegisterAccess>,
    heartbeat: Mutex<Option<HeartbeatTask>>,
}

impl ThreeMxlMotor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        id: u8,
        description: &ModelDescription,
        policy: CommErrorPolicy,
        faults: Arc<AtomicU64>,
    ) -> Result<Self> {
        let protocol = ProtocolVersion::V1;
        let table = RegisterTable::from_description(description.dialect(protocol)?, protocol)?;
        Ok(Self {
            regs: Arc::new(RegisterAccess::new(
                transport, protocol, id, table, policy, faults,
            )),
            heartbeat: Mutex::new(None),
        })
    }

    // -- heartbeat --

    /// Start the keep-alive at the default one second interval.
    pub fn start_heartbeat(&self) -> Result<()> {
        self.start_heartbeat_every(HEARTBEAT_INTERVAL)
    }

    /// Start the keep-alive. Does nothing if it is already running.
    ///
    /// Intervals below one millisecond are rejected.
    pub fn start_heartbeat_every(&self, interval: Duration) -> Result<()> {
        if interval < MIN_HEARTBEAT_INTERVAL {
            return Err(DynioError::Configuration(format!(
                "heartbeat interval {:?} is below the {:?} minimum",
                interval, MIN_HEARTBEAT_INTERVAL
            )));
        }
        // fail here rather than inside the thread
        self.regs.table().resolve(HEARTBEAT_REGISTER)?;

        let mut slot = self.heartbeat.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(HeartbeatTask::is_running) {
            debug!("Heartbeat for motor {} already running", self.regs.id());
            return Ok(());
        }

        *slot = Some(HeartbeatTask::spawn(
            Arc::downgrade(&self.regs),
            HEARTBEAT_REGISTER,
            interval,
        )?);
        info!(
            "Heartbeat for motor {} started every {:?}",
            self.regs.id(),
            interval
        );
        Ok(())
    }

    pub fn stop_heartbeat(&self) {
        let task = self
            .heartbeat
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(mut task) = task {
            task.cancel();
            info!("Heartbeat for motor {} stopped", self.regs.id());
        }
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(HeartbeatTask::is_running)
    }

    // -- set commands --

    pub fn set_mode(&self, mode: ThreeMxlMode) -> Result<()> {
        self.regs.write("M3XL_CONTROL_MODE", mode as u32)
    }

    pub fn set_position_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Position)
    }

    pub fn set_velocity_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Velocity)
    }

    pub fn set_current_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Current)
    }

    pub fn set_torque_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Torque)
    }

    pub fn set_sea_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Sea)
    }

    pub fn set_pwm_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Pwm)
    }

    pub fn set_stop_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Stop)
    }

    pub fn set_start_up_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::StartUp)
    }

    pub fn set_sinusoidal_position_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::SinusoidalPosition)
    }

    pub fn set_test_mode(&self) -> Result<()> {
        self.set_mode(ThreeMxlMode::Test)
    }

    pub fn set_velocity(&self, velocity: i32) -> Result<()> {
        self.regs
            .write_signed("M3XL_DESIRED_SPEED", velocity.saturating_mul(CENTI))
    }

    pub fn set_velocity_linear(&self, velocity: i32) -> Result<()> {
        self.regs
            .write_signed("M3XL_DESIRED_LINEAR_SPEED", velocity.saturating_mul(CENTI))
    }

    pub fn set_acceleration(&self, acceleration: i32) -> Result<()> {
        self.regs
            .write_signed("M3XL_DESIRED_ACCEL", acceleration.saturating_mul(CENTI))
    }

    pub fn set_acceleration_linear(&self, acceleration: i32) -> Result<()> {
        self.regs.write_signed(
            "M3XL_DESIRED_LINEAR_ACCEL",
            acceleration.saturating_mul(CENTI),
        )
    }

    pub fn set_position(&self, position: i32) -> Result<()> {
        self.regs.write_signed("M3XL_DESIRED_POSITION_32", position)
    }

    pub fn set_angle(&self, angle: i32) -> Result<()> {
        self.regs.write_signed("M3XL_DESIRED_ANGLE", angle)
    }

    pub fn set_current(&self, current: i32) -> Result<()> {
        self.regs.write_signed("M3XL_DESIRED_CURRENT", current)
    }

    pub fn set_p_current(&self, gain: u32) -> Result<()> {
        self.regs.write("M3XL_P_CURRENT", gain)
    }

    pub fn set_i_current(&self, gain: u32) -> Result<()> {
        self.regs.write("M3XL_I_CURRENT", gain)
    }

    pub fn set_d_current(&self, gain: u32) -> Result<()> {
        self.regs.write("M3XL_D_CURRENT", gain)
    }

    pub fn set_il_current(&self, limit: u32) -> Result<()> {
        self.regs.write("M3XL_IL_CURRENT", limit)
    }

    // -- get commands --

    pub fn get_voltage(&self) -> Result<u32> {
        self.regs.read("M3XL_VOLTAGE")
    }

    pub fn get_current(&self) -> Result<u32> {
        self.regs.read("M3XL_CURRENT")
    }

    pub fn get_p_current(&self) -> Result<u32> {
        self.regs.read("M3XL_P_CURRENT")
    }

    pub fn get_i_current(&self) -> Result<u32> {
        self.regs.read("M3XL_I_CURRENT")
    }

    pub fn get_d_current(&self) -> Result<u32> {
        self.regs.read("M3XL_D_CURRENT")
    }

    pub fn get_il_current(&self) -> Result<u32> {
        self.regs.read("M3XL_IL_CURRENT")
    }

    pub fn get_torque(&self) -> Result<u32> {
        self.regs.read("M3XL_TORQUE")
    }

    pub fn get_angle(&self) -> Result<u32> {
        self.regs.read("M3XL_ANGLE")
    }

    pub fn get_angular_rate(&self) -> Result<u32> {
        self.regs.read("M3XL_ANGULAR_RATE")
    }

    pub fn get_position(&self) -> Result<u32> {
        self.regs.read("M3XL_POSITION_32")
    }

    pub fn get_velocity(&self) -> Result<u32> {
        self.regs.read("M3XL_SPEED")
    }
}

impl Motor for ThreeMxlMotor {
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

impl Drop for ThreeMxlMotor {
    fn drop(&mut self) {
        // the keep-alive must not outlive the motor handle
        self.stop_heartbeat();
    }
}
