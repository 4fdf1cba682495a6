// Bus handle: owns the shared transport and hands out motor handles

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{BusConfig, CommErrorPolicy, DEFAULT_TIMEOUT_MS};
use crate::error::{DynioError, Result};
use crate::motor::{DynamixelMotor, ThreeMxlMotor};
use crate::protocol::ProtocolVersion;
use crate::table::{Model, ModelDescription};
use crate::transport::{SerialTransport, Transport};

/// A serial bus shared by any number of motors.
///
/// Motor handles keep a reference to the transport, which serializes their
/// requests. Communication faults are handled per `CommErrorPolicy`; faults
/// that are only reported are counted in `reported_faults`.
pub struct DynamixelBus {
    transport: Arc<dyn Transport>,
    policy: CommErrorPolicy,
    faults: Arc<AtomicU64>,
}

impl DynamixelBus {
    /// Open a serial port with the default read timeout.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let transport =
            SerialTransport::open(port, baud_rate, Duration::from_millis(DEFAULT_TIMEOUT_MS))?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn open_with_config(config: &BusConfig) -> Result<Self> {
        let transport = SerialTransport::open(&config.port, config.baud_rate, config.timeout())?;
        Ok(Self::with_transport(Arc::new(transport)).with_error_policy(config.comm_errors))
    }

    /// Use an already constructed transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: CommErrorPolicy::default(),
            faults: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Policy for motors created after this call.
    pub fn with_error_policy(mut self, policy: CommErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn error_policy(&self) -> CommErrorPolicy {
        self.policy
    }

    /// Communication faults logged and swallowed under `CommErrorPolicy::Report`.
    pub fn reported_faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Motor with an arbitrary control-table description.
    ///
    /// `control_table_protocol` defaults to `protocol` and is ignored on a
    /// protocol-1 link.
    pub fn new_motor(
        &self,
        id: u8,
        description: &ModelDescription,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
    ) -> Result<DynamixelMotor> {
        DynamixelMotor::new(
            Arc::clone(&self.transport),
            id,
            description,
            protocol,
            control_table_protocol,
            self.policy,
            Arc::clone(&self.faults),
        )
    }

    /// Motor of a bundled model. The model's table must carry position limits.
    pub fn new_model(
        &self,
        id: u8,
        model: Model,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
    ) -> Result<DynamixelMotor> {
        let motor = self.new_motor(id, &model.description()?, protocol, control_table_protocol)?;
        if motor.limits().is_none() {
            return Err(DynioError::InvalidTableDescription(format!(
                "{} table has no position limits",
                model.name()
            )));
        }
        Ok(motor)
    }

    pub fn new_ax12(&self, id: u8) -> Result<DynamixelMotor> {
        self.new_model(id, Model::Ax12, ProtocolVersion::V1, None)
    }

    pub fn new_mx12(&self, id: u8) -> Result<DynamixelMotor> {
        self.new_model(id, Model::Mx12, ProtocolVersion::V1, None)
    }

    pub fn new_mx28(
        &self,
        id: u8,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
    ) -> Result<DynamixelMotor> {
        self.new_model(id, Model::Mx28, protocol, control_table_protocol)
    }

    pub fn new_mx64(
        &self,
        id: u8,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
    ) -> Result<DynamixelMotor> {
        self.new_model(id, Model::Mx64, protocol, control_table_protocol)
    }

    pub fn new_mx106(
        &self,
        id: u8,
        protocol: ProtocolVersion,
        control_table_protocol: Option<ProtocolVersion>,
    ) -> Result<DynamixelMotor> {
        self.new_model(id, Model::Mx106, protocol, control_table_protocol)
    }

    pub fn new_3mxl_motor(&self, id: u8) -> Result<ThreeMxlMotor> {
        ThreeMxlMotor::new(
            Arc::clone(&self.transport),
            id,
            &Model::ThreeMxl.description()?,
            self.policy,
            Arc::clone(&self.faults),
        )
    }
}
