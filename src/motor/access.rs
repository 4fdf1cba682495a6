// Named register access shared by every motor family

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::config::CommErrorPolicy;
use crate::error::{CommError, Result};
use crate::protocol::ProtocolVersion;
use crate::table::{Register, RegisterTable};
use crate::transport::Transport;

/// Resolves register names against one control table and forwards the
/// request to the shared transport for one device id.
pub(crate) struct RegisterAccess {
    transport: Arc<dyn Transport>,
    protocol: ProtocolVersion,
    id: u8,
    table: Arc<RegisterTable>,
    policy: CommErrorPolicy,
    faults: Arc<AtomicU64>,
}

impl std::fmt::Debug for RegisterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterAccess")
            .field("protocol", &self.protocol)
            .field("id", &self.id)
            .field("table", &self.table)
            .field("policy", &self.policy)
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

impl RegisterAccess {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        protocol: ProtocolVersion,
        id: u8,
        table: RegisterTable,
        policy: CommErrorPolicy,
        faults: Arc<AtomicU64>,
    ) -> Self {
        Self {
            transport,
            protocol,
            id,
            table: Arc::new(table),
            policy,
            faults,
        }
    }

    pub(crate) fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub(crate) fn table(&self) -> &RegisterTable {
        &self.table
    }

    pub(crate) fn write(&self, name: &str, value: u32) -> Result<()> {
        let reg = self.table.resolve(name)?;
        debug!(
            "Write to motor {}: {} (addr={}, width={}) = {}",
            self.id,
            reg.name,
            reg.address,
            reg.width.bytes(),
            value
        );

        match self
            .transport
            .write_register(self.protocol, self.id, reg.address, reg.width, value)
        {
            Ok(()) => Ok(()),
            Err(e) => self.comm_fault(reg, e),
        }
    }

    /// Write a signed value as its two's complement, truncated to the register width.
    pub(crate) fn write_signed(&self, name: &str, value: i32) -> Result<()> {
        self.write(name, value as u32)
    }

    pub(crate) fn read(&self, name: &str) -> Result<u32> {
        let reg = self.table.resolve(name)?;

        match self
            .transport
            .read_register(self.protocol, self.id, reg.address, reg.width)
        {
            Ok(value) => {
                debug!(
                    "Read from motor {}: {} (addr={}, width={}) = {}",
                    self.id,
                    reg.name,
                    reg.address,
                    reg.width.bytes(),
                    value
                );
                Ok(value)
            }
            Err(e) => self.comm_fault(reg, e).map(|()| 0),
        }
    }

    /// Under `Report` the fault is logged and counted and the operation
    /// carries on; under `Escalate` it is returned.
    fn comm_fault(&self, reg: &Register, e: CommError) -> Result<()> {
        match self.policy {
            CommErrorPolicy::Report => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!("Motor {} register {}: {}", self.id, reg.name, e);
                Ok(())
            }
            CommErrorPolicy::Escalate => Err(e.into()),
        }
    }
}
