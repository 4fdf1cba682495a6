#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dynio::{CommError, ProtocolVersion, RegisterWidth, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Write {
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        value: u32,
    },
    Read {
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
    },
}

/// Register file per (id, address) that echoes back the last written value
/// and logs every request with the time it reached the bus.
#[derive(Default)]
pub struct MockTransport {
    memory: Mutex<HashMap<(u8, u16), u32>>,
    log: Mutex<Vec<(Instant, Request)>>,
    silent: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register as if the device had set it.
    pub fn set(&self, id: u8, address: u16, value: u32) {
        self.memory.lock().unwrap().insert((id, address), value);
    }

    /// Make every request time out.
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<Request> {
        self.log.lock().unwrap().iter().map(|&(_, r)| r).collect()
    }

    /// When each write to `address` was issued, oldest first.
    pub fn write_times_to(&self, address: u16) -> Vec<Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|&(at, r)| match r {
                Request::Write { address: a, .. } if a == address => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn writes(&self) -> Vec<(u16, u32)> {
        self.log()
            .into_iter()
            .filter_map(|r| match r {
                Request::Write { address, value, .. } => Some((address, value)),
                Request::Read { .. } => None,
            })
            .collect()
    }

    pub fn writes_to(&self, address: u16) -> usize {
        self.writes().iter().filter(|(a, _)| *a == address).count()
    }
}

impl Transport for MockTransport {
    fn write_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
        value: u32,
    ) -> Result<(), CommError> {
        let value = width.mask(value);
        self.log.lock().unwrap().push((
            Instant::now(),
            Request::Write {
                protocol,
                id,
                address,
                value,
            },
        ));
        if self.silent.load(Ordering::SeqCst) {
            return Err(CommError::NoResponse { id });
        }
        self.memory.lock().unwrap().insert((id, address), value);
        Ok(())
    }

    fn read_register(
        &self,
        protocol: ProtocolVersion,
        id: u8,
        address: u16,
        width: RegisterWidth,
    ) -> Result<u32, CommError> {
        self.log.lock().unwrap().push((
            Instant::now(),
            Request::Read {
                protocol,
                id,
                address,
            },
        ));
        if self.silent.load(Ordering::SeqCst) {
            return Err(CommError::NoResponse { id });
        }
        let value = self.memory.lock().unwrap().get(&(id, address)).copied();
        Ok(width.mask(value.unwrap_or(0)))
    }
}
