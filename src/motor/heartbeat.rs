// Background keep-alive for boards that disable themselves when the bus goes quiet

use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::access::RegisterAccess;
use crate::error::{DynioError, Result};

/// Writes 1 into a keep-alive register once per interval until cancelled.
///
/// Holds only a weak reference to the motor's register access, so it stops on
/// its own once the motor is gone. Cancellation is checked between writes;
/// a write in progress always completes.
pub struct HeartbeatTask {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatTask {
    pub(crate) fn spawn(
        target: Weak<RegisterAccess>,
        register: &'static str,
        interval: Duration,
    ) -> Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("dynio-heartbeat".to_string())
            .spawn(move || {
                loop {
                    // any message or a dropped sender means stop
                    if !matches!(cancelled.try_recv(), Err(TryRecvError::Empty)) {
                        break;
                    }
                    let Some(regs) = target.upgrade() else {
                        break;
                    };
                    if let Err(e) = regs.write(register, 1) {
                        warn!("Heartbeat to motor {} failed: {}", regs.id(), e);
                    }
                    drop(regs);

                    match cancelled.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                debug!("Heartbeat stopped");
            })
            .map_err(DynioError::Heartbeat)?;

        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for the current write, if any, to finish.
    pub fn cancel(&mut self) {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Heartbeat thread panicked");
            }
        }
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
