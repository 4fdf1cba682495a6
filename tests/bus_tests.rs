use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use dynio::{BusPort, CommErrorPolicy, DynamixelBus, DynioError, Motor, PortTransport};

const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;

/// Protocol 1 servo chain behind a fake serial port. Counts a violation
/// whenever a new instruction arrives before the previous status packet has
/// been drained.
struct EchoPort {
    memory: HashMap<u8, [u8; 256]>,
    pending: VecDeque<u8>,
    violations: Arc<AtomicUsize>,
}

impl EchoPort {
    fn new(violations: Arc<AtomicUsize>) -> Self {
        Self {
            memory: HashMap::new(),
            pending: VecDeque::new(),
            violations,
        }
    }

    fn status(id: u8, params: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFF, 0xFF, id, params.len() as u8 + 2, 0x00];
        packet.extend_from_slice(params);
        let sum: u32 = packet[2..].iter().map(|&b| b as u32).sum();
        packet.push(!(sum as u8));
        packet
    }
}

impl Write for EchoPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            self.violations.fetch_add(1, Ordering::SeqCst);
            self.pending.clear();
        }
        let id = buf[2];
        let instruction = buf[4];
        let params = &buf[5..buf.len() - 1];
        let memory = self.memory.entry(id).or_insert([0; 256]);
        let reply = match instruction {
            INST_WRITE => {
                let address = params[0] as usize;
                memory[address..address + params.len() - 1].copy_from_slice(&params[1..]);
                Self::status(id, &[])
            }
            INST_READ => {
                let address = params[0] as usize;
                let len = params[1] as usize;
                Self::status(id, &memory[address..address + len])
            }
            _ => Self::status(id, &[]),
        };
        // widen the window in which an unserialized caller would interleave
        thread::sleep(Duration::from_micros(50));
        self.pending.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// leaves pending bytes in place so overlapping exchanges stay visible
impl BusPort for EchoPort {}

impl Read for EchoPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

fn echo_bus(violations: &Arc<AtomicUsize>) -> DynamixelBus {
    let transport = PortTransport::new(EchoPort::new(Arc::clone(violations)));
    DynamixelBus::with_transport(Arc::new(transport))
        .with_error_policy(CommErrorPolicy::Escalate)
}

#[test]
fn round_trip_over_the_wire() {
    let violations = Arc::new(AtomicUsize::new(0));
    let bus = echo_bus(&violations);
    let motor = bus.new_ax12(1).unwrap();

    motor.set_position(700).unwrap();
    assert_eq!(
        motor.read_named("Goal_Position").unwrap(),
        700
    );
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_motors_never_interleave_on_the_bus() {
    let violations = Arc::new(AtomicUsize::new(0));
    let bus = echo_bus(&violations);

    let handles: Vec<_> = [1u8, 2, 3]
        .into_iter()
        .map(|id| {
            let motor = bus.new_ax12(id).unwrap();
            thread::spawn(move || {
                for step in 0..100u32 {
                    let target = (id as u32 * 100 + step) % 1024;
                    motor.set_position(target as i32).unwrap();
                    let echoed = motor.read_named("Goal_Position").unwrap();
                    assert_eq!(echoed, target, "motor {id} read back another motor's value");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(bus.reported_faults(), 0);
}

#[test]
fn missing_port_is_an_open_error() {
    let result = DynamixelBus::open("/dev/dynio-no-such-port", 57_600);
    assert!(matches!(
        result,
        Err(DynioError::Open(dynio::OpenError::PortOpen { .. }))
    ));
}

/// Echo port whose first status packet arrives only after the caller has
/// already timed out, landing in the input buffer ahead of the next exchange.
struct LateReplyPort {
    echo: EchoPort,
    held_back: Option<Vec<u8>>,
    delayed_once: bool,
}

impl LateReplyPort {
    fn new() -> Self {
        Self {
            echo: EchoPort::new(Arc::new(AtomicUsize::new(0))),
            held_back: None,
            delayed_once: false,
        }
    }
}

impl BusPort for LateReplyPort {
    fn clear_input(&mut self) -> io::Result<()> {
        self.echo.pending.clear();
        Ok(())
    }
}

impl Write for LateReplyPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // unread bytes stay ahead of the new reply, as on a real line
        let unread: Vec<u8> = self.echo.pending.drain(..).collect();
        let n = self.echo.write(buf)?;
        if buf[4] == INST_READ && !self.delayed_once {
            self.delayed_once = true;
            self.held_back = Some(self.echo.pending.drain(..).collect());
        }
        for byte in unread.into_iter().rev() {
            self.echo.pending.push_front(byte);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for LateReplyPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.echo.pending.is_empty() {
            // the device answers just after the caller gave up
            if let Some(late) = self.held_back.take() {
                self.echo.pending.extend(late);
            }
            return Err(io::ErrorKind::TimedOut.into());
        }
        self.echo.read(buf)
    }
}

#[test]
fn late_reply_is_not_taken_for_the_next_answer() {
    let bus = DynamixelBus::with_transport(Arc::new(PortTransport::new(LateReplyPort::new())))
        .with_error_policy(CommErrorPolicy::Escalate);
    let motor = bus.new_ax12(1).unwrap();

    motor.set_position(300).unwrap();
    assert!(matches!(
        motor.read_named("Goal_Position"),
        Err(DynioError::Comm(dynio::CommError::NoResponse { id: 1 }))
    ));

    motor.set_position(1000).unwrap();
    assert_eq!(motor.read_named("Goal_Position").unwrap(), 1000);
    assert_eq!(motor.read_named("Goal_Position").unwrap(), 1000);
}
