// dynio command line: inspect and drive motors on a serial bus

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use dynio::{
    BusConfig, CommErrorPolicy, DynamixelBus, DynamixelMotor, Model, Motor, ProtocolVersion,
    RegisterTable,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "dynio", version, about = "Read and write Dynamixel / 3mxl registers")]
struct Cli {
    /// Serial port (overrides the config file)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// JSON bus configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail on communication errors instead of logging them
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Ax12,
    Mx12,
    Mx28,
    Mx64,
    Mx106,
    #[value(name = "3mxl")]
    ThreeMxl,
}

impl From<ModelArg> for Model {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Ax12 => Model::Ax12,
            ModelArg::Mx12 => Model::Mx12,
            ModelArg::Mx28 => Model::Mx28,
            ModelArg::Mx64 => Model::Mx64,
            ModelArg::Mx106 => Model::Mx106,
            ModelArg::ThreeMxl => Model::ThreeMxl,
        }
    }
}

#[derive(Args)]
struct Target {
    /// Motor id on the bus
    #[arg(long)]
    id: u8,

    #[arg(long, value_enum, default_value = "ax12")]
    model: ModelArg,

    /// Wire protocol (1 or 2)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    protocol: u8,

    /// Control-table dialect, if different from the wire protocol
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    table_protocol: Option<u8>,
}

impl Target {
    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::from_number(self.protocol).unwrap_or(ProtocolVersion::V1)
    }

    fn table_protocol(&self) -> Option<ProtocolVersion> {
        self.table_protocol.and_then(ProtocolVersion::from_number)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TorqueState {
    On,
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// List the registers of a bundled control table
    Registers {
        #[arg(long, value_enum)]
        model: ModelArg,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
        protocol: u8,
    },
    /// Read a named register
    Read {
        #[command(flatten)]
        target: Target,
        register: String,
    },
    /// Write a named register
    Write {
        #[command(flatten)]
        target: Target,
        register: String,
        value: u32,
    },
    /// Print the present angle in degrees
    Angle {
        #[command(flatten)]
        target: Target,
    },
    /// Move to an angle in degrees
    SetAngle {
        #[command(flatten)]
        target: Target,
        degrees: f64,
    },
    /// Enable or disable torque
    Torque {
        #[command(flatten)]
        target: Target,
        #[arg(value_enum)]
        state: TorqueState,
    },
    /// Poll position, angle and current until Ctrl+C
    Monitor {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=1000))]
        hz: u64,
    },
    /// Keep a 3mxl board alive until Ctrl+C
    Heartbeat {
        #[arg(long)]
        id: u8,
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },
}

fn bus_config(cli: &Cli) -> CliResult<BusConfig> {
    let mut config = match &cli.config {
        Some(path) => BusConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => BusConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if cli.strict {
        config.comm_errors = CommErrorPolicy::Escalate;
    }
    Ok(config)
}

fn open_motor(bus: &DynamixelBus, target: &Target) -> CliResult<Box<dyn Motor>> {
    let motor: Box<dyn Motor> = match target.model {
        ModelArg::ThreeMxl => Box::new(bus.new_3mxl_motor(target.id)?),
        model => Box::new(bus.new_model(
            target.id,
            model.into(),
            target.protocol(),
            target.table_protocol(),
        )?),
    };
    Ok(motor)
}

fn open_servo(bus: &DynamixelBus, target: &Target) -> CliResult<DynamixelMotor> {
    if matches!(target.model, ModelArg::ThreeMxl) {
        return Err("3mxl boards have no angle conversion; use read/write".into());
    }
    Ok(bus.new_model(
        target.id,
        target.model.into(),
        target.protocol(),
        target.table_protocol(),
    )?)
}

fn print_table(model: Model, protocol: ProtocolVersion) -> CliResult<()> {
    let description = model.description()?;
    let table = RegisterTable::from_description(description.dialect(protocol)?, protocol)?;
    let mut registers: Vec<_> = table.iter().collect();
    registers.sort_by_key(|r| r.address);

    println!("{} ({}), {} registers", model.name(), table.protocol(), table.len());
    for reg in registers {
        println!("  {:>4}  {}B  {}", reg.address, reg.width.bytes(), reg.name);
    }
    Ok(())
}

async fn monitor(motor: DynamixelMotor, hz: u64) -> CliResult<()> {
    let motor = Arc::new(motor);
    let mut tick = interval(Duration::from_millis(1000 / hz.clamp(1, 1000)));
    info!("Monitoring motor {} at {}Hz, Ctrl+C to stop", motor.id(), hz);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let m = Arc::clone(&motor);
                // serial reads block; keep them off the async workers
                let sample = tokio::task::spawn_blocking(move || {
                    Ok::<_, dynio::DynioError>((m.get_position()?, m.get_angle()?, m.get_current()?))
                })
                .await?;
                match sample {
                    Ok((position, angle, current)) => {
                        info!("position={} angle={:.1} current={}", position, angle, current)
                    }
                    Err(e) => warn!("Read failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Command::Registers { model, protocol } = &cli.command {
        let protocol = ProtocolVersion::from_number(*protocol).unwrap_or(ProtocolVersion::V1);
        return print_table((*model).into(), protocol);
    }

    let config = bus_config(&cli)?;
    let bus = DynamixelBus::open_with_config(&config)?;

    match &cli.command {
        Command::Registers { .. } => {}
        Command::Read { target, register } => {
            let motor = open_motor(&bus, target)?;
            println!("{} = {}", register, motor.read_named(register)?);
        }
        Command::Write {
            target,
            register,
            value,
        } => {
            let motor = open_motor(&bus, target)?;
            motor.write_named(register, *value)?;
        }
        Command::Angle { target } => {
            let motor = open_servo(&bus, target)?;
            println!("{:.2}", motor.get_angle()?);
        }
        Command::SetAngle { target, degrees } => {
            open_servo(&bus, target)?.set_angle(*degrees)?;
        }
        Command::Torque { target, state } => {
            let motor = open_servo(&bus, target)?;
            match state {
                TorqueState::On => motor.torque_enable()?,
                TorqueState::Off => motor.torque_disable()?,
            }
        }
        Command::Monitor { target, hz } => {
            monitor(open_servo(&bus, target)?, *hz).await?;
        }
        Command::Heartbeat { id, interval_ms } => {
            let motor = bus.new_3mxl_motor(*id)?;
            motor.start_heartbeat_every(Duration::from_millis(*interval_ms))?;
            tokio::signal::ctrl_c().await?;
            motor.stop_heartbeat();
        }
    }

    if bus.reported_faults() > 0 {
        warn!("{} communication fault(s) were reported", bus.reported_faults());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug to see every register access)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("dynio error: {}", e);
        std::process::exit(1);
    }
}
