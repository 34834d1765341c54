use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod channels;
pub mod master;
pub mod slave;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulated robot: accept one master and print what it receives.
    Slave(SlaveArgs),
    /// Connect to a robot and send one command.
    Master(MasterArgs),
    /// List the well-known channels and their message kinds.
    Channels(ChannelsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Slave(args) => slave::run(args, format),
        Command::Master(args) => master::run(args, format),
        Command::Channels(args) => channels::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SlaveArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after printing N notices.
    #[arg(long)]
    pub count: Option<usize>,
    /// Capacity of every channel queue.
    #[arg(long, default_value = "64")]
    pub queue_capacity: usize,
    /// Channel the driver protocol runs on.
    #[arg(long, default_value = "2")]
    pub driver_channel: u8,
}

#[derive(Args, Debug)]
pub struct MasterArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Wait for the robot's reply notice and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Channel the driver protocol runs on.
    #[arg(long, default_value = "2")]
    pub driver_channel: u8,
    #[command(subcommand)]
    pub command: MasterCommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCommand {
    /// Set the robot's operating mode.
    SetMode { mode: u8 },
    /// Emergency-stop the robot.
    Estop,
    /// Clear a latched emergency stop.
    ClearEstop {
        #[arg(default_value = "0")]
        indicator: u8,
    },
    /// Reset the robot to its power-on state.
    Reset,
    /// Ask the robot for its state.
    DumpState,
    /// Liveness ping.
    Alive,
    /// Drive at a speed.
    Drive { speed: u8, acceleration: u8 },
    /// Stop driving.
    Stop { acceleration: u8 },
    /// Move a distance.
    Move {
        distance: u8,
        speed: u8,
        acceleration: u8,
    },
    /// Steer to an angle.
    Steer { angle: u8, rate: u8 },
    /// Turn bump detection on or off.
    Bump { state: Toggle },
    /// Turn ranging on or off.
    Ranging { state: Toggle },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Args, Debug, Default)]
pub struct ChannelsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
