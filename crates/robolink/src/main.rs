mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "robolink", version, about = "Master/slave robot link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "ROBOLINK_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{MasterCommand, Toggle};

    #[test]
    fn parses_master_drive() {
        let cli = Cli::try_parse_from([
            "robolink",
            "master",
            "/tmp/robot.sock",
            "drive",
            "5",
            "3",
        ])
        .expect("master args should parse");

        match cli.command {
            Command::Master(args) => assert_eq!(
                args.command,
                MasterCommand::Drive {
                    speed: 5,
                    acceleration: 3
                }
            ),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_toggles() {
        let cli = Cli::try_parse_from(["robolink", "master", "/tmp/robot.sock", "bump", "on"])
            .expect("bump args should parse");
        assert!(matches!(
            cli.command,
            Command::Master(args) if args.command == MasterCommand::Bump { state: Toggle::On }
        ));
    }

    #[test]
    fn rejects_out_of_range_arguments() {
        let err = Cli::try_parse_from(["robolink", "master", "/tmp/robot.sock", "set-mode", "256"])
            .expect_err("256 does not fit a byte");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_slave_with_wait_options() {
        let cli = Cli::try_parse_from([
            "robolink",
            "slave",
            "/tmp/robot.sock",
            "--count",
            "2",
            "--driver-channel",
            "10",
        ])
        .expect("slave args should parse");
        match cli.command {
            Command::Slave(args) => {
                assert_eq!(args.count, Some(2));
                assert_eq!(args.driver_channel, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
