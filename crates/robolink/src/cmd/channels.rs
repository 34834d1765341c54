use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use robolink_frame::{channel_name, ChannelNumber, ROBOT_CONTROL, ROBOT_DRIVER};
use robolink_link::protocols::{control, driver};
use robolink_link::{ProtocolHandler, RobotControl, RobotDriver};
use serde::Serialize;

use crate::cmd::ChannelsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct KindRow {
    indicator: u8,
    name: &'static str,
    sender: &'static str,
}

#[derive(Serialize)]
struct ChannelRow {
    channel: u8,
    channel_name: &'static str,
    protocol: &'static str,
    kinds: Vec<KindRow>,
}

const CONTROL_KINDS: &[(u8, &str, &str)] = &[
    (control::MS_SET_MODE, "SetMode", "master"),
    (control::MS_DO_ESTOP, "DoEstop", "master"),
    (control::MS_CLEAR_ESTOP, "ClearEstop", "master"),
    (control::MS_DO_RESET, "DoReset", "master"),
    (control::MS_DO_DUMP_STATE, "DoDumpState", "master"),
    (control::MS_IM_ALIVE, "MasterIsAlive", "master"),
    (control::SM_DID_ESTOP, "DidEstop", "slave"),
    (control::SM_HERE_IS_MY_STATE, "HereIsMyState", "slave"),
    (control::SM_IM_ALIVE, "SlaveIsAlive", "slave"),
];

const DRIVER_KINDS: &[(u8, &str, &str)] = &[
    (driver::MS_DRIVE, "Drive", "master"),
    (driver::MS_STOP, "Stop", "master"),
    (driver::MS_MOVE, "Move", "master"),
    (driver::MS_STEER, "Steer", "master"),
    (driver::MS_SET_BUMP_MODE, "SetBumpMode", "master"),
    (driver::MS_SET_RANGING_MODE, "SetRangingMode", "master"),
];

fn rows() -> Vec<ChannelRow> {
    vec![
        row(ROBOT_CONTROL, RobotControl::NAME, CONTROL_KINDS),
        row(ROBOT_DRIVER, RobotDriver::NAME, DRIVER_KINDS),
    ]
}

fn row(
    number: ChannelNumber,
    protocol: &'static str,
    kinds: &[(u8, &'static str, &'static str)],
) -> ChannelRow {
    ChannelRow {
        channel: number.get(),
        channel_name: channel_name(number),
        protocol,
        kinds: kinds
            .iter()
            .map(|&(indicator, name, sender)| KindRow {
                indicator,
                name,
                sender,
            })
            .collect(),
    }
}

pub fn run(_args: ChannelsArgs, format: OutputFormat) -> CliResult<i32> {
    let rows = rows();
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "PROTOCOL", "KIND", "NAME", "SENDER"]);
            for row in &rows {
                for kind in &row.kinds {
                    table.add_row(vec![
                        format!("{} ({})", row.channel, row.channel_name),
                        row.protocol.to_string(),
                        kind.indicator.to_string(),
                        kind.name.to_string(),
                        kind.sender.to_string(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("channel={} ({}) protocol={}", row.channel, row.channel_name, row.protocol);
                for kind in &row.kinds {
                    println!("  {:>3} {} from {}", kind.indicator, kind.name, kind.sender);
                }
            }
        }
    }
    Ok(SUCCESS)
}
