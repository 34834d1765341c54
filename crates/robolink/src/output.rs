use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use robolink_link::{LinkStatsSnapshot, Notice, Publication};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct NoticeOutput<'a> {
    #[serde(flatten)]
    notice: &'a Notice,
    source: String,
    timestamp: String,
}

pub fn print_notice(publication: &Publication, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = NoticeOutput {
                notice: &publication.notice,
                source: publication.source.to_string(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NOTICE", "SOURCE", "DETAIL"])
                .add_row(vec![
                    publication.notice.name().to_string(),
                    publication.source.to_string(),
                    notice_detail(&publication.notice),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "notice={} source={} {}",
                publication.notice.name(),
                publication.source,
                notice_detail(&publication.notice)
            );
        }
    }
}

pub fn print_stats(link: &str, stats: &LinkStatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct StatsOutput<'a> {
                link: &'a str,
                #[serde(flatten)]
                stats: &'a LinkStatsSnapshot,
            }
            println!(
                "{}",
                serde_json::to_string(&StatsOutput { link, stats })
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["LINK", "IN", "OUT", "UNROUTABLE", "MALFORMED", "REJECTED"])
                .add_row(vec![
                    link.to_string(),
                    stats.frames_in.to_string(),
                    stats.frames_out.to_string(),
                    stats.unroutable.to_string(),
                    stats.malformed.to_string(),
                    stats.rejected.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "link={link} in={} out={} unroutable={} malformed={} rejected={}",
                stats.frames_in, stats.frames_out, stats.unroutable, stats.malformed, stats.rejected
            );
        }
    }
}

fn notice_detail(notice: &Notice) -> String {
    match notice {
        Notice::EstopOccurred => String::new(),
        Notice::IsAlive { peer } => format!("peer={peer}"),
        Notice::RobotStateUpdated { state } => format!(
            "time={} mode={} estop={}",
            state.time, state.mode, state.estop
        ),
        Notice::ControlCommand { command } => format!("{command:?}"),
        Notice::DriveCommand { command } => format!("{command:?}"),
        Notice::LinkFailure { link, reason } => format!("link={link} reason={reason}"),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
