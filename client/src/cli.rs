use clap::{Args, Parser, Subcommand, ValueEnum};
use common::{
    actions::RemoteAction,
    hints::HintValue,
    notify_err,
    protocol::Urgency,
    utils::errors::{NotifyError, NotifyErrorKind},
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nemo-notify", version, about = "Send and inspect desktop notifications")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `client=trace` (falls back to RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish a notification
    Send(SendArgs),
    /// Close a notification by id
    Close {
        id: u32,
    },
    /// List notifications held by the manager
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    pub summary: String,

    #[arg(default_value = "")]
    pub body: String,

    #[arg(long)]
    pub app_name: Option<String>,

    /// Icon path, URI or theme name
    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long)]
    pub app_icon: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, value_enum)]
    pub urgency: Option<UrgencyArg>,

    /// Expiry in milliseconds, 0 never expires
    #[arg(long)]
    pub timeout: Option<i32>,

    /// Id of a notification to replace
    #[arg(long)]
    pub replaces_id: Option<u32>,

    /// Action as NAME=DISPLAY; repeatable
    #[arg(long = "action", value_parser = parse_action)]
    pub actions: Vec<RemoteAction>,

    /// Extra hint as TYPE:NAME:VALUE (int, double, boolean, byte, string)
    #[arg(long = "hint", value_parser = parse_hint)]
    pub hints: Vec<(String, HintValue)>,

    /// Stay running and print events until the notification closes
    #[arg(long)]
    pub wait: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Owner to query; defaults to this process
    #[arg(long, conflicts_with = "category")]
    pub owner: Option<String>,

    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UrgencyArg {
    Low,
    Normal,
    Critical,
}
impl From<UrgencyArg> for Urgency {
    fn from(value: UrgencyArg) -> Self {
        match value {
            UrgencyArg::Low => Self::Low,
            UrgencyArg::Normal => Self::Normal,
            UrgencyArg::Critical => Self::Critical,
        }
    }
}

pub fn parse_action(s: &str) -> Result<RemoteAction, NotifyError> {
    let (name, display) = s.split_once('=').unwrap_or((s, s));
    if name.is_empty() {
        return Err(notify_err!(
            NotifyErrorKind::InvalidAttribute,
            "action needs a name: {}",
            s
        ));
    }
    Ok(RemoteAction::new(name, display))
}

pub fn parse_hint(s: &str) -> Result<(String, HintValue), NotifyError> {
    let mut parts = s.splitn(3, ':');
    let (Some(kind), Some(name), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(notify_err!(
            NotifyErrorKind::InvalidAttribute,
            "expected TYPE:NAME:VALUE, got {}",
            s
        ));
    };
    if name.is_empty() {
        return Err(notify_err!(NotifyErrorKind::InvalidAttribute, "empty hint name"));
    }

    let invalid = |e: String| notify_err!(NotifyErrorKind::InvalidData, "hint {}: {}", name, e);
    let value = match kind {
        "int" => HintValue::Int(raw.parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?),
        "double" => HintValue::Double(raw.parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?),
        "byte" => HintValue::Byte(raw.parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?),
        "boolean" | "bool" => HintValue::Bool(raw.parse().map_err(|e: std::str::ParseBoolError| invalid(e.to_string()))?),
        "string" => HintValue::from(raw),
        other => return Err(invalid(format!("unknown type {other}"))),
    };
    Ok((name.to_owned(), value))
}
