//! Command-line definition for `tavor`.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tavor", author, version, about = "Manage Tavor sandboxes")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug logging for the client library
    #[arg(long, global = true)]
    pub debug: bool,

    /// Service root, overriding TAVOR_BASE_URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new box
    Create(CreateArgs),

    /// List boxes
    #[command(visible_alias = "ls")]
    List,

    /// Show the current state of a box
    Status(BoxArgs),

    /// Wait until a box is running
    Wait(WaitArgs),

    /// Run a shell command in a box
    Run(RunArgs),

    /// Stop a box
    Stop(BoxArgs),

    /// Suspend a running box
    Pause(BoxArgs),

    /// Resume a paused box
    Resume(BoxArgs),

    /// Expose a port inside the box on the proxy
    Expose(PortArgs),

    /// Print the public URL of a port
    Url(PortArgs),

    /// Manage disk snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Args, Debug)]
pub struct BoxArgs {
    /// Box identifier
    pub box_id: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// CPU cores
    #[arg(long)]
    pub cpu: Option<u32>,

    /// RAM in MiB
    #[arg(long)]
    pub mib_ram: Option<u32>,

    /// Box lifetime in seconds
    #[arg(long, value_name = "SECS")]
    pub lifetime: Option<u64>,

    /// Metadata entry, may be repeated
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,

    /// Wait for the box to be running before returning
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Box identifier
    pub box_id: String,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Box identifier
    pub box_id: String,

    /// Stream output line by line instead of printing it at the end
    #[arg(long)]
    pub stream: bool,

    /// Client-side deadline in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Server-side execution limit in milliseconds
    #[arg(long, value_name = "MS")]
    pub remote_timeout_ms: Option<u64>,

    /// Poll cadence in milliseconds (ignored with --stream)
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Command to run; joined with spaces
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PortArgs {
    /// Box identifier
    pub box_id: String,

    /// Port inside the box
    pub port: u16,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// List snapshots of a box
    List(BoxArgs),

    /// Snapshot a box's disk
    Create {
        box_id: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Wait until the snapshot is ready
        #[arg(long)]
        wait: bool,
    },

    /// Restore a box from a snapshot
    Restore { box_id: String, snapshot_id: String },

    /// Delete a snapshot
    Delete { box_id: String, snapshot_id: String },

    /// Wait until a snapshot is ready
    Wait {
        box_id: String,
        snapshot_id: String,
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

/// Parse `KEY=VALUE`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}
