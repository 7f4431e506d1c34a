//! Subcommand handlers.
//!
//! Resources are printed to stdout as pretty JSON; logs go to stderr.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tavor_core::{
    BoxConfig, CancellationToken, Client, CommandOptions, CommandResult, CommandStatus, ExecMode,
};

use crate::cli::{BoxArgs, Commands, CreateArgs, PortArgs, RunArgs, SnapshotCommand, WaitArgs};

/// Execute one subcommand against the service.
pub async fn dispatch(
    client: &Client,
    command: Commands,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Create(args) => create(client, args, cancel).await,
        Commands::List => {
            let boxes = client.list_boxes().await?;
            print_json(&boxes)
        }
        Commands::Status(BoxArgs { box_id }) => {
            let handle = client.get_box(&box_id).await?;
            print_json(handle.info())
        }
        Commands::Wait(args) => wait(client, args, cancel).await,
        Commands::Run(args) => run(client, args, cancel).await,
        Commands::Stop(BoxArgs { box_id }) => {
            client.get_box(&box_id).await?.stop().await?;
            tracing::info!(box_id = %box_id, "Box stopped");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Pause(BoxArgs { box_id }) => {
            client.get_box(&box_id).await?.pause().await?;
            tracing::info!(box_id = %box_id, "Box paused");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resume(BoxArgs { box_id }) => {
            client.get_box(&box_id).await?.resume().await?;
            tracing::info!(box_id = %box_id, "Box resumed");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Expose(PortArgs { box_id, port }) => {
            let mapping = client.get_box(&box_id).await?.expose_port(port).await?;
            print_json(&mapping)
        }
        Commands::Url(PortArgs { box_id, port }) => {
            let url = client.get_box(&box_id).await?.public_url(port)?;
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Snapshot(command) => snapshot(client, command, cancel).await,
    }
}

async fn create(
    client: &Client,
    args: CreateArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let mut builder = BoxConfig::builder();
    if let Some(cpu) = args.cpu {
        builder = builder.cpu(cpu);
    }
    if let Some(mib) = args.mib_ram {
        builder = builder.mib_ram(mib);
    }
    if let Some(secs) = args.lifetime {
        builder = builder.timeout_secs(secs);
    }
    for (key, value) in args.metadata {
        builder = builder.metadata(key, value);
    }
    let config = builder.build().context("invalid box configuration")?;

    let mut handle = client.create_box(config).await?;
    if args.wait {
        let opts = handle.wait_options().cancel(cancel.clone());
        handle.wait_until_ready_with(opts).await?;
    }
    print_json(handle.info())
}

async fn wait(
    client: &Client,
    args: WaitArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let mut handle = client.get_box(&args.box_id).await?;
    let mut opts = handle.wait_options().cancel(cancel.clone());
    if let Some(secs) = args.timeout {
        opts = opts.timeout(Duration::from_secs(secs));
    }
    handle.wait_until_ready_with(opts).await?;
    print_json(handle.info())
}

async fn run(
    client: &Client,
    args: RunArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let handle = client.get_box(&args.box_id).await?;
    let command = args.command.join(" ");

    let mut opts = CommandOptions::new().cancel(cancel.clone());
    if let Some(ms) = args.timeout_ms {
        opts = opts.timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.remote_timeout_ms {
        opts = opts.remote_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.poll_interval_ms {
        opts = opts.poll_interval(Duration::from_millis(ms));
    }
    opts = if args.stream {
        opts.mode(ExecMode::Streaming)
            .on_stdout(|line| println!("{line}"))
            .on_stderr(|line| eprintln!("{line}"))
    } else {
        opts.mode(ExecMode::Polling)
    };

    let result = handle.run(&command, opts).await?;
    if !args.stream {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        std::io::stdout().flush()?;
    }
    tracing::info!(
        command_id = %result.id,
        status = %result.status,
        exit_code = ?result.exit_code,
        "Command finished"
    );
    Ok(exit_code_for(&result))
}

async fn snapshot(
    client: &Client,
    command: SnapshotCommand,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    match command {
        SnapshotCommand::List(BoxArgs { box_id }) => {
            let snapshots = client.get_box(&box_id).await?.list_snapshots().await?;
            print_json(&snapshots)
        }
        SnapshotCommand::Create {
            box_id,
            label,
            description,
            wait,
        } => {
            let handle = client.get_box(&box_id).await?;
            let mut snapshot = handle
                .create_snapshot(label.as_deref(), description.as_deref())
                .await?;
            if wait {
                let opts = handle.wait_options().cancel(cancel.clone());
                snapshot = handle.wait_snapshot_ready(&snapshot.id, opts).await?;
            }
            print_json(&snapshot)
        }
        SnapshotCommand::Restore {
            box_id,
            snapshot_id,
        } => {
            let handle = client.get_box(&box_id).await?;
            print_json(&handle.restore_snapshot(&snapshot_id).await?)
        }
        SnapshotCommand::Delete {
            box_id,
            snapshot_id,
        } => {
            let handle = client.get_box(&box_id).await?;
            print_json(&handle.delete_snapshot(&snapshot_id).await?)
        }
        SnapshotCommand::Wait {
            box_id,
            snapshot_id,
            timeout,
        } => {
            let handle = client.get_box(&box_id).await?;
            let mut opts = handle.wait_options().cancel(cancel.clone());
            if let Some(secs) = timeout {
                opts = opts.timeout(Duration::from_secs(secs));
            }
            print_json(&handle.wait_snapshot_ready(&snapshot_id, opts).await?)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

/// Map a command outcome onto the process exit status.
///
/// The remote exit code is passed through (truncated to 8 bits). Without one,
/// a completed command exits 0 and anything else exits 1.
fn exit_code_for(result: &CommandResult) -> ExitCode {
    match result.exit_code {
        Some(code) => ExitCode::from((code & 0xff) as u8),
        None if result.status == CommandStatus::Done => ExitCode::SUCCESS,
        None => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: CommandStatus, exit_code: Option<i32>) -> CommandResult {
        CommandResult {
            id: "cmd-1".into(),
            box_id: "box-1".into(),
            cmd: "true".into(),
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[test]
    fn test_exit_code_passthrough() {
        assert_eq!(
            exit_code_for(&result(CommandStatus::Done, Some(0))),
            ExitCode::SUCCESS
        );
        assert_eq!(
            exit_code_for(&result(CommandStatus::Failed, Some(42))),
            ExitCode::from(42)
        );
        assert_eq!(
            exit_code_for(&result(CommandStatus::Failed, Some(256 + 3))),
            ExitCode::from(3)
        );
    }

    #[test]
    fn test_exit_code_without_remote_code() {
        assert_eq!(
            exit_code_for(&result(CommandStatus::Done, None)),
            ExitCode::SUCCESS
        );
        assert_eq!(
            exit_code_for(&result(CommandStatus::Error, None)),
            ExitCode::FAILURE
        );
    }
}
