//! Wire and domain types for boxes, commands, snapshots and port mappings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxStatus {
    /// Accepted but not yet scheduled.
    Queued,
    /// VM is booting.
    Starting,
    /// Ready for commands.
    Running,
    /// Suspended; returns to `running` on resume.
    Paused,
    /// Shutting down.
    Stopping,
    /// Shut down cleanly.
    Stopped,
    /// Could not start.
    Failed,
    /// Killed by the service.
    Terminated,
    /// Status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl BoxStatus {
    /// Whether the box can never become ready from this status.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::Terminated)
    }
}

impl fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Running,
    Done,
    Failed,
    Error,
    #[serde(other)]
    Unknown,
}

impl CommandStatus {
    /// `done`, `failed` and `error` all end the wait.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Error)
    }

    /// Parse a status string as sent in stream events.
    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Creating,
    Ready,
    Restoring,
    Deleted,
    Error,
    #[serde(other)]
    Unknown,
}

impl SnapshotStatus {
    /// Whether the snapshot can never become ready from this status.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Deleted)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Restoring => "restoring",
            Self::Deleted => "deleted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// State of a box as last fetched from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: String,
    pub status: BoxStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Present once the box reaches a network-capable state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Diagnostic text attached by the service, mostly on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BoxInfo {
    /// A freshly submitted box, before its first refresh.
    pub(crate) fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: BoxStatus::Queued,
            metadata: HashMap::new(),
            hostname: None,
            details: None,
            started_at: None,
            terminated_at: None,
            created_at: None,
        }
    }
}

/// Full state of a command as reported by the service.
///
/// `stdout` and `stderr` are accumulated totals; successive fetches only
/// ever append to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(default)]
    pub box_id: String,
    #[serde(default)]
    pub cmd: String,
    pub status: CommandStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Present only once the command is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Final outcome of running a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: String,
    pub box_id: String,
    pub cmd: String,
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the service never reported an exit code.
    pub exit_code: Option<i32>,
}

impl CommandResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl From<Command> for CommandResult {
    fn from(cmd: Command) -> Self {
        Self {
            id: cmd.id,
            box_id: cmd.box_id,
            cmd: cmd.cmd,
            status: cmd.status,
            stdout: cmd.stdout,
            stderr: cmd.stderr,
            exit_code: cmd.exit_code,
        }
    }
}

/// Point-in-time capture of a box's disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub box_id: String,
    #[serde(default)]
    pub snapshot_type: String,
    pub status: SnapshotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_id: Option<String>,
}

/// A temporary external-to-internal port mapping.
///
/// Mappings cannot be renewed; exposing the port again creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposedPort {
    /// Port assigned by the service on the proxy.
    pub proxy_port: u16,
    /// Port inside the box.
    pub target_port: u16,
    pub expires_at: DateTime<Utc>,
}

// Request/response envelopes

/// Generic `{"data": ...}` envelope used by most endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateBoxRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mib_ram: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueueCommandRequest<'a> {
    pub command: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExposePortRequest {
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSnapshotRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RestoreSnapshotRequest<'a> {
    pub snapshot_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_box_status_unknown_value() {
        let info: BoxInfo = serde_json::from_value(json!({
            "id": "b1",
            "status": "hibernating"
        }))
        .unwrap();
        assert_eq!(info.status, BoxStatus::Unknown);
        assert!(info.hostname.is_none());
        assert!(info.metadata.is_empty());
    }

    #[test]
    fn test_command_status_terminal() {
        assert!(CommandStatus::Done.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Error.is_terminal());
        assert!(!CommandStatus::Queued.is_terminal());
        assert!(!CommandStatus::Running.is_terminal());
        assert_eq!(CommandStatus::parse("done"), CommandStatus::Done);
        assert_eq!(CommandStatus::parse("weird"), CommandStatus::Unknown);
    }

    #[test]
    fn test_command_result_keeps_missing_exit_code() {
        let cmd: Command = serde_json::from_value(json!({
            "id": "c1",
            "box_id": "b1",
            "cmd": "true",
            "status": "error",
            "stdout": "partial"
        }))
        .unwrap();
        let result = CommandResult::from(cmd);
        assert_eq!(result.exit_code, None);
        assert!(!result.success());
    }

    #[test]
    fn test_queue_request_omits_defaults() {
        let req = QueueCommandRequest {
            command: "ls",
            stream: false,
            timeout_ms: None,
        };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"command": "ls"}));

        let req = QueueCommandRequest {
            command: "ls",
            stream: true,
            timeout_ms: Some(1000),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"command": "ls", "stream": true, "timeout_ms": 1000})
        );
    }

    #[test]
    fn test_snapshot_request_omits_empty() {
        let req = CreateSnapshotRequest {
            label: Some("backup"),
            description: None,
        };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"label": "backup"}));
    }
}
