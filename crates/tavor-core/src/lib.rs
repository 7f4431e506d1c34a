//! # tavor-core
//!
//! Async client for the Tavor sandbox service.
//!
//! The service provisions isolated boxes on request. This crate creates and
//! tracks those boxes, runs shell commands inside them (polling or streaming
//! their output), exposes ports, and manages disk snapshots and domains.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      tavor-core                          │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │     Client      │────▶│  BoxHandle               │    │
//! │  │ - create_box()  │     │  - wait_until_ready()    │    │
//! │  │ - with_sandbox()│     │  - run()                 │    │
//! │  │ - domains       │     │  - snapshots, ports      │    │
//! │  └─────────────────┘     └──────────────────────────┘    │
//! │           │                    │              │          │
//! │           │              ┌─────▼─────┐  ┌─────▼──────┐   │
//! │           │              │  Poller   │  │  Executor  │   │
//! │           │              └─────┬─────┘  └──┬──────┬──┘   │
//! │           │                    │           │  ┌───▼───┐  │
//! │           ▼                    ▼           ▼  │  SSE  │  │
//! │  ┌─────────────────────────────────────────┐  └───┬───┘  │
//! │  │ HttpTransport (reqwest) ── classify() ──┼──────┘      │
//! │  └─────────────────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────┘
//!                           │ HTTPS /api/v2
//!                           ▼
//!                    sandbox service
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tavor_core::{BoxConfig, Client, ClientConfig, CommandOptions};
//!
//! # async fn example() -> tavor_core::Result<()> {
//! let client = Client::new(ClientConfig::builder().api_key("sk-...").build()?)?;
//!
//! let mut sandbox = client
//!     .create_box(BoxConfig::builder().cpu(2).mib_ram(2048).build()?)
//!     .await?;
//! sandbox.wait_until_ready().await?;
//!
//! // Polling: no callbacks
//! let result = sandbox.run("uname -a", CommandOptions::new()).await?;
//! println!("{}", result.stdout);
//!
//! // Streaming: lines arrive as the command prints them
//! sandbox
//!     .run(
//!         "for i in 1 2 3; do echo $i; sleep 1; done",
//!         CommandOptions::new().on_stdout(|line| println!("out: {line}")),
//!     )
//!     .await?;
//!
//! sandbox.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! Waiting operations accept a [`CancellationToken`] through
//! [`CommandOptions::cancel`] or [`WaitOptions::cancel`]. Firing it aborts the
//! in-flight request or sleep and returns [`Error::Cancelled`]. Work already
//! started on the service is not rolled back. Dropping the future has the
//! same effect.

mod client;
mod config;
mod domains;
mod error;
mod executor;
mod handle;
mod models;
mod poller;
mod sse;
mod transport;

pub use client::Client;
pub use config::{
    BoxConfig, BoxConfigBuilder, ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL,
    DEFAULT_BOX_READY_TIMEOUT, DEFAULT_COMMAND_TIMEOUT, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};
pub use domains::{
    CreateDomainRequest, Domain, DomainKind, DomainMeta, DomainResponse, DomainStatus,
    DomainsResponse, UpdateDomainRequest, UpdateField,
};
pub use error::{classify, classify_raw, Error, ErrorBody, ResourceKind, Result};
pub use executor::{CommandOptions, ExecMode, LineCallback};
pub use handle::BoxHandle;
pub use models::{
    BoxInfo, BoxStatus, Command, CommandResult, CommandStatus, ExposedPort, Snapshot,
    SnapshotStatus,
};
pub use poller::{cancellable, poll_until, Probe, WaitOptions};
pub use sse::{EndData, ErrorData, OutputData, SseDecoder, SseEvent, StartData, StatusData};

pub use tokio_util::sync::CancellationToken;
