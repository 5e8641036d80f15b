//! # ssh-relay
//!
//! Pooled SSH/local command execution for AI agent integration.
//!
//! This crate exposes a single capability, running a command on an optional
//! remote host with an environment overlay, backed by reusable transport
//! sessions. The work is in the session lifecycle: deciding when a cached
//! connection may be reused, probing liveness before reuse, reconnecting
//! with bounded retries, evicting idle sessions, and keeping per-host
//! environment state consistent across calls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ssh_relay::{
//!     ConnectSettings, Connector, ExecOptions, ExecutionEngine, HostConfig,
//!     PoolSettings, SessionPool,
//! };
//!
//! #[tokio::main]
//! async fn main() -> ssh_relay::Result<()> {
//!     ssh_relay::logging::try_init().ok();
//!
//!     let pool = SessionPool::new(PoolSettings::default());
//!     let connector = Connector::new(
//!         HostConfig::from_default_location(),
//!         ConnectSettings::default(),
//!     );
//!     let engine = ExecutionEngine::new(pool.clone(), connector);
//!
//!     // Remote: reuses the pooled connection on subsequent calls
//!     let out = engine
//!         .execute("uname -a", &ExecOptions::default().with_host("build-box"))
//!         .await?;
//!     println!("{}", out.stdout);
//!
//!     // Local: environment overlay accumulates across calls
//!     engine
//!         .execute("echo $GREETING", &ExecOptions::default().with_env("GREETING", "hi"))
//!         .await?;
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod session;
pub mod ssh;

// Re-export commonly used types
pub use config::{ConnectSettings, HostConfig, HostEntry, PoolSettings};
pub use error::{RelayError, Result};
pub use execution::{ExecOptions, ExecOutput, ExecutionEngine};
pub use session::{HandleState, SessionHandle, SessionKey, SessionPool};
pub use ssh::{Connector, RemoteSession};
