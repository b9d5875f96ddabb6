//! Butler - device-state bridge for Android instrumentation tests.
//!
//! Tests run with the instrumentation's own permissions, which are not
//! enough to flip wifi, grant runtime permissions or change secure
//! settings. Butler launches a peer process through `adb shell`, which runs
//! as the shell user, and routes those operations to it over a token-guarded
//! capability socket. Settings the peer touches are saved when the session
//! starts and restored when it ends.
//!
//! # Architecture
//!
//! ```text
//! test ──► Session ──► ButlerClient ─┬─► RemoteButler ──socket──► shell-service (LocalButler)
//!              │                      └─► LocalButler over adb shell (fallback)
//!              ├─► DeviceLocks
//!              └─► PrivilegedBootstrap ──adb shell──► launches shell-service
//! ```
//!
//! # Modules
//!
//! - [`adb`] - ADB host-protocol client and device resolution
//! - [`api`] - the operation surface, routing facade and remote stub
//! - [`bootstrap`] - launching the peer and receiving its handle
//! - [`butler`] - the setting changers
//! - [`guardian`] - session save/restore
//! - [`rpc`] - capability socket framing, server and announcements
//! - [`session`] - one test session end to end
//! - [`config`] - configuration loading/saving

pub mod adb;
pub mod api;
pub mod bootstrap;
pub mod butler;
pub mod guardian;
pub mod locks;
pub mod rpc;
pub mod session;
pub mod settings;
pub mod shell;
pub mod shell_service;

pub mod config;
pub mod constants;
pub mod env;
pub mod error;

// Re-export commonly used types
pub use adb::{AdbDevice, Endpoint};
pub use api::{ButlerApi, ButlerClient, LocationMode, Operation, PlatformVersion, Rotation};
pub use butler::LocalButler;
pub use config::Config;
pub use error::{ButlerError, Result};
pub use locks::DeviceLocks;
pub use session::{Session, SessionBuilder, TeardownReport};
