//! ADB host-protocol client.
//!
//! - [`connection`] - length-prefixed framing and status handling
//! - [`command`] - host commands and shell-line escaping
//! - [`device`] - device resolution and per-command shell tasks

pub mod command;
pub mod connection;
pub mod device;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{AdbCommand, DeviceEntry};
pub use connection::AdbConnection;
pub use device::{
    list_devices, resolve_current_device, AdbDevice, DeviceIdentity, Endpoint, LocalIdentity,
    ShellTask,
};
