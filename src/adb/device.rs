//! Device directory and command channel.
//!
//! # Resolving "this device"
//!
//! ```text
//! resolve_current_device(server, identity)
//!   │
//!   ├─ identity.hardware_serial() = Some(s)
//!   │     └─ host:transport:s ; shell:echo <probe>  ── probe echoed? ──► done
//!   │
//!   ├─ emit "deviceKey=<hex>" to the local log
//!   │  host:devices ─► for each serial:
//!   │     logcat -t '<now-5s>' -s -e deviceKey= Butler ── contains key? ──► done
//!   │
//!   └─ ≤1 device attached ─► host:transport-any
//!      otherwise          ─► AmbiguousDevice
//! ```
//!
//! Every shell command opens its own socket and runs on its own thread;
//! the only way to cancel one is to close that socket.

use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};

use super::command::{parse_device_list, AdbCommand, DeviceEntry};
use super::connection::AdbConnection;
use crate::config::Config;
use crate::constants::{DEVICE_KEY_PREFIX, DISCOVERY_LOG_TAG, DISCOVERY_LOOKBACK};
use crate::error::{ButlerError, Result};
use crate::shell::SystemShell;

/// Text echoed back to confirm a serial-addressed device is reachable.
const REACHABILITY_PROBE: &str = "butler-probe";

/// Where the ADB server lives and, optionally, which device to address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// ADB server host.
    pub host: String,
    /// ADB server port.
    pub port: u16,
    /// Device serial; `None` addresses the only attached device.
    pub serial: Option<String>,
}

impl Endpoint {
    /// Endpoint for the server itself, with no device selected.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            serial: None,
        }
    }

    /// Server endpoint from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.adb_host.clone(), config.adb_port)
    }

    /// Same server, addressing `serial`.
    pub fn with_serial(&self, serial: Option<String>) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            serial,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.serial {
            Some(serial) => write!(f, "{}:{} [{serial}]", self.host, self.port),
            None => write!(f, "{}:{} [any]", self.host, self.port),
        }
    }
}

/// A device reachable through the ADB server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDevice {
    endpoint: Endpoint,
}

impl AdbDevice {
    /// Device at `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Resolved endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Device serial, if one was resolved.
    pub fn serial(&self) -> Option<&str> {
        self.endpoint.serial.as_deref()
    }

    /// Start `command args...` on the device without waiting for it.
    ///
    /// The socket is connected before this returns, so connection failures
    /// surface here; protocol failures surface from [`ShellTask::wait`].
    pub fn shell_command(&self, command: &str, args: &[&str]) -> Result<ShellTask> {
        let command = AdbCommand::shell(self.serial(), command, args);
        let mut connection = AdbConnection::connect(&self.endpoint.host, self.endpoint.port)?;
        let socket = connection.try_clone_socket()?;
        let description = command.to_string();

        let handle = thread::Builder::new()
            .name("adb-shell".to_owned())
            .spawn(move || {
                log::debug!("[adb] executing {command}");
                let result = command.execute(&mut connection);
                match &result {
                    Ok(output) => log::debug!("[adb] '{command}' returned {} bytes", output.len()),
                    Err(e) => log::warn!("[adb] '{command}' failed: {e}"),
                }
                result
            })?;

        Ok(ShellTask {
            description,
            socket,
            handle,
        })
    }

    /// Run `command args...` on the device and wait for its output.
    pub fn run_shell(&self, command: &str, args: &[&str]) -> Result<String> {
        self.shell_command(command, args)?.wait()
    }
}

impl SystemShell for AdbDevice {
    fn exec(&self, command: &str, args: &[&str]) -> Result<String> {
        self.run_shell(command, args)
    }
}

/// A shell command in flight on its own socket and thread.
#[derive(Debug)]
pub struct ShellTask {
    description: String,
    socket: TcpStream,
    handle: JoinHandle<Result<String>>,
}

impl ShellTask {
    /// Force the socket closed, ending the remote process's stream.
    pub fn close_socket(&self) {
        log::debug!("[adb] closing socket for {}", self.description);
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            log::debug!("[adb] socket shutdown for {}: {e}", self.description);
        }
    }

    /// Returns `true` once the remote side has closed the stream.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the command's stream closes and return its output.
    pub fn wait(self) -> Result<String> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_panic) => Err(ButlerError::protocol(format!(
                "shell worker for {} panicked",
                self.description
            ))),
        }
    }
}

/// List devices attached to the ADB server (`adb devices`).
pub fn list_devices(server: &Endpoint) -> Result<Vec<DeviceEntry>> {
    let mut connection = AdbConnection::connect(&server.host, server.port)?;
    let listing = AdbCommand::Devices.execute(&mut connection)?;
    Ok(parse_device_list(&listing))
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// What this host knows about itself for device discovery.
pub trait DeviceIdentity {
    /// Hardware serial, when the platform exposes it.
    fn hardware_serial(&self) -> Option<String>;

    /// Write `marker` to the log that `logcat` on this device reads.
    fn emit_marker(&self, marker: &str);
}

/// Identity backed by configuration and the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    serial: Option<String>,
}

impl LocalIdentity {
    /// Identity with an optional known serial.
    pub fn new(serial: Option<String>) -> Self {
        Self { serial }
    }

    /// Identity from `device_serial` in configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.device_serial.clone())
    }
}

impl DeviceIdentity for LocalIdentity {
    fn hardware_serial(&self) -> Option<String> {
        self.serial.clone()
    }

    fn emit_marker(&self, marker: &str) {
        log::info!(target: DISCOVERY_LOG_TAG, "{marker}");
    }
}

/// Find the device this code is running on.
///
/// # Errors
///
/// [`ButlerError::AmbiguousDevice`] when several devices are attached and
/// neither the serial nor the log marker identified one of them.
pub fn resolve_current_device(server: &Endpoint, identity: &dyn DeviceIdentity) -> Result<AdbDevice> {
    if let Some(serial) = identity.hardware_serial() {
        let candidate = AdbDevice::new(server.with_serial(Some(serial.clone())));
        match candidate.run_shell("echo", &[REACHABILITY_PROBE]) {
            Ok(output) if output.contains(REACHABILITY_PROBE) => {
                log::debug!("[adb] found current device with serial: {serial}");
                return Ok(candidate);
            }
            Ok(output) => log::warn!("[adb] serial {serial} probe returned {output:?}"),
            Err(e) => log::warn!("[adb] serial {serial} not reachable: {e}"),
        }
    }

    let devices = match list_devices(server) {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!(
                "[adb] could not list devices, assuming this is the only device attached: {e}"
            );
            return Ok(AdbDevice::new(server.with_serial(None)));
        }
    };

    if let Some(device) = find_by_log_marker(server, &devices, identity) {
        log::debug!("[adb] found current device with id: {}", device.endpoint());
        return Ok(device);
    }

    if devices.len() <= 1 {
        log::warn!(
            "[adb] could not find current device in 'adb devices', assuming it is the only device attached"
        );
        return Ok(AdbDevice::new(server.with_serial(None)));
    }

    Err(ButlerError::AmbiguousDevice { count: devices.len() })
}

fn find_by_log_marker(
    server: &Endpoint,
    devices: &[DeviceEntry],
    identity: &dyn DeviceIdentity,
) -> Option<AdbDevice> {
    let key = format!("{DEVICE_KEY_PREFIX}{:08x}", rand::random::<u32>());

    for entry in devices {
        let device = AdbDevice::new(server.with_serial(Some(entry.serial.clone())));
        let since = logcat_timestamp(chrono::Local::now());

        identity.emit_marker(&key);

        let output = device.run_shell(
            "logcat",
            &["-t", &since, "-s", "-e", DEVICE_KEY_PREFIX, DISCOVERY_LOG_TAG],
        );
        match output {
            Ok(log) if log.trim().contains(&key) => return Some(device),
            Ok(_) => {}
            Err(e) => log::warn!("[adb] logcat on {} failed: {e}", entry.serial),
        }
    }
    None
}

/// `logcat -t` timestamp a few seconds before `now`, so the scan has slack.
fn logcat_timestamp(now: chrono::DateTime<chrono::Local>) -> String {
    let lookback = chrono::Duration::seconds(DISCOVERY_LOOKBACK.as_secs() as i64);
    (now - lookback).format("%m-%d %H:%M:%S%.3f").to_string()
}
