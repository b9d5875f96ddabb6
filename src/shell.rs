//! Running platform tools.
//!
//! The privileged peer changes device state through the platform's own
//! command-line tools (`settings`, `svc`, `pm`, `dumpsys`, `wm`). The
//! [`SystemShell`] trait is the seam: the peer uses [`CommandShell`] to spawn
//! them directly, the client side runs them over ADB through
//! [`crate::adb::AdbDevice`], and tests substitute a recorder.

use std::process::Command;

use crate::adb::command::shell_command_line;
use crate::error::{ButlerError, Result};

/// Something that can run a platform command and return its output.
pub trait SystemShell: Send + Sync {
    /// Run `command` with `args` and return its standard output.
    ///
    /// # Errors
    ///
    /// Implementations that can observe exit status return
    /// [`ButlerError::CommandFailed`] on a non-zero exit.
    fn exec(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Spawns commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct CommandShell;

impl SystemShell for CommandShell {
    fn exec(&self, command: &str, args: &[&str]) -> Result<String> {
        log::debug!("[shell] {}", shell_command_line(command, args));
        let output = Command::new(command).args(args).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ButlerError::CommandFailed {
            command: shell_command_line(command, args),
            status: output.status.to_string(),
            output: format!("{}{}", stdout, stderr).trim().to_string(),
        })
    }
}
