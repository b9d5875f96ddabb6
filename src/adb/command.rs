//! ADB host commands and shell-line construction.

use std::borrow::Cow;
use std::io::{Read, Write};

use super::connection::AdbConnection;
use crate::error::Result;

/// A command understood by the ADB server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbCommand {
    /// `host:devices`, answered with one framed device listing.
    Devices,
    /// Select a device for the rest of the connection. `None` means
    /// "the only attached device".
    Transport(Option<String>),
    /// Select a device, then run a shell line and read until close.
    Shell {
        /// Device selection for this command.
        transport: Option<String>,
        /// Fully escaped command line.
        command_line: String,
    },
}

impl AdbCommand {
    /// Build a shell command, escaping `args` for the remote shell.
    pub fn shell<A: AsRef<str>>(serial: Option<&str>, command: &str, args: &[A]) -> Self {
        Self::Shell {
            transport: serial.map(str::to_owned),
            command_line: shell_command_line(command, args),
        }
    }

    /// The request string sent to the server.
    pub fn request(&self) -> String {
        match self {
            Self::Devices => "host:devices".to_string(),
            Self::Transport(serial) => transport_request(serial.as_deref()),
            Self::Shell { command_line, .. } => format!("shell:{command_line}"),
        }
    }

    /// Run the command on `connection` and return its textual result.
    ///
    /// Transport selection has no payload and returns an empty string.
    pub fn execute<S: Read + Write>(&self, connection: &mut AdbConnection<S>) -> Result<String> {
        match self {
            Self::Devices => {
                connection.send_command(&self.request())?;
                connection.read_message()
            }
            Self::Transport(_) => {
                connection.send_command(&self.request())?;
                Ok(String::new())
            }
            Self::Shell { transport, .. } => {
                connection.send_command(&transport_request(transport.as_deref()))?;
                connection.send_command(&self.request())?;
                connection.read_until_close()
            }
        }
    }
}

impl std::fmt::Display for AdbCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell { transport, .. } => {
                write!(f, "{};{}", transport_request(transport.as_deref()), self.request())
            }
            _ => f.write_str(&self.request()),
        }
    }
}

fn transport_request(serial: Option<&str>) -> String {
    match serial {
        Some(serial) => format!("host:transport:{serial}"),
        None => "host:transport-any".to_string(),
    }
}

/// Join a command and its arguments into one remote shell line.
///
/// Arguments made only of shell-safe characters pass through untouched;
/// everything else, including the empty string, is single-quoted.
pub fn shell_command_line<A: AsRef<str>>(command: &str, args: &[A]) -> String {
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        line.push_str(&escape_shell_arg(arg.as_ref()));
    }
    line
}

/// Quote one argument for a POSIX shell if it needs it.
///
/// A `'` inside the argument closes the quote, emits `"'"` and reopens it.
pub fn escape_shell_arg(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return Cow::Borrowed(arg);
    }
    Cow::Owned(format!("'{}'", arg.replace('\'', r#"'"'"'"#)))
}

/// Characters no POSIX shell treats specially.
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '%' | '+' | ',' | '-' | '.' | '/' | ':' | '=' | '@' | '_')
}

/// One row of the `host:devices` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Device serial as reported by the server.
    pub serial: String,
    /// Connection state (`device`, `offline`, `unauthorized`, ...).
    pub state: String,
}

/// Parse a `host:devices` listing (`serial\tstate` per line).
pub fn parse_device_list(listing: &str) -> Vec<DeviceEntry> {
    listing
        .trim()
        .lines()
        .filter_map(|line| {
            let (serial, state) = line.split_once('\t')?;
            Some(DeviceEntry {
                serial: serial.trim().to_string(),
                state: state.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::connection::tests::ScriptedStream;

    #[test]
    fn test_escape_space() {
        let cmd = AdbCommand::shell(None, "echo", &["a b"]);
        assert_eq!(cmd.request(), "shell:echo 'a b'");
    }

    #[test]
    fn test_escape_single_quote() {
        let cmd = AdbCommand::shell(None, "echo", &["a'b"]);
        assert_eq!(cmd.request(), r#"shell:echo 'a'"'"'b'"#);
    }

    #[test]
    fn test_metacharacters_are_quoted() {
        assert_eq!(escape_shell_arg("a;b"), "'a;b'");
        assert_eq!(escape_shell_arg("$HOME"), "'$HOME'");
        assert_eq!(escape_shell_arg("x>y"), "'x>y'");
        assert_eq!(escape_shell_arg("it's"), r#"'it'"'"'s'"#);
        assert_eq!(
            shell_command_line("echo", &["a'b", "ok"]),
            r#"echo 'a'"'"'b' ok"#
        );
    }

    #[test]
    fn test_plain_args_pass_through() {
        assert_eq!(
            shell_command_line("logcat", &["-t", "-s", "-e", "deviceKey=", "Butler"]),
            "logcat -t -s -e deviceKey= Butler"
        );
    }

    #[test]
    fn test_empty_arg_is_quoted() {
        assert_eq!(shell_command_line("settings", &["put", "secure", "k", ""]), "settings put secure k ''");
    }

    #[test]
    fn test_transport_requests() {
        assert_eq!(AdbCommand::Transport(None).request(), "host:transport-any");
        assert_eq!(
            AdbCommand::Transport(Some("emulator-5554".into())).request(),
            "host:transport:emulator-5554"
        );
    }

    #[test]
    fn test_display_shows_both_steps() {
        let cmd = AdbCommand::shell(Some("abc"), "id", &[] as &[&str]);
        assert_eq!(cmd.to_string(), "host:transport:abc;shell:id");
    }

    #[test]
    fn test_execute_shell_sends_transport_then_shell() {
        let stream = ScriptedStream::new(b"OKAYOKAYuid=2000(shell)\n");
        let mut conn = AdbConnection::new(stream);
        let out = AdbCommand::shell(Some("abc"), "id", &[] as &[&str])
            .execute(&mut conn)
            .unwrap();
        assert_eq!(out, "uid=2000(shell)\n");
        assert_eq!(conn.into_inner().output, b"0012host:transport:abc0008shell:id");
    }

    #[test]
    fn test_execute_devices_reads_one_message() {
        let listing = "emulator-5554\tdevice\n";
        let mut input = b"OKAY".to_vec();
        input.extend_from_slice(format!("{:04x}{listing}", listing.len()).as_bytes());
        let mut conn = AdbConnection::new(ScriptedStream::new(&input));
        assert_eq!(AdbCommand::Devices.execute(&mut conn).unwrap(), listing);
    }

    #[test]
    fn test_parse_device_list() {
        let devices = parse_device_list("emulator-5554\tdevice\nR58M\toffline\n\ngarbage\n");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert_eq!(devices[1].state, "offline");
        assert!(parse_device_list("").is_empty());
    }
}
