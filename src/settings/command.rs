//! Settings through the platform `settings` tool.

use std::sync::Arc;

use super::{Namespace, SettingsAccessor};
use crate::error::Result;
use crate::shell::SystemShell;

/// Runs `settings get|put <namespace> <key> [value]` through a shell.
pub struct CommandSettings {
    shell: Arc<dyn SystemShell>,
}

impl CommandSettings {
    /// Accessor that issues commands through `shell`.
    pub fn new(shell: Arc<dyn SystemShell>) -> Self {
        Self { shell }
    }
}

impl std::fmt::Debug for CommandSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSettings").finish_non_exhaustive()
    }
}

impl SettingsAccessor for CommandSettings {
    fn get_string(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let output = self.shell.exec("settings", &["get", namespace.as_str(), key])?;
        let value = output.trim_end_matches(['\r', '\n']);
        // The tool prints the literal `null` for keys that were never written.
        if value == "null" {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    fn put_string(&self, namespace: Namespace, key: &str, value: &str) -> Result<bool> {
        self.shell.exec("settings", &["put", namespace.as_str(), key, value])?;
        Ok(true)
    }
}
