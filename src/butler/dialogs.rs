//! Suppression of crash and ANR dialogs for the session.

use crate::error::Result;
use crate::settings::{keys, Namespace, SettingsAccessor};

/// Installed suppressor, remembering what it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSuppressor {
    previous: Option<String>,
}

impl DialogSuppressor {
    /// Hide error dialogs, remembering the previous flag.
    pub fn install(settings: &dyn SettingsAccessor) -> Result<Self> {
        let previous = settings.get_string(Namespace::Global, keys::HIDE_ERROR_DIALOGS)?;
        settings.put_int(Namespace::Global, keys::HIDE_ERROR_DIALOGS, 1)?;
        log::debug!("[dialogs] error dialogs suppressed (was {previous:?})");
        Ok(Self { previous })
    }

    /// Put the previous flag back (`0` if there was none).
    pub fn uninstall(self, settings: &dyn SettingsAccessor) -> Result<()> {
        let value = self.previous.as_deref().unwrap_or("0");
        settings.put_string(Namespace::Global, keys::HIDE_ERROR_DIALOGS, value)?;
        log::debug!("[dialogs] error dialogs restored to {value}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;

    #[test]
    fn test_install_and_uninstall() {
        let store = SettingsStore::in_memory();
        let suppressor = DialogSuppressor::install(&store).unwrap();
        assert_eq!(store.get_int(Namespace::Global, keys::HIDE_ERROR_DIALOGS).unwrap(), 1);
        suppressor.uninstall(&store).unwrap();
        assert_eq!(store.get_int(Namespace::Global, keys::HIDE_ERROR_DIALOGS).unwrap(), 0);
    }
}
