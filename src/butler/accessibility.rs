//! Enabling and disabling the butler accessibility service.
//!
//! The service list lives in `secure/enabled_accessibility_services`
//! (colon-separated component names). Writing it is not enough: the call
//! only returns once `dumpsys accessibility` shows the service bound (or
//! gone), and an enable that never binds is rolled back.

use std::thread;
use std::time::{Duration, Instant};

use crate::constants::{ACCESSIBILITY_POLL_INTERVAL, ACCESSIBILITY_TIMEOUT};
use crate::error::{ButlerError, Result};
use crate::settings::{keys, Namespace, SettingsAccessor};
use crate::shell::SystemShell;

const SEPARATOR: char = ':';

/// Switches one accessibility service on and off.
#[derive(Debug, Clone)]
pub struct AccessibilityToggle {
    service_id: String,
    timeout: Duration,
    poll: Duration,
}

impl AccessibilityToggle {
    /// Toggle for the component `service_id`.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            timeout: ACCESSIBILITY_TIMEOUT,
            poll: ACCESSIBILITY_POLL_INTERVAL,
        }
    }

    /// Override how long to wait for the service to come up or go down.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the polling interval.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Component name being toggled.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Whether a service is configured at all.
    pub fn is_configured(&self) -> bool {
        !self.service_id.is_empty()
    }

    /// Enable or disable the service.
    ///
    /// Returns `false` when the service is already in the requested state.
    pub fn set(&self, settings: &dyn SettingsAccessor, shell: &dyn SystemShell, enabled: bool) -> Result<bool> {
        if !self.is_configured() {
            return Ok(false);
        }
        let current = settings.get_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES)?;
        let listed = current
            .as_deref()
            .is_some_and(|services| services.split(SEPARATOR).any(|s| s == self.service_id));

        if enabled {
            if listed {
                return Ok(false);
            }
            self.enable(settings, shell, current.as_deref())?;
        } else {
            if !listed {
                return Ok(false);
            }
            self.disable(settings, shell, current.as_deref().unwrap_or_default())?;
        }
        Ok(true)
    }

    fn enable(&self, settings: &dyn SettingsAccessor, shell: &dyn SystemShell, current: Option<&str>) -> Result<()> {
        let updated = match current {
            Some(services) if !services.is_empty() => format!("{services}{SEPARATOR}{}", self.service_id),
            _ => self.service_id.clone(),
        };
        log::info!("[accessibility] enabling {}", self.service_id);
        settings.put_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES, &updated)?;
        settings.put_int(Namespace::Secure, keys::ACCESSIBILITY_ENABLED, 1)?;

        if let Err(e) = self.wait_for(shell, true) {
            let previous = current.unwrap_or_default();
            if let Err(rollback) =
                settings.put_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES, previous)
            {
                log::error!("[accessibility] rolling back service list failed: {rollback}");
            }
            return Err(e);
        }
        Ok(())
    }

    fn disable(&self, settings: &dyn SettingsAccessor, shell: &dyn SystemShell, current: &str) -> Result<()> {
        let remaining: Vec<&str> = current
            .split(SEPARATOR)
            .filter(|s| !s.is_empty() && *s != self.service_id)
            .collect();
        log::info!("[accessibility] disabling {}", self.service_id);
        settings.put_string(
            Namespace::Secure,
            keys::ENABLED_ACCESSIBILITY_SERVICES,
            &remaining.join(&SEPARATOR.to_string()),
        )?;
        self.wait_for(shell, false)
    }

    /// Poll `dumpsys accessibility` until the service is (or is no longer) bound.
    fn wait_for(&self, shell: &dyn SystemShell, bound: bool) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match shell.exec("dumpsys", &["accessibility"]) {
                Ok(dump) if dump.contains(&self.service_id) == bound => return Ok(()),
                Ok(_) => {}
                Err(e) => log::debug!("[accessibility] dumpsys failed: {e}"),
            }
            if Instant::now() >= deadline {
                let what = if bound { "launch" } else { "shut down" };
                return Err(ButlerError::Timeout {
                    what: format!("accessibility service {} to {what}", self.service_id),
                    waited: self.timeout,
                });
            }
            thread::sleep(self.poll);
        }
    }
}
