//! Keeping the device awake and reachable for the length of a session.
//!
//! Three locks are taken together: wifi stays on while the screen is off,
//! the device stays awake while plugged in, and the keyguard is dismissed.
//! Acquisition is all-or-nothing; release is attempted for every held lock
//! and writes back the value each setting had before acquisition.

use std::sync::Arc;

use crate::error::Result;
use crate::shell::SystemShell;

const WIFI_SLEEP_POLICY: &str = "wifi_sleep_policy";
const STAY_ON_WHILE_PLUGGED_IN: &str = "stay_on_while_plugged_in";

/// A set of device locks held for a session.
pub trait DeviceLocks: Send {
    /// Take every lock, or none of them.
    fn acquire(&mut self) -> Result<()>;

    /// Drop every held lock. All are attempted; the first error is returned.
    fn release(&mut self) -> Result<()>;
}

/// One device lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLock {
    /// Wifi is never put to sleep.
    WifiKeepOn,
    /// The CPU and screen stay on.
    CpuWake,
    /// The keyguard is out of the way.
    KeyguardDismissed,
}

impl DeviceLock {
    /// Acquisition order.
    pub const ALL: [Self; 3] = [Self::WifiKeepOn, Self::CpuWake, Self::KeyguardDismissed];

    /// Take the lock. Returns the prior value of the global it overrides.
    fn acquire(self, shell: &dyn SystemShell) -> Result<Option<String>> {
        match self {
            Self::WifiKeepOn => {
                let prior = read_global(shell, WIFI_SLEEP_POLICY)?;
                shell.exec("settings", &["put", "global", WIFI_SLEEP_POLICY, "2"])?;
                Ok(prior)
            }
            Self::CpuWake => {
                let prior = read_global(shell, STAY_ON_WHILE_PLUGGED_IN)?;
                shell.exec("svc", &["power", "stayon", "true"])?;
                Ok(prior)
            }
            Self::KeyguardDismissed => {
                shell.exec("wm", &["dismiss-keyguard"])?;
                Ok(None)
            }
        }
    }

    fn release(self, shell: &dyn SystemShell, prior: Option<&str>) -> Result<()> {
        match (self, prior) {
            (Self::WifiKeepOn, Some(value)) => {
                shell.exec("settings", &["put", "global", WIFI_SLEEP_POLICY, value])?;
            }
            (Self::WifiKeepOn, None) => {
                shell.exec("settings", &["delete", "global", WIFI_SLEEP_POLICY])?;
            }
            (Self::CpuWake, Some(value)) => {
                shell.exec("settings", &["put", "global", STAY_ON_WHILE_PLUGGED_IN, value])?;
            }
            (Self::CpuWake, None) => {
                shell.exec("svc", &["power", "stayon", "false"])?;
            }
            // Nothing to re-arm: the keyguard comes back with the next screen-off.
            (Self::KeyguardDismissed, _) => {}
        }
        Ok(())
    }
}

/// `settings get global <key>`, with `null` meaning unset.
fn read_global(shell: &dyn SystemShell, key: &str) -> Result<Option<String>> {
    let value = shell.exec("settings", &["get", "global", key])?;
    let value = value.trim();
    Ok((!value.is_empty() && value != "null").then(|| value.to_string()))
}

/// A held lock and the value to put back on release.
type HeldLock = (DeviceLock, Option<String>);

/// [`DeviceLocks`] taken through platform tools.
pub struct ShellDeviceLocks {
    shell: Arc<dyn SystemShell>,
    held: Vec<HeldLock>,
}

impl std::fmt::Debug for ShellDeviceLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellDeviceLocks")
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl ShellDeviceLocks {
    /// Locks run through `shell`.
    pub fn new(shell: Arc<dyn SystemShell>) -> Self {
        Self {
            shell,
            held: Vec::new(),
        }
    }

    /// Locks currently held, in acquisition order.
    pub fn held(&self) -> Vec<DeviceLock> {
        self.held.iter().map(|(lock, _)| *lock).collect()
    }
}

fn release_all(shell: &dyn SystemShell, locks: &[HeldLock]) -> Result<()> {
    let mut first_error = None;
    for (lock, prior) in locks.iter().rev() {
        if let Err(e) = lock.release(shell, prior.as_deref()) {
            log::warn!("[locks] releasing {lock:?} failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

impl DeviceLocks for ShellDeviceLocks {
    fn acquire(&mut self) -> Result<()> {
        if !self.held.is_empty() {
            return Ok(());
        }
        let shell = self.shell.as_ref();
        let mut acquired = scopeguard::guard(Vec::new(), |partial: Vec<HeldLock>| {
            if !partial.is_empty() {
                log::warn!("[locks] rolling back {} lock(s)", partial.len());
                let _ = release_all(shell, &partial);
            }
        });
        for lock in DeviceLock::ALL {
            let prior = lock.acquire(shell)?;
            acquired.push((lock, prior));
        }
        self.held = scopeguard::ScopeGuard::into_inner(acquired);
        log::info!("[locks] acquired {:?}", self.held());
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let held = std::mem::take(&mut self.held);
        if held.is_empty() {
            return Ok(());
        }
        let result = release_all(self.shell.as_ref(), &held);
        log::info!("[locks] released {:?}", held.iter().map(|(lock, _)| lock).collect::<Vec<_>>());
        result
    }
}
