//! Test doubles for the capability interface.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ButlerApi, LocationMode, Operation, Rotation};
use crate::error::{ButlerError, Result};
use crate::rpc::{Call, Reply, Transact};

/// Records every call and answers from a script.
#[derive(Debug, Default)]
pub(crate) struct ScriptedButler {
    calls: Mutex<Vec<Call>>,
    failures: HashMap<Operation, String>,
    unsupported: HashSet<Operation>,
}

impl ScriptedButler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with `message`.
    pub(crate) fn failing(mut self, op: Operation, message: &str) -> Self {
        self.failures.insert(op, message.to_string());
        self
    }

    /// Report `op` as unsupported.
    pub(crate) fn without(mut self, op: Operation) -> Self {
        self.unsupported.insert(op);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<bool> {
        let op = call.operation();
        self.calls.lock().unwrap().push(call);
        match self.failures.get(&op) {
            Some(message) => Err(ButlerError::CommandFailed {
                command: op.name().to_string(),
                status: "exit status: 1".to_string(),
                output: message.clone(),
            }),
            None => Ok(true),
        }
    }
}

impl ButlerApi for ScriptedButler {
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetWifiEnabled { enabled })
    }

    fn set_location_mode(&self, mode: LocationMode) -> Result<bool> {
        self.record(Call::SetLocationMode { mode })
    }

    fn set_rotation(&self, rotation: Rotation) -> Result<bool> {
        self.record(Call::SetRotation { rotation })
    }

    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetGsmDataEnabled { enabled })
    }

    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool> {
        self.record(Call::GrantPermission {
            package: package.into(),
            permission: permission.into(),
        })
    }

    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool> {
        self.record(Call::RevokePermission {
            package: package.into(),
            permission: permission.into(),
        })
    }

    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetSpellCheckerEnabled { enabled })
    }

    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetShowImeWithHardKeyboard { enabled })
    }

    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetImmersiveModeConfirmation { enabled })
    }

    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetAlwaysFinishActivities { enabled })
    }

    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool> {
        self.record(Call::SetAccessibilityServiceEnabled { enabled })
    }

    fn supports(&self, op: Operation) -> bool {
        !self.unsupported.contains(&op)
    }
}

/// Counts transactions and answers each with the same reply.
#[derive(Debug)]
pub(crate) struct CountingTransact {
    count: AtomicUsize,
    reply: Reply,
    last: Mutex<Option<(u32, Option<Call>)>>,
}

impl CountingTransact {
    pub(crate) fn replying(reply: Reply) -> Self {
        Self {
            count: AtomicUsize::new(0),
            reply,
            last: Mutex::new(None),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn last(&self) -> Option<(u32, Option<Call>)> {
        self.last.lock().unwrap().clone()
    }
}

impl Transact for CountingTransact {
    fn transact(&self, code: u32, call: Option<Call>) -> Result<Reply> {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((code, call));
        Ok(self.reply.clone())
    }
}
