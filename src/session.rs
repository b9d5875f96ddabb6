//! One test session against one device.
//!
//! ```text
//! SessionBuilder::begin()
//!   privileged: resolve device ─► acquire locks ─► bootstrap peer ─► ButlerClient
//!               (peer saves settings itself; if it never announces, the
//!                local fallback saves them over adb instead)
//!   local:      acquire locks ─► LocalButler::on_create ─► ButlerClient
//!
//! Session::end()
//!   drop client ─► restore fallback settings ─► terminate peer ─► release locks (last)
//! ```

use std::sync::Arc;

use crate::adb::{resolve_current_device, AdbDevice, DeviceIdentity, Endpoint, LocalIdentity};
use crate::api::{ButlerApi, ButlerClient, PlatformVersion, RemoteButler};
use crate::bootstrap::PrivilegedBootstrap;
use crate::butler::accessibility::AccessibilityToggle;
use crate::butler::LocalButler;
use crate::config::Config;
use crate::error::Result;
use crate::guardian::{ManagedSetting, RestoreReport};
use crate::locks::{DeviceLocks, ShellDeviceLocks};
use crate::settings::{CommandSettings, SettingsAccessor};
use crate::shell::{CommandShell, SystemShell};

/// Configures and starts a [`Session`].
pub struct SessionBuilder {
    config: Config,
    identity: Option<Box<dyn DeviceIdentity>>,
    locks: Option<Box<dyn DeviceLocks>>,
    local: Option<Arc<LocalButler>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("local", &self.local.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Privileged-mode session with default identity and locks.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            identity: None,
            locks: None,
            local: None,
        }
    }

    /// Use `identity` for device resolution.
    pub fn identity(mut self, identity: impl DeviceIdentity + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    /// Use `locks` instead of the platform-tool locks.
    pub fn locks(mut self, locks: impl DeviceLocks + 'static) -> Self {
        self.locks = Some(Box::new(locks));
        self
    }

    /// Run in-process over `butler` instead of launching a peer.
    ///
    /// For callers that already hold the privileges, such as emulators.
    pub fn local(mut self, butler: LocalButler) -> Self {
        self.local = Some(Arc::new(butler));
        self
    }

    /// Start the session.
    ///
    /// # Errors
    ///
    /// Device resolution, lock acquisition or the peer launch failed. A peer
    /// that launches but never announces is not an error.
    pub fn begin(self) -> Result<Session> {
        match self.local.clone() {
            Some(butler) => self.begin_local(butler),
            None => self.begin_privileged(),
        }
    }

    fn begin_local(self, butler: Arc<LocalButler>) -> Result<Session> {
        let mut locks = self
            .locks
            .unwrap_or_else(|| Box::new(ShellDeviceLocks::new(Arc::new(CommandShell))));
        locks.acquire()?;
        butler.on_create();

        let client = ButlerClient::new(butler.platform(), Some(Box::new(Arc::clone(&butler))), None);
        log::info!("[session] started in local mode");
        Ok(Session {
            client,
            mode: Mode::Local { butler },
            locks,
        })
    }

    fn begin_privileged(self) -> Result<Session> {
        let config = self.config;
        let identity = self
            .identity
            .unwrap_or_else(|| Box::new(LocalIdentity::from_config(&config)));
        let device = resolve_current_device(&Endpoint::from_config(&config), identity.as_ref())?;
        log::info!("[session] target device {}", device.endpoint());

        let device_shell: Arc<dyn SystemShell> = Arc::new(device.clone());
        let platform = config.platform_for(device_shell.as_ref());
        log::info!("[session] platform level {}", platform.0);
        let locks = self
            .locks
            .unwrap_or_else(|| Box::new(ShellDeviceLocks::new(Arc::clone(&device_shell))));
        let mut locks = scopeguard::guard(locks, |mut locks| {
            if let Err(e) = locks.release() {
                log::warn!("[session] releasing locks after failed start: {e}");
            }
        });
        locks.acquire()?;

        let mut bootstrap = PrivilegedBootstrap::new(device.clone(), &config)?;
        let connection = bootstrap.bind(config.bind_timeout())?;

        let fallback = Arc::new(fallback_butler(&config, &device_shell, platform));
        let fallback_guarded = connection.is_none();
        if fallback_guarded {
            log::warn!("[session] privileged peer unavailable, saving settings from the client");
            fallback.on_create();
        }

        let privileged = connection.map(|c| Box::new(RemoteButler::new(c)) as Box<dyn ButlerApi>);
        let client = ButlerClient::new(
            platform,
            privileged,
            Some(Box::new(Arc::clone(&fallback))),
        );

        log::info!(
            "[session] started ({})",
            if client.is_privileged() { "privileged" } else { "degraded" }
        );
        Ok(Session {
            client,
            mode: Mode::Privileged {
                bootstrap,
                fallback,
                fallback_guarded,
                device,
            },
            locks: scopeguard::ScopeGuard::into_inner(locks),
        })
    }
}

/// The unprivileged butler the client keeps for fallback routes.
fn fallback_butler(config: &Config, device_shell: &Arc<dyn SystemShell>, platform: PlatformVersion) -> LocalButler {
    let settings: Arc<dyn SettingsAccessor> = Arc::new(CommandSettings::new(Arc::clone(device_shell)));
    let accessibility = AccessibilityToggle::new(config.accessibility_service.clone())
        .with_timeout(config.accessibility_timeout());
    LocalButler::new(settings, Arc::clone(device_shell), platform).with_accessibility(accessibility)
}

enum Mode {
    Privileged {
        bootstrap: PrivilegedBootstrap,
        fallback: Arc<LocalButler>,
        fallback_guarded: bool,
        device: AdbDevice,
    },
    Local {
        butler: Arc<LocalButler>,
    },
}

/// What went wrong while ending a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Settings restored in this process that failed.
    pub restore_failures: Vec<(ManagedSetting, String)>,
    /// Lock release error, if any.
    pub lock_error: Option<String>,
}

impl TeardownReport {
    /// Whether every teardown step succeeded.
    pub fn is_clean(&self) -> bool {
        self.restore_failures.is_empty() && self.lock_error.is_none()
    }

    fn absorb(&mut self, report: RestoreReport) {
        self.restore_failures.extend(report.failures);
    }
}

/// A running session. End it with [`Session::end`].
pub struct Session {
    client: ButlerClient,
    mode: Mode,
    locks: Box<dyn DeviceLocks>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("privileged", &matches!(self.mode, Mode::Privileged { .. }))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a privileged-mode session with defaults from `config`.
    pub fn begin(config: Config) -> Result<Self> {
        SessionBuilder::new(config).begin()
    }

    /// The facade to call operations on.
    pub fn client(&self) -> &ButlerClient {
        &self.client
    }

    /// Target device, in privileged mode.
    pub fn device(&self) -> Option<&AdbDevice> {
        match &self.mode {
            Mode::Privileged { device, .. } => Some(device),
            Mode::Local { .. } => None,
        }
    }

    /// Tear down: stop the peer or restore settings, then release locks.
    ///
    /// Every step runs regardless of earlier failures.
    pub fn end(self) -> TeardownReport {
        let Self {
            client,
            mode,
            mut locks,
        } = self;
        drop(client);

        let mut report = TeardownReport::default();
        match mode {
            Mode::Privileged {
                mut bootstrap,
                fallback,
                fallback_guarded,
                device: _,
            } => {
                // A peer that announced late restores its own snapshot when
                // its stream is cut, and that snapshot must land last.
                if fallback_guarded {
                    report.absorb(fallback.on_destroy());
                }
                bootstrap.unbind();
            }
            Mode::Local { butler } => report.absorb(butler.on_destroy()),
        }

        if let Err(e) = locks.release() {
            log::warn!("[session] releasing locks failed: {e}");
            report.lock_error = Some(e.to_string());
        }

        if report.is_clean() {
            log::info!("[session] ended");
        } else {
            log::warn!("[session] ended with problems: {report:?}");
        }
        report
    }
}
