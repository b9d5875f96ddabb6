//! Application-wide constants for butler.
//!
//! This module centralizes magic numbers and well-known names so they are
//! discoverable in one place. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **ADB**: host/port defaults and device discovery
//! - **Timeouts**: bootstrap and accessibility waits
//! - **Handoff**: environment variables and names used by the privileged peer

use std::time::Duration;

// ============================================================================
// ADB
// ============================================================================

/// Host the ADB server is reached on.
///
/// On a device this is the loopback side of `adb reverse tcp:5038 tcp:5037`.
pub const DEFAULT_ADB_HOST: &str = "localhost";

/// Port the ADB server is reached on (the reversed port, not 5037).
pub const DEFAULT_ADB_PORT: u16 = 5038;

/// Log tag that device-discovery markers are written under and that
/// `logcat` filters on.
pub const DISCOVERY_LOG_TAG: &str = "Butler";

/// Prefix of the random marker written during device discovery.
pub const DEVICE_KEY_PREFIX: &str = "deviceKey=";

/// How far back `logcat -t` looks when searching for the discovery marker.
pub const DISCOVERY_LOOKBACK: Duration = Duration::from_secs(5);

/// Largest payload the ADB host protocol can frame (4 hex digits).
pub const MAX_ADB_MESSAGE: usize = 0xffff;

// ============================================================================
// Timeouts
// ============================================================================

/// Default time to wait for the privileged peer to announce its handle.
pub const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum time to wait for the accessibility service to come up or go down.
pub const ACCESSIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting on accessibility state.
pub const ACCESSIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read timeout on the capability socket for a single call.
///
/// Enabling the accessibility service can block a call for the full
/// [`ACCESSIBILITY_TIMEOUT`], so this leaves headroom above it.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(45);

// ============================================================================
// Handoff
// ============================================================================

/// Environment variable carrying the announcement socket path to the
/// privileged peer.
pub const ANNOUNCE_ENV: &str = "BUTLER_ANNOUNCE";

/// Subcommand the privileged peer is launched with.
pub const SHELL_SERVICE_COMMAND: &str = "shell-service";

/// Action string carried by the handle announcement.
pub const BROADCAST_BUTLER_API_ACTION: &str = "butler.intent.action.BROADCAST_BUTLER_API";

/// Extras key the capability handle is stored under in the announcement.
pub const BUTLER_API_BUNDLE_KEY: &str = "ButlerApi";

/// Maximum path length for a Unix domain socket (macOS kernel limit).
pub const MAX_SOCK_PATH: usize = 104;

// ============================================================================
// Platform levels
// ============================================================================

/// First platform level where toggling wifi requires the privileged peer.
pub const WIFI_PRIVILEGED_MIN_LEVEL: u32 = 27;

/// First platform level with `location_mode` (KitKat).
pub const LOCATION_MODE_MIN_LEVEL: u32 = 19;

/// First platform level with `svc data` for mobile data (Lollipop).
pub const SVC_DATA_MIN_LEVEL: u32 = 21;

/// Platform level assumed when none is configured and the device cannot say.
pub const DEFAULT_PLATFORM_LEVEL: u32 = 30;

/// Accessibility service component enabled by default.
pub const DEFAULT_ACCESSIBILITY_SERVICE: &str =
    "com.butler.app/com.butler.app.ButlerAccessibilityService";
