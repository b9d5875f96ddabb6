// End-to-end tests: a fake ADB server runs shell lines on this host, so the
// privileged peer is the real `butler shell-service` binary.
// Run with: cargo test --test session_e2e_test

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use butler::{ButlerApi, Config, DeviceLocks, LocationMode, Rotation, SessionBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

const SERIAL: &str = "emulator-5554";

/// ADB server whose `shell:` service is `sh -c` on this host.
struct HostShellAdb {
    port: u16,
}

impl HostShellAdb {
    fn start(env: Vec<(String, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let env = Arc::new(env);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let env = Arc::clone(&env);
                thread::spawn(move || serve(stream, &env));
            }
        });
        Self { port }
    }
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).ok()?;
    let length = usize::from_str_radix(std::str::from_utf8(&header).ok()?, 16).ok()?;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).ok()?;
    String::from_utf8(body).ok()
}

fn serve(mut stream: TcpStream, env: &[(String, String)]) {
    loop {
        let Some(request) = read_request(&mut stream) else { return };
        if request == "host:devices" {
            let listing = format!("{SERIAL}\tdevice\n");
            let _ = write!(stream, "OKAY{:04x}{listing}", listing.len());
            return;
        } else if request.starts_with("host:transport") {
            let _ = stream.write_all(b"OKAY");
        } else if let Some(line) = request.strip_prefix("shell:") {
            let _ = stream.write_all(b"OKAY");
            let stdout = OwnedFd::from(stream.try_clone().unwrap());
            let status = Command::new("sh")
                .arg("-c")
                .arg(line)
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .status();
            if let Err(e) = status {
                eprintln!("fake adb: could not run {line:?}: {e}");
            }
            return;
        } else {
            let reason = format!("unknown request {request}");
            let _ = write!(stream, "FAIL{:04x}{reason}", reason.len());
            return;
        }
    }
}

/// Locks that only count calls: the host has no `svc`.
#[derive(Clone, Default)]
struct CountingLocks {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl DeviceLocks for CountingLocks {
    fn acquire(&mut self) -> butler::Result<()> {
        self.events.lock().unwrap().push("acquire");
        Ok(())
    }

    fn release(&mut self) -> butler::Result<()> {
        self.events.lock().unwrap().push("release");
        Ok(())
    }
}

struct Device {
    _dir: TempDir,
    settings: PathBuf,
    runtime: PathBuf,
    adb: HostShellAdb,
}

fn seeded_device() -> Device {
    let dir = TempDir::new().unwrap();
    let settings = dir.path().join("settings.json");
    let runtime = dir.path().join("run");
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&runtime).unwrap();
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        &settings,
        serde_json::to_string_pretty(&json!({
            "global": {
                "window_animation_scale": "1",
                "transition_animation_scale": "1",
                "animator_duration_scale": "1"
            },
            "system": { "accelerometer_rotation": "1", "user_rotation": "2" },
            "secure": { "location_mode": "1" }
        }))
        .unwrap(),
    )
    .unwrap();

    let env = vec![
        ("BUTLER_ENV".to_string(), "test".to_string()),
        ("BUTLER_CONFIG_DIR".to_string(), path_str(&config_dir)),
        ("BUTLER_SETTINGS_FILE".to_string(), path_str(&settings)),
        ("BUTLER_RUNTIME_DIR".to_string(), path_str(&runtime)),
        ("RUST_LOG".to_string(), "debug".to_string()),
    ];
    Device {
        adb: HostShellAdb::start(env),
        settings,
        runtime,
        _dir: dir,
    }
}

fn path_str(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn setting(path: &Path, namespace: &str, key: &str) -> Option<String> {
    let tables: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    tables[namespace][key].as_str().map(str::to_string)
}

fn client_config(device: &Device) -> Config {
    Config {
        adb_host: "127.0.0.1".into(),
        adb_port: device.adb.port,
        device_serial: Some(SERIAL.into()),
        bind_timeout_ms: 20_000,
        package_path: Some(PathBuf::from(env!("CARGO_BIN_EXE_butler"))),
        runtime_dir: device.runtime.clone(),
        platform_level: Some(30),
        ..Config::default()
    }
}

#[test]
fn test_session_routes_through_peer_and_restores_settings() {
    let device = seeded_device();
    let locks = CountingLocks::default();

    let session = SessionBuilder::new(client_config(&device))
        .locks(locks.clone())
        .begin()
        .expect("session should start");
    assert!(session.client().is_privileged(), "peer should have announced");

    // Baseline applied by the peer on start.
    assert_eq!(setting(&device.settings, "system", "user_rotation").as_deref(), Some("0"));
    assert_eq!(
        setting(&device.settings, "global", "window_animation_scale").as_deref(),
        Some("0")
    );

    assert!(session.client().set_location_mode(LocationMode::HighAccuracy).unwrap());
    assert!(session.client().set_rotation(Rotation::Rotation90).unwrap());
    assert_eq!(setting(&device.settings, "secure", "location_mode").as_deref(), Some("3"));
    assert_eq!(setting(&device.settings, "system", "user_rotation").as_deref(), Some("1"));

    let report = session.end();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(*locks.events.lock().unwrap(), vec!["acquire", "release"]);

    assert_eq!(setting(&device.settings, "secure", "location_mode").as_deref(), Some("1"));
    assert_eq!(setting(&device.settings, "system", "user_rotation").as_deref(), Some("2"));
    assert_eq!(
        setting(&device.settings, "system", "accelerometer_rotation").as_deref(),
        Some("1")
    );
    assert_eq!(
        setting(&device.settings, "global", "window_animation_scale").as_deref(),
        Some("1")
    );
}

#[test]
fn test_invalid_permission_is_rejected_without_touching_the_peer() {
    let device = seeded_device();
    let session = SessionBuilder::new(client_config(&device))
        .locks(CountingLocks::default())
        .begin()
        .unwrap();

    let err = session
        .client()
        .grant_permission("com.example", "")
        .unwrap_err();
    assert!(matches!(err, butler::ButlerError::Validation(_)), "{err:?}");

    assert!(session.end().is_clean());
}

#[test]
fn test_cli_config_reflects_environment() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_butler"))
        .arg("config")
        .env("BUTLER_ENV", "test")
        .env("BUTLER_CONFIG_DIR", dir.path())
        .env("BUTLER_ADB_PORT", "5999")
        .env("BUTLER_PLATFORM_LEVEL", "26")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let config: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["adb_port"], 5999);
    assert_eq!(config["platform_level"], 26);
}

#[test]
fn test_cli_devices_and_shell() {
    let device = seeded_device();
    let dir = TempDir::new().unwrap();
    let run = |args: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_butler"))
            .args(args)
            .env("BUTLER_ENV", "test")
            .env("BUTLER_CONFIG_DIR", dir.path())
            .env("BUTLER_ADB_HOST", "127.0.0.1")
            .env("BUTLER_ADB_PORT", device.adb.port.to_string())
            .env("ANDROID_SERIAL", SERIAL)
            .output()
            .unwrap()
    };

    let devices = run(&["devices"]);
    assert!(devices.status.success());
    assert_eq!(String::from_utf8_lossy(&devices.stdout), format!("{SERIAL}\tdevice\n"));

    let shell = run(&["shell", "echo", "hello world"]);
    assert!(shell.status.success(), "{}", String::from_utf8_lossy(&shell.stderr));
    assert_eq!(String::from_utf8_lossy(&shell.stdout), "hello world\n");
}

#[test]
fn test_shell_service_requires_announce_target() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_butler"))
        .arg("shell-service")
        .env("BUTLER_ENV", "test")
        .env("BUTLER_CONFIG_DIR", dir.path())
        .env_remove("BUTLER_ANNOUNCE")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("BUTLER_ANNOUNCE"));
}
