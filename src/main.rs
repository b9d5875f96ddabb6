//! Butler CLI - privileged peer entry point and device helpers.
//!
//! This is the main binary entry point. See the `butler` library for the
//! core functionality.

use anyhow::{Context, Result};
use butler::adb::{list_devices, resolve_current_device, LocalIdentity};
use butler::env::Environment;
use butler::{shell_service, Config, Endpoint};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "butler")]
#[command(version, about = "Device-state bridge for Android instrumentation tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the privileged peer (launched over adb shell by a client)
    ShellService,
    /// List devices known to the ADB server
    Devices,
    /// Resolve the device this process is running on
    CurrentDevice,
    /// Run a command on the resolved device and print its output
    Shell {
        /// Command to run
        command: String,
        /// Arguments, each escaped for the device shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    // Logs go to stderr: for the peer that is the adb shell stream the client
    // drains, stdout is left for command output.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(Environment::current().default_log_filter()),
    )
    .target(env_logger::Target::Stderr)
    .format_timestamp_secs()
    .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::ShellService => shell_service::run(&config)?,
        Commands::Devices => {
            let devices = list_devices(&Endpoint::from_config(&config))
                .context("list devices")?;
            for device in devices {
                println!("{}\t{}", device.serial, device.state);
            }
        }
        Commands::CurrentDevice => {
            let device = resolve_current_device(
                &Endpoint::from_config(&config),
                &LocalIdentity::from_config(&config),
            )
            .context("resolve current device")?;
            println!("{}", device.serial().unwrap_or("(any)"));
        }
        Commands::Shell { command, args } => {
            let device = resolve_current_device(
                &Endpoint::from_config(&config),
                &LocalIdentity::from_config(&config),
            )
            .context("resolve current device")?;
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let output = device
                .run_shell(&command, &args)
                .with_context(|| format!("run {command} on {}", device.endpoint()))?;
            print!("{output}");
        }
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}
