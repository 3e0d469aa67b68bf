//! geckoload CLI - Upload ARM and PPC binaries to BootMii over a USB Gecko.
//!
//! ## Features
//!
//! - Upload ARM (`-a`) or PPC (`-p`) binaries
//! - Serial (tty) and direct FTDI (libusb) backends
//! - Environment variable and config file support

use anyhow::Result;
use clap::{ArgGroup, Parser};
use console::style;
use env_logger::Env;
use geckoload::port::{DEFAULT_BAUD, DEFAULT_FTDI_PID, DEFAULT_FTDI_VID};
use geckoload::{
    Backend, BackendKind, Command, ConnectionOptions, DEVICE_ENV_VAR, PortConfig, resolve_device,
};
use log::debug;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Errors that carry their own exit status.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Invalid invocation or configuration value.
    #[error("{0}")]
    Usage(String),
}

/// geckoload - Upload ARM and PPC binaries to BootMii over a USB Gecko.
///
/// Environment variables:
///   USBGECKODEVICE      - Serial device of the USB Gecko (e.g. /dev/ttyUSB0)
///   GECKOLOAD_BACKEND   - Backend to use (serial, ftdi)
#[derive(Parser)]
#[command(name = "geckoload")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("upload").required(true).args(["arm", "ppc"])))]
#[command(after_help = "Examples:\n  geckoload -p ppcboot.elf\n  geckoload -a armboot.bin")]
struct Cli {
    /// Upload an ARM binary.
    #[arg(short = 'a', long, value_name = "FILE")]
    arm: Option<PathBuf>,

    /// Upload a PPC binary.
    #[arg(short = 'p', long, value_name = "FILE")]
    ppc: Option<PathBuf>,

    /// Serial device of the USB Gecko (must exist; defaults to USBGECKODEVICE).
    #[arg(short, long)]
    device: Option<String>,

    /// Backend used to reach the USB Gecko.
    #[arg(long, env = "GECKOLOAD_BACKEND", value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Baud rate for the serial backend.
    #[arg(long)]
    baud: Option<u32>,

    /// USB vendor ID for the FTDI backend (hex).
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product ID for the FTDI backend (hex).
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Do not wait for each chunk to reach the wire before sending the next.
    #[arg(long)]
    no_drain: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Selected command and file. Clap guarantees exactly one is present.
    fn upload_request(&self) -> Option<(Command, &Path)> {
        match (&self.arm, &self.ppc) {
            (Some(file), None) => Some((Command::UploadArm, file.as_path())),
            (None, Some(file)) => Some((Command::UploadPpc, file.as_path())),
            _ => None,
        }
    }
}

/// Resolved connection settings.
pub(crate) struct Settings {
    /// Backend and timeout.
    pub port: PortConfig,
    /// Transport tuning.
    pub options: ConnectionOptions,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    BackendKind::from_name(s).ok_or_else(|| format!("unknown backend '{s}' (expected serial or ftdi)"))
}

/// Parse a hexadecimal USB identifier (0x prefix optional).
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let s = s
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| format!("Invalid hex ID: {e}"))
}

/// Combine flags, environment and config files. Flags and environment win.
fn resolve_settings(cli: &Cli, config: &Config) -> Result<Settings> {
    let conn = &config.connection;

    let kind = match (cli.backend, conn.backend.as_deref()) {
        (Some(kind), _) => kind,
        (None, Some(name)) => BackendKind::from_name(name).ok_or_else(|| {
            CliError::Usage(format!(
                "unknown backend '{name}' in config (expected serial or ftdi)"
            ))
        })?,
        (None, None) => BackendKind::default(),
    };

    let backend = match kind {
        BackendKind::Serial => {
            // USBGECKODEVICE outranks the config file but not -d
            let explicit = match (cli.device.as_deref(), env::var_os(DEVICE_ENV_VAR)) {
                (Some(path), _) => Some(path),
                (None, Some(_)) => None,
                (None, None) => conn.device.as_deref(),
            };
            Backend::Serial {
                path: resolve_device(explicit)?,
                baud_rate: cli
                    .baud
                    .or(conn.baud)
                    .unwrap_or(DEFAULT_BAUD),
            }
        },
        BackendKind::Ftdi => Backend::Ftdi {
            vid: cli
                .vid
                .or(conn.vid)
                .unwrap_or(DEFAULT_FTDI_VID),
            pid: cli
                .pid
                .or(conn.pid)
                .unwrap_or(DEFAULT_FTDI_PID),
        },
    };

    let drain = !cli.no_drain && conn.drain_after_write.unwrap_or(true);

    Ok(Settings {
        port: PortConfig::new(backend),
        options: ConnectionOptions::default().with_drain_after_write(drain),
    })
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        None => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let Some((command, file)) = cli.upload_request() else {
        return Err(CliError::Usage("exactly one of -a or -p is required".to_string()).into());
    };

    let settings = resolve_settings(cli, &config)?;
    commands::upload::cmd_upload(cli, &settings, command, file)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);
    debug!(
        "geckoload v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if !cli.quiet {
        eprintln!(
            "{}\n",
            style(concat!("geckoload v", env!("CARGO_PKG_VERSION"))).bold()
        );
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}
