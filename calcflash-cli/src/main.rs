//! calcflash CLI - flash calculator firmware over a SAM-BA style boot monitor.
//!
//! ## Features
//!
//! - Flash a raw firmware image through an uploaded receiving program
//! - Inspect a firmware image before flashing
//! - Serial port discovery
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result, bail};
use calcflash::{
    ConsoleEvent, FirmwareImage, FlashWorker, LoaderProgram, NativePort, SerialConfig, Session,
    SessionConfig, Timeouts, protocol::xor_checksum, worker::DEFAULT_EVENT_CAPACITY,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod config;

use config::Config;

/// Baud rate used when neither the command line nor the config sets one.
const DEFAULT_BAUD: u32 = 115_200;

/// Exit code for a failed command.
const EXIT_FAILURE: u8 = 1;

/// Exit code after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// calcflash - flash calculator firmware through the SAM-BA boot monitor.
///
/// Environment variables:
///   CALCFLASH_PORT   - Default serial port
///   CALCFLASH_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "calcflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "CALCFLASH_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "CALCFLASH_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a firmware image.
    Flash(FlashArgs),

    /// Show information about a firmware image.
    Info {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments of the `flash` command.
#[derive(clap::Args)]
struct FlashArgs {
    /// Path to the firmware image.
    firmware: PathBuf,

    /// Receiving program binary uploaded before the firmware.
    #[arg(long, value_name = "PATH")]
    loader: Option<PathBuf>,

    /// Address the receiving program runs at (hex).
    #[arg(long, value_name = "HEX", value_parser = parse_hex_u32)]
    load_address: Option<u32>,

    /// Print raw bytes of unexpected answers.
    #[arg(long)]
    debug: bool,

    /// Do not draw a progress bar.
    #[arg(long)]
    no_progress: bool,
}

/// A session error already shown to the user through console events.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Reported(calcflash::Error);

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

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

    debug!(
        "calcflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        debug!("Ctrl-C handler not installed: {e}");
    }
    calcflash::set_interrupt_checker(|| INTERRUPTED.load(Ordering::SeqCst));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let lib_error = e
                .downcast_ref::<Reported>()
                .map(|r| &r.0)
                .or_else(|| e.downcast_ref::<calcflash::Error>());
            if e.downcast_ref::<Reported>().is_none() {
                eprintln!("{} {e:#}", style("Error:").red().bold());
            }
            ExitCode::from(exit_code(lib_error))
        },
    }
}

/// Map a library error to the process exit code.
fn exit_code(err: Option<&calcflash::Error>) -> u8 {
    match err {
        Some(calcflash::Error::Cancelled) => EXIT_INTERRUPTED,
        _ => EXIT_FAILURE,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash(args) => cmd_flash(cli, &config, args),
        Commands::Info { firmware, json } => cmd_info(firmware, *json),
        Commands::ListPorts { json } => {
            cmd_list_ports(*json);
            Ok(())
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Resolve the serial port: flag or env, then config, then auto-detection.
fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = cli.port.as_ref().or(config.connection.serial.as_ref()) {
        return Ok(port.clone());
    }
    let detected =
        calcflash::auto_detect_port().context("No serial port given and none detected")?;
    Ok(detected.name)
}

/// Build the session configuration from flags and config file.
fn session_config(config: &Config, args: &FlashArgs) -> Result<SessionConfig> {
    let Some(loader_path) = args.loader.as_ref().or(config.flash.loader.as_ref()) else {
        bail!(
            "No transfer program given; pass --loader or set flash.loader in {}",
            config::LOCAL_CONFIG
        );
    };

    let mut loader = LoaderProgram::from_file(loader_path)
        .with_context(|| format!("Failed to load transfer program {}", loader_path.display()))?;
    if let Some(address) = args.load_address.or(config.flash.load_address) {
        loader = loader.at(address);
    }

    let mut timeouts = Timeouts::default();
    if let Some(ms) = config.flash.response_timeout_ms {
        timeouts.response = Duration::from_millis(ms);
    }

    Ok(SessionConfig::new(&args.firmware, loader)
        .with_debug(args.debug || config.flash.debug)
        .with_timeouts(timeouts))
}

/// Flash command implementation.
fn cmd_flash(cli: &Cli, config: &Config, args: &FlashArgs) -> Result<()> {
    let image = FirmwareImage::from_file(&args.firmware)
        .with_context(|| format!("Failed to load firmware {}", args.firmware.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} {} ({} bytes)",
            style("Firmware").cyan(),
            args.firmware.display(),
            image.len()
        );
    }

    let session_config = session_config(config, args)?;
    let port_name = resolve_port(cli, config)?;
    let baud = cli.baud.or(config.connection.baud).unwrap_or(DEFAULT_BAUD);
    if !cli.quiet {
        eprintln!("{} {port_name} @ {baud}", style("Port").cyan());
    }

    let port = NativePort::new(SerialConfig::new(port_name, baud));
    let worker = FlashWorker::spawn(Session::new(port, session_config), DEFAULT_EVENT_CAPACITY)?;

    let show_progress = !cli.quiet && !args.no_progress && use_fancy_output();
    let mut pb = ProgressBar::hidden();

    for event in worker.events() {
        match event {
            ConsoleEvent::Message(text) => {
                if !cli.quiet {
                    pb.suspend(|| eprintln!("{} {text}", style("•").green()));
                }
            },
            ConsoleEvent::Error(text) => {
                pb.suspend(|| eprintln!("{} {text}", style("Error:").red().bold()));
            },
            ConsoleEvent::PrepareProgress { total_kilobytes } => {
                if show_progress {
                    pb = ProgressBar::new(total_kilobytes as u64);
                    pb.set_style(
                        ProgressStyle::with_template(concat!(
                            "{spinner:.green} [{elapsed_precise}] ",
                            "[{bar:40.cyan/blue}] {pos}/{len} KiB",
                        ))?
                        .progress_chars("#>-"),
                    );
                    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                }
            },
            ConsoleEvent::Progress { kilobytes } => pb.set_position(kilobytes as u64),
        }
    }

    match worker.join() {
        Ok(()) => {
            pb.finish_and_clear();
            if !cli.quiet {
                eprintln!("\n{} Flashing complete", style("Done").green().bold());
            }
            Ok(())
        },
        Err(e) => {
            pb.abandon();
            Err(Reported(e).into())
        },
    }
}

/// Info command implementation.
fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    let checksum = xor_checksum(image.data());

    if json {
        let info = serde_json::json!({
            "path": firmware.display().to_string(),
            "size": image.len(),
            "kilobytes": image.total_kilobytes(),
            "chunks": image.chunk_count(),
            "last_chunk": image.chunks().last().map_or(0, <[u8]>::len),
            "xor": format!("0x{checksum:02X}"),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    eprintln!("{}", style("Firmware image").bold().underlined());
    eprintln!("  Path:       {}", firmware.display());
    eprintln!("  Size:       {} bytes ({} KiB)", image.len(), image.total_kilobytes());
    eprintln!("  Chunks:     {}", image.chunk_count());
    eprintln!("  XOR:        0x{checksum:02X}");
    Ok(())
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) {
    let detected = calcflash::detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "device": p.device.name(),
                    "known": p.device.is_known(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "product": p.product,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for line in calcflash::format_port_list(&detected) {
        eprintln!("  {} {line}", style("•").green());
    }
    if let Some(port) = calcflash::device::select_port(&detected) {
        eprintln!(
            "\n{} Would use {}",
            style("→").green().bold(),
            style(&port.name).cyan().bold()
        );
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
