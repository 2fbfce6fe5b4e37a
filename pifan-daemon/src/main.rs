//! Pifan Daemon (pifand)
//!
//! Fan control service for a Raspberry Pi class single-board computer.
//! Samples host metrics (CPU load, SoC temperature, memory, disk) on a
//! fixed cadence, arbitrates the fan between the thermal safety override
//! and the user's manual preference, and serves status/control requests
//! to local clients over a Unix domain socket.
//!
//! The (unprivileged) web frontend renders the same state by talking to
//! this socket; the daemon itself owns the GPIO pin and is the only
//! writer of the actuator.

mod monitor;
mod server;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use pifan_core::constants::fan::DEFAULT_FAN_PIN;
use pifan_core::{FanActuator, FanPolicy, StateStore, SysfsFanPin};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global shutdown flag for clean termination
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Paths
// ============================================================================

fn get_default_socket_path() -> &'static str {
    if Path::new("/run").exists() {
        "/run/pifand.sock"
    } else {
        "/var/run/pifand.sock"
    }
}

fn get_pid_file_path() -> &'static str {
    if Path::new("/run").exists() {
        "/run/pifand.pid"
    } else {
        "/var/run/pifand.pid"
    }
}

// ============================================================================
// Hardening
// ============================================================================

/// Set restrictive umask
fn set_secure_umask() {
    // SAFETY: umask is always safe to call - it only sets the file
    // creation mask for the process.
    unsafe { libc::umask(0o077) };
}

/// Change to root directory (prevent directory-based attacks)
fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("could not chdir to /");
    }
}

/// Validate socket path for security
fn validate_socket_path(path: &str) -> Result<(), String> {
    let p = Path::new(path);

    if !p.is_absolute() {
        return Err("socket path must be absolute".into());
    }
    if path.contains("..") {
        return Err("socket path contains path traversal".into());
    }
    if path.contains('\0') {
        return Err("socket path contains null byte".into());
    }

    let safe_dirs = ["/run/", "/var/run/", "/tmp/"];
    if !safe_dirs.iter().any(|d| path.starts_with(d)) {
        return Err(format!("socket path must be under {safe_dirs:?}"));
    }

    if let Some(parent) = p.parent() {
        if !parent.exists() {
            return Err(format!("parent directory does not exist: {parent:?}"));
        }
    }

    // Refuse a pre-existing symlink at the socket path.
    if p.exists()
        && p.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    {
        return Err("socket path is a symlink - refusing for security".into());
    }

    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

/// Write the PID file, refusing to start beside a live instance.
fn write_pid_file() -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let path = get_pid_file_path();

    if Path::new(path).exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: kill with signal 0 only checks whether the
                // process exists; no signal is delivered.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("another instance is running (PID {old_pid})"),
                    ));
                }
            }
        }
        // Stale PID file, remove it
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {path}");
    Ok(())
}

// ============================================================================
// Cleanup
// ============================================================================

fn cleanup(socket_path: &str) {
    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("failed to remove socket: {e}");
        }
    }

    let pid_file = get_pid_file_path();
    if Path::new(pid_file).exists() {
        if let Err(e) = std::fs::remove_file(pid_file) {
            warn!("failed to remove PID file: {e}");
        }
    }
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("pifand {VERSION} - pifan fan control daemon");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    pifand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -f, --foreground    Run in foreground (don't daemonize)");
    eprintln!("    -s, --socket PATH   Socket path (default: {})", get_default_socket_path());
    eprintln!("    -p, --pin N         BCM GPIO pin driving the fan (default: {DEFAULT_FAN_PIN})");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    PIFAN_LOG           Log level (trace, debug, info, warn, error)");
}

fn print_version() {
    println!("pifand {VERSION}");
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // PHASE 1: Pre-initialization hardening
    set_secure_umask();
    secure_working_directory();

    // PHASE 2: Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut socket_path = get_default_socket_path().to_string();
    let mut fan_pin = DEFAULT_FAN_PIN;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            "-f" | "--foreground" => {
                // Foreground mode is always on (no daemonization implemented)
            }
            "-s" | "--socket" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --socket requires a path argument");
                    std::process::exit(1);
                }
                socket_path = args[i].clone();
            }
            "-p" | "--pin" => {
                i += 1;
                let pin = args.get(i).and_then(|a| a.parse::<u8>().ok());
                match pin {
                    Some(p) => fan_pin = p,
                    None => {
                        eprintln!("Error: --pin requires a BCM pin number (0-255)");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("Unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // PHASE 3: Initialize logging - journald on systemd hosts, stdout otherwise
    let log_level = std::env::var("PIFAN_LOG").unwrap_or_else(|_| "info".to_string());

    let mut use_journald = Path::new("/run/systemd/journal/socket").exists();
    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {e}, falling back to stdout");
                use_journald = false;
                tracing_subscriber::fmt()
                    .with_target(false)
                    .with_level(true)
                    .with_env_filter(&log_level)
                    .init();
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(&log_level)
            .init();
    }

    info!("STARTUP: pifand {VERSION} starting");
    info!("STARTUP: logging to {}", if use_journald { "systemd journal" } else { "stdout" });
    info!("STARTUP: socket path: {socket_path}");
    info!("STARTUP: fan pin: BCM {fan_pin}");

    // PHASE 4: Validate socket path and claim the PID file
    if let Err(e) = validate_socket_path(&socket_path) {
        error!("invalid socket path: {e}");
        std::process::exit(1);
    }

    if let Err(e) = write_pid_file() {
        error!("could not write PID file: {e}");
        std::process::exit(1);
    }

    // PHASE 5: Initialize the actuator - fatal on failure
    let actuator: Arc<dyn FanActuator> = match SysfsFanPin::open(fan_pin) {
        Ok(pin) => Arc::new(pin),
        Err(e) => {
            error!("failed to initialize fan GPIO: {e}");
            cleanup(&socket_path);
            std::process::exit(1);
        }
    };

    // PHASE 6: Probe the metric sources - CPU/RAM/disk must be readable
    let initial = match pifan_core::startup_probe() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("host metric sources unavailable: {e}");
            cleanup(&socket_path);
            std::process::exit(1);
        }
    };

    // PHASE 7: Seed the shared state so the first status request is real,
    // and drive the pin to the initial decision.
    let store = Arc::new(StateStore::new());
    let decision = store.commit(initial, &FanPolicy::new());
    if let Err(e) = actuator.set_output(decision.fan_on) {
        warn!("initial actuator write failed: {e} - will retry next tick");
    }

    // PHASE 8: Signal handler for cleanup on SIGINT/SIGTERM
    let socket_path_clone = socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: received SIGINT/SIGTERM - initiating shutdown");
        SHUTDOWN.store(true, Ordering::SeqCst);
        cleanup(&socket_path_clone);
        info!("SHUTDOWN: daemon terminated gracefully");
        std::process::exit(0);
    }) {
        warn!("failed to set signal handler: {e}. Shutdown via signals may not work cleanly.");
    }

    // PHASE 9: Start the monitor loop in the background
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let monitor_handle = tokio::spawn(monitor::run_monitor_loop(
        store.clone(),
        actuator.clone(),
        shutdown_flag.clone(),
    ));
    info!("monitor loop started");

    // PHASE 10: Serve requests until shutdown
    let result = server::run_server(&socket_path, store.clone()).await;

    // PHASE 11: Drain the monitor loop and clean up
    shutdown_flag.store(true, Ordering::SeqCst);
    let _ = monitor_handle.await;
    cleanup(&socket_path);

    if let Err(e) = result {
        error!("server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
