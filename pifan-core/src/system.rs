//! Host metrics sampling
//!
//! Reads CPU load, SoC temperature, memory, and disk figures from the OS.
//! Stateless and read-only: every reader is a pure function of OS state,
//! and the file-backed ones take a path so tests can point them at
//! fixtures.
//!
//! Failure handling follows two tiers. The temperature is genuinely
//! optional (absent on non-Pi hosts and inside containers) and degrades
//! to `None`. CPU/RAM/disk sources are assumed present on a conforming
//! host: [`startup_probe`] treats their absence as fatal, while per-tick
//! failures after a successful probe are logged and degrade to zero so
//! the monitor loop keeps running.

use std::ffi::CString;
use std::fs;
use std::path::Path;
use std::process::Command;

use pifan_error::{PifanError, Result};
use tracing::{debug, warn};

use crate::constants::{paths, units};
use crate::data::SystemSnapshot;

/// Take one full sample of host metrics.
///
/// Never fails: individual sensor failures degrade the affected field
/// and the next tick retries naturally.
pub fn sample() -> SystemSnapshot {
    let cpu_percent = read_cpu_percent().unwrap_or_else(|e| {
        warn!("CPU load sample degraded: {e}");
        0.0
    });
    let cpu_temp_c = read_temperature();
    let (ram_used_mb, ram_total_mb, ram_percent) = read_memory().unwrap_or_else(|e| {
        warn!("memory sample degraded: {e}");
        (0, 0, 0.0)
    });
    let (disk_used_gb, disk_total_gb, disk_percent) = read_disk().unwrap_or_else(|e| {
        warn!("disk sample degraded: {e}");
        (0, 0, 0.0)
    });

    SystemSnapshot {
        cpu_percent,
        cpu_temp_c,
        ram_used_mb,
        ram_total_mb,
        ram_percent,
        disk_used_gb,
        disk_total_gb,
        disk_percent,
    }
}

/// Verify the non-optional OS sources are readable before the daemon
/// commits to running.
///
/// CPU, memory, and disk failures abort startup with a diagnostic; an
/// absent temperature is tolerated (forced-auto control stays inactive
/// until the sensor returns).
pub fn startup_probe() -> Result<SystemSnapshot> {
    let cpu_percent = read_cpu_percent()?;
    let (ram_used_mb, ram_total_mb, ram_percent) = read_memory()?;
    let (disk_used_gb, disk_total_gb, disk_percent) = read_disk()?;

    let cpu_temp_c = read_temperature();
    if cpu_temp_c.is_none() {
        warn!("CPU temperature source unavailable; the thermal override is inactive until it returns");
    }

    Ok(SystemSnapshot {
        cpu_percent,
        cpu_temp_c,
        ram_used_mb,
        ram_total_mb,
        ram_percent,
        disk_used_gb,
        disk_total_gb,
        disk_percent,
    })
}

// ============================================================================
// Temperature
// ============================================================================

/// Read the SoC temperature in degrees Celsius.
///
/// Tries the kernel thermal zone first, then falls back to
/// `vcgencmd measure_temp` (the firmware interface on a Raspberry Pi
/// where the thermal zone is not exposed). Returns `None` when neither
/// source can be read or parsed.
pub fn read_temperature() -> Option<f64> {
    match read_temperature_from(Path::new(paths::THERMAL_ZONE_TEMP)) {
        Ok(t) => Some(t),
        Err(e) => {
            debug!("thermal zone read failed: {e}; trying vcgencmd");
            match read_temperature_vcgencmd() {
                Ok(t) => Some(t),
                Err(e) => {
                    debug!("temperature unavailable: {e}");
                    None
                }
            }
        }
    }
}

/// The thermal zone reports millidegrees (e.g. `48312` is 48.312 degrees).
fn read_temperature_from(path: &Path) -> Result<f64> {
    let content = read_trimmed(path)?;
    let millidegrees: i64 = content.parse().map_err(|_| PifanError::Parse {
        path: path.into(),
        detail: format!("expected integer millidegrees, got '{content}'"),
    })?;
    Ok(millidegrees as f64 / units::MILLIDEGREES_PER_DEGREE)
}

/// `vcgencmd measure_temp` prints `temp=48.3'C`.
fn read_temperature_vcgencmd() -> Result<f64> {
    let output = Command::new("vcgencmd").arg("measure_temp").output()?;
    if !output.status.success() {
        return Err(PifanError::generic("vcgencmd measure_temp failed"));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let trimmed = text.trim();
    parse_vcgencmd_temp(trimmed)
        .ok_or_else(|| PifanError::generic(format!("unparseable vcgencmd output: '{trimmed}'")))
}

fn parse_vcgencmd_temp(s: &str) -> Option<f64> {
    s.strip_prefix("temp=")?.trim_end_matches("'C").parse().ok()
}

// ============================================================================
// CPU
// ============================================================================

/// CPU utilization percentage from the 1-minute load average divided by
/// the online core count.
///
/// This is a stateless proxy (no two-sample delta to retain between
/// ticks). It is >= 0 and can exceed 100 when the run queue outgrows the
/// core count.
pub fn read_cpu_percent() -> Result<f64> {
    read_cpu_percent_from(Path::new(paths::PROC_LOADAVG))
}

fn read_cpu_percent_from(path: &Path) -> Result<f64> {
    let content = read_trimmed(path)?;
    // Format: "0.35 0.28 0.22 1/234 5678" - first field is the 1-minute average.
    let load_1m: f64 = content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PifanError::Parse {
            path: path.into(),
            detail: format!("bad loadavg line '{content}'"),
        })?;

    let cores = online_cores().max(1) as f64;
    Ok((load_1m / cores * 100.0).max(0.0))
}

fn online_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

// ============================================================================
// Memory
// ============================================================================

/// Memory usage as `(used_mb, total_mb, percent)`.
///
/// Used is `MemTotal - MemAvailable`, the same definition the kernel's
/// own tooling reports.
pub fn read_memory() -> Result<(u64, u64, f64)> {
    read_memory_from(Path::new(paths::PROC_MEMINFO))
}

fn read_memory_from(path: &Path) -> Result<(u64, u64, f64)> {
    let content = fs::read_to_string(path).map_err(|e| PifanError::SensorRead {
        path: path.into(),
        source: e,
    })?;

    let mut total_kb = None;
    let mut available_kb = None;
    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            total_kb = Some(parse_meminfo_value(line));
        } else if line.starts_with("MemAvailable:") {
            available_kb = Some(parse_meminfo_value(line));
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }

    let total_kb = total_kb.filter(|v| *v > 0).ok_or_else(|| PifanError::Parse {
        path: path.into(),
        detail: "MemTotal missing or zero".into(),
    })?;
    let available_kb = available_kb.ok_or_else(|| PifanError::Parse {
        path: path.into(),
        detail: "MemAvailable missing".into(),
    })?;

    let used_kb = total_kb.saturating_sub(available_kb);
    let percent = used_kb as f64 / total_kb as f64 * 100.0;
    Ok((used_kb / units::KB_PER_MB, total_kb / units::KB_PER_MB, percent))
}

/// Parse a meminfo line like "MemTotal:       16384000 kB"
fn parse_meminfo_value(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

// ============================================================================
// Disk
// ============================================================================

/// Root filesystem usage as `(used_gb, total_gb, percent)`.
pub fn read_disk() -> Result<(u64, u64, f64)> {
    read_disk_from(paths::DISK_MOUNT)
}

fn read_disk_from(mount: &str) -> Result<(u64, u64, f64)> {
    let c_path =
        CString::new(mount).map_err(|_| PifanError::generic("mount path contains NUL"))?;

    // SAFETY: statvfs only reads the NUL-terminated path and writes into
    // the zeroed struct we hand it; both outlive the call.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(PifanError::Io(std::io::Error::last_os_error()));
    }

    let block = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block;
    let free = stat.f_bfree as u64 * block;
    let used = total.saturating_sub(free);
    let percent = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    };

    Ok((used / units::BYTES_PER_GB, total / units::BYTES_PER_GB, percent))
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Read a sysfs/procfs file and return its trimmed content.
fn read_trimmed(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(PifanError::SensorUnavailable { path: path.into() });
    }
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| PifanError::SensorRead {
            path: path.into(),
            source: e,
        })
}
