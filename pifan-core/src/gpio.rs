//! Sysfs GPIO actuator
//!
//! Drives the fan transistor through `/sys/class/gpio`. Setup (export,
//! direction) happens once at startup and is fatal on failure; the
//! per-tick value write is fire-and-forget from the monitor loop's
//! perspective and reported as a non-fatal fault.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use pifan_error::{PifanError, Result};
use tracing::{debug, info};

use crate::constants::{paths, timing};

/// Binary actuator seam. The monitor loop drives this once per tick;
/// tests substitute a recording double.
pub trait FanActuator: Send + Sync {
    /// Drive the output. Idempotent; a failure is reported to the caller
    /// for logging and retried naturally on the next tick.
    fn set_output(&self, on: bool) -> Result<()>;
}

/// A GPIO pin exposed through the kernel's sysfs interface.
#[derive(Debug)]
pub struct SysfsFanPin {
    pin: u8,
    value_path: PathBuf,
}

impl SysfsFanPin {
    /// Export the pin, configure it as an output, and drive it low.
    ///
    /// Any failure here aborts startup: the daemon must not run without
    /// its actuator.
    pub fn open(pin: u8) -> Result<Self> {
        Self::open_at(Path::new(paths::GPIO_BASE), pin)
    }

    fn open_at(base: &Path, pin: u8) -> Result<Self> {
        let gpio_dir = base.join(format!("gpio{pin}"));

        if !gpio_dir.exists() {
            fs::write(base.join("export"), pin.to_string()).map_err(|e| PifanError::GpioInit {
                pin,
                reason: format!("export failed: {e}"),
            })?;
            // The kernel needs a moment to create the pin's attribute files.
            thread::sleep(Duration::from_millis(timing::GPIO_EXPORT_SETTLE_MS));
            debug!("exported GPIO pin {pin}");
        }

        fs::write(gpio_dir.join("direction"), "out").map_err(|e| PifanError::GpioInit {
            pin,
            reason: format!("setting direction failed: {e}"),
        })?;

        let value_path = gpio_dir.join("value");
        fs::write(&value_path, "0").map_err(|e| PifanError::GpioInit {
            pin,
            reason: format!("initial low write failed: {e}"),
        })?;

        info!("GPIO pin {pin} configured as output (low)");
        Ok(Self { pin, value_path })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl FanActuator for SysfsFanPin {
    fn set_output(&self, on: bool) -> Result<()> {
        fs::write(&self.value_path, if on { "1" } else { "0" }).map_err(|e| {
            PifanError::GpioWrite {
                pin: self.pin,
                source: e,
            }
        })
    }
}
