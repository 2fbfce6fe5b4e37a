//! Constants and configuration values for pifan
//!
//! Centralizes all magic numbers, paths, and configuration defaults.
//! Never use magic numbers in other files - add them here first.

/// Fan control parameters
pub mod fan {
    /// Temperature above which the fan is forced on regardless of the
    /// manual preference. Strict greater-than: a reading of exactly this
    /// value does not trigger the override.
    pub const TEMP_THRESHOLD_C: f64 = 55.0;

    /// BCM pin number driving the fan transistor
    pub const DEFAULT_FAN_PIN: u8 = 17;
}

/// Monitor loop timing
pub mod timing {
    /// Interval between monitor loop ticks
    pub const POLL_INTERVAL_MS: u64 = 2000;

    /// Settle time after exporting a GPIO pin before its attribute files
    /// are guaranteed to exist
    pub const GPIO_EXPORT_SETTLE_MS: u64 = 100;
}

/// System paths
pub mod paths {
    /// SoC temperature in millidegrees Celsius
    pub const THERMAL_ZONE_TEMP: &str = "/sys/class/thermal/thermal_zone0/temp";

    /// Load averages, first field is the 1-minute value
    pub const PROC_LOADAVG: &str = "/proc/loadavg";

    /// Memory statistics in kB
    pub const PROC_MEMINFO: &str = "/proc/meminfo";

    /// Base path for sysfs GPIO control
    pub const GPIO_BASE: &str = "/sys/class/gpio";

    /// Mount point whose filesystem is reported as disk usage
    pub const DISK_MOUNT: &str = "/";
}

/// Unit conversion factors
pub mod units {
    /// Kilobytes per megabyte
    pub const KB_PER_MB: u64 = 1024;

    /// Bytes per gigabyte
    pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

    /// Millidegrees per degree Celsius
    pub const MILLIDEGREES_PER_DEGREE: f64 = 1000.0;
}
