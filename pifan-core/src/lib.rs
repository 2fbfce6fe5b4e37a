//! Pifan Core Library
//!
//! Shared building blocks for the pifan fan-control daemon on a
//! Raspberry Pi class single-board computer.
//!
//! # Module Structure
//!
//! - `system` - host metrics sampling (CPU load, temperature, RAM, disk)
//! - `engine` - the fan on/off decision policy
//! - `state` - the mutex-guarded shared state store
//! - `gpio` - sysfs GPIO actuator
//! - `constants` - paths, thresholds, timing
//!
//! # Example
//!
//! ```no_run
//! use pifan_core::{sample, FanPolicy, StateStore};
//!
//! let store = StateStore::new();
//! let decision = store.commit(sample(), &FanPolicy::new());
//! println!("fan on: {}", decision.fan_on);
//! ```

pub mod constants;
pub mod data;
pub mod engine;
pub mod gpio;
pub mod state;
pub mod system;

// Re-export primary types
pub use data::{FanState, SharedState, SystemSnapshot};
pub use engine::{FanDecision, FanPolicy};
pub use gpio::{FanActuator, SysfsFanPin};
pub use state::StateStore;
pub use system::{read_temperature, sample, startup_probe};

// Re-export error types
pub use pifan_error::{PifanError, Result};
