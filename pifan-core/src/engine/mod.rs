//! Fan decision engine

mod policy;

pub use policy::{FanDecision, FanPolicy};
