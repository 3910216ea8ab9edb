//! The fragment pipeline: a processing hook and the pump that drives it.

mod processor;
mod pump;

pub use processor::{Identity, Processor};
pub use pump::{DuplexPump, PumpState};
