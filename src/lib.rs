mod ack;
mod backoff;
mod client;
mod config;
mod diff;
mod engine;
mod error;
mod logger;
mod model;
mod protocol;
mod sse;
mod timer;
mod types;

pub use client::{SmartLightClient, SmartLightClientBuilder};
pub use config::Config;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{MAX_TARGET_C, MIN_TARGET_C, clamp_target, format_temperature, round_to_step};
pub use types::*;
