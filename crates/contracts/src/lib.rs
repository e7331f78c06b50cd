//! # Contracts
//!
//! Shared interface contracts for the capture workspace: device capability
//! surface, frame records, scheduling values, session blueprint and reports.
//! Business crates depend on this crate, never the other way round.
//!
//! ## Time Model
//! - Host time is nanoseconds on the host realtime clock (`HostClock`)
//! - Device time is nanoseconds on a device's own clock (`DeviceClock`)
//! - `ClockOffset` maps one to the other: `device = host + offset_ns`

mod blueprint;
mod device;
mod device_id;
mod error;
mod frame;
mod report;
mod schedule;
mod sink;

pub use blueprint::*;
pub use device::*;
pub use device_id::DeviceId;
pub use error::*;
pub use frame::*;
pub use report::*;
pub use schedule::*;
pub use sink::*;
