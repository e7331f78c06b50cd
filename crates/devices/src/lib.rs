//! # Devices
//!
//! Camera device access.
//!
//! Responsibilities:
//! - Enumerate and open devices through a `DeviceBackend`
//! - Resolve vendor property names to typed capabilities once, at open time
//! - Open a whole device set atomically (rollback on partial failure)
//! - Provide a simulated backend for tests and dry runs

pub mod backend;
pub mod capability;
pub mod error;
pub mod factory;
pub mod sim;

pub use backend::DeviceBackend;
pub use capability::{resolve_capabilities, Capability, ResolvedCapabilities};
pub use contracts::DeviceClock;
pub use error::{DeviceError, Result};
pub use factory::DeviceFactory;
pub use sim::{PropertyNaming, SimBackend, SimDevice, SimDeviceSpec, SimSnapshot};
