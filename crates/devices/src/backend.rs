//! Device backend abstraction
//!
//! A backend knows how to find and open devices. Vendor drivers and the
//! simulated backend implement the same trait.

use contracts::DeviceClock;

use crate::error::Result;

pub trait DeviceBackend: Send + Sync {
    /// Backend name (used for logging)
    fn name(&self) -> &str;

    /// Serials of the devices currently reachable
    fn enumerate(&self) -> Result<Vec<String>>;

    /// Open a device and resolve its capabilities
    fn open(&self, serial: &str) -> Result<Box<dyn DeviceClock>>;
}
