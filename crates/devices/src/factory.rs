//! DeviceFactory - opens the device set of a session
//!
//! Opening is all-or-nothing: if any device fails to open, every device
//! opened so far is closed again before the error is returned.

use contracts::DeviceClock;
use tracing::{error, info, instrument, warn};

use crate::backend::DeviceBackend;
use crate::error::{DeviceError, Result};

pub struct DeviceFactory<B: DeviceBackend> {
    backend: B,
}

impl<B: DeviceBackend> DeviceFactory<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open every listed device, in order
    #[instrument(
        name = "device_factory_open_all",
        skip(self, serials),
        fields(backend = self.backend.name(), device_count = serials.len())
    )]
    pub fn open_all(&self, serials: &[String]) -> Result<Vec<Box<dyn DeviceClock>>> {
        let available = self.backend.enumerate()?;
        let mut opened: Vec<Box<dyn DeviceClock>> = Vec::with_capacity(serials.len());

        for serial in serials {
            let result = if available.iter().any(|s| s == serial) {
                self.backend.open(serial)
            } else {
                Err(DeviceError::NotFound {
                    serial: serial.clone(),
                })
            };

            match result {
                Ok(device) => {
                    info!(serial = %serial, "device opened");
                    opened.push(device);
                }
                Err(e) => {
                    warn!(
                        serial = %serial,
                        error = %e,
                        "open failed, rolling back opened devices"
                    );
                    self.rollback(&mut opened);
                    return Err(e);
                }
            }
        }

        info!(devices = opened.len(), "all devices opened");
        Ok(opened)
    }

    #[instrument(name = "device_factory_rollback", skip(self, opened), fields(count = opened.len()))]
    fn rollback(&self, opened: &mut Vec<Box<dyn DeviceClock>>) {
        for device in opened.iter_mut() {
            close_device_safe(device.as_mut());
        }
        opened.clear();
    }
}

/// Close a device, logging instead of propagating failure
pub fn close_device_safe(device: &mut dyn DeviceClock) {
    let id = device.device_id().clone();
    info!(device = %id, "closing device");
    if let Err(e) = device.close() {
        error!(device = %id, error = %e, "failed to close device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::sim::{SimBackend, SimDeviceSpec};
    use contracts::SystemHostClock;
    use std::sync::Arc;

    fn serials(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_open_all() {
        let backend = SimBackend::new(Arc::new(SystemHostClock))
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b"));
        let factory = DeviceFactory::new(backend);
        let devices = factory.open_all(&serials(&["b", "a"])).unwrap();
        let ids: Vec<_> = devices.iter().map(|d| d.device_id().to_string()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_missing_device_rolls_back() {
        let backend = SimBackend::new(Arc::new(SystemHostClock)).with_device(SimDeviceSpec::new("a"));
        let factory = DeviceFactory::new(backend);
        let err = factory.open_all(&serials(&["a", "zz"])).err().unwrap();
        assert!(matches!(err, DeviceError::NotFound { .. }));
        assert!(factory.backend().snapshot("a").unwrap().closed);
    }

    #[test]
    fn test_capability_failure_rolls_back() {
        let backend = SimBackend::new(Arc::new(SystemHostClock))
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b"))
            .with_device(SimDeviceSpec::new("c").without(Capability::TimestampLatch));
        let factory = DeviceFactory::new(backend);
        assert!(factory.open_all(&serials(&["a", "b", "c"])).is_err());
        assert!(factory.backend().snapshot("a").unwrap().closed);
        assert!(factory.backend().snapshot("b").unwrap().closed);
        assert!(factory.backend().snapshot("c").is_none());
    }
}
