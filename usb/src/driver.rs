//! Owns every open session. Callers construct their own registry and hold
//! sessions through it by index; there is no process-wide instance.

use crate::commands::{PID_ARM, PID_FX2, PID_INGAAS, VID_WASATCH};
use crate::device::libusb::WasatchUsb;
use crate::device::SpectrometerUsb;
use crate::spectrometer::Spectrometer;
use anyhow::Result;
use log::{error, info, warn};

pub struct Driver<T: SpectrometerUsb = WasatchUsb> {
    spectrometers: Vec<Spectrometer<T>>,
}

impl<T: SpectrometerUsb> Default for Driver<T> {
    fn default() -> Self {
        Self {
            spectrometers: Vec::new(),
        }
    }
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the collection, enumerates the buses and opens every
    /// matching device. A candidate that fails to open, configure or claim
    /// is logged and skipped; the enumeration itself carries on. Returns
    /// the number of sessions opened.
    pub fn open_all(&mut self) -> usize {
        let devices = match rusb::devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!("open_all: unable to enumerate USB devices: {e}");
                self.spectrometers.clear();
                return 0;
            }
        };

        let candidates = devices.iter().filter_map(|device| {
            let descriptor = device.device_descriptor().ok()?;
            if !is_spectrometer(descriptor.vendor_id(), descriptor.product_id()) {
                return None;
            }
            info!(
                "found spectrometer candidate {:04x}:{:04x} at bus {} address {}",
                descriptor.vendor_id(),
                descriptor.product_id(),
                device.bus_number(),
                device.address()
            );
            Some(WasatchUsb::from_device(device, &descriptor))
        });

        self.attach_all(candidates)
    }
}

impl<T: SpectrometerUsb> Driver<T> {
    /// Builds one session per successfully opened transport, in
    /// enumeration order; failed candidates are logged and skipped.
    fn attach_all(&mut self, candidates: impl IntoIterator<Item = Result<T>>) -> usize {
        self.spectrometers.clear();
        for candidate in candidates {
            match candidate {
                Ok(usb) => self.spectrometers.push(Spectrometer::new(usb)),
                Err(e) => warn!("skipping device that failed to open: {e:#}"),
            }
        }
        self.spectrometers.len()
    }

    pub fn count(&self) -> usize {
        self.spectrometers.len()
    }

    /// Bounds-checked lookup; the index is the caller's sole handle on a
    /// session and stays valid until `close_all`.
    pub fn get(&mut self, index: usize) -> Option<&mut Spectrometer<T>> {
        self.spectrometers.get_mut(index)
    }

    /// Closes one session in place. Its index remains occupied (so the
    /// others keep their handles) but the unit is released.
    pub fn close(&mut self, index: usize) -> bool {
        match self.spectrometers.get_mut(index) {
            Some(spectrometer) => {
                spectrometer.close();
                true
            }
            None => false,
        }
    }

    /// Closes every session in collection order and empties the
    /// collection. Safe to call when already empty; all indices are
    /// invalidated.
    pub fn close_all(&mut self) {
        for spectrometer in &mut self.spectrometers {
            spectrometer.close();
        }
        self.spectrometers.clear();
    }
}

pub fn is_spectrometer(vid: u16, pid: u16) -> bool {
    vid == VID_WASATCH && matches!(pid, PID_FX2 | PID_INGAAS | PID_ARM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crate::testing::{fake_pages, MockUsb};

    fn driver_with(candidates: Vec<Result<MockUsb>>) -> Driver<MockUsb> {
        let mut driver = Driver::<MockUsb>::default();
        driver.attach_all(candidates);
        driver
    }

    #[test]
    fn matching_is_limited_to_the_known_vendor_and_products() {
        assert!(is_spectrometer(VID_WASATCH, PID_FX2));
        assert!(is_spectrometer(VID_WASATCH, PID_INGAAS));
        assert!(is_spectrometer(VID_WASATCH, PID_ARM));
        assert!(!is_spectrometer(VID_WASATCH, 0x3000));
        assert!(!is_spectrometer(0x1234, PID_FX2));
    }

    #[test]
    fn a_failed_candidate_is_skipped_without_aborting_enumeration() {
        let mut driver = driver_with(vec![
            Ok(MockUsb::new(fake_pages(7))),
            Err(anyhow!("unable to claim interface 0")),
            Ok(MockUsb::new(fake_pages(9))),
        ]);

        assert_eq!(driver.count(), 2);
        assert_eq!(driver.get(0).unwrap().eeprom.format, 7);
        assert_eq!(driver.get(1).unwrap().eeprom.format, 9);
    }

    #[test]
    fn get_is_bounds_checked() {
        let mut driver = driver_with(vec![Ok(MockUsb::new(fake_pages(7)))]);
        assert!(driver.get(0).is_some());
        assert!(driver.get(1).is_none());
    }

    #[test]
    fn open_all_resets_any_previous_collection() {
        let mut driver = driver_with(vec![
            Ok(MockUsb::new(fake_pages(7))),
            Ok(MockUsb::new(fake_pages(7))),
        ]);
        assert_eq!(driver.count(), 2);

        driver.attach_all(vec![Ok(MockUsb::new(fake_pages(7)))]);
        assert_eq!(driver.count(), 1);
    }

    #[test]
    fn close_one_keeps_the_collection_indexed() {
        let mut driver = driver_with(vec![
            Ok(MockUsb::new(fake_pages(7))),
            Ok(MockUsb::new(fake_pages(7))),
        ]);

        assert!(driver.close(0));
        assert!(!driver.close(5));
        assert_eq!(driver.count(), 2);
        assert!(driver.get(1).is_some());
    }

    #[test]
    fn close_all_empties_the_collection_and_is_reentrant() {
        let mut driver = driver_with(vec![Ok(MockUsb::new(fake_pages(7)))]);
        driver.close_all();
        assert_eq!(driver.count(), 0);
        assert!(driver.get(0).is_none());

        driver.close_all(); // already empty
        assert_eq!(driver.count(), 0);
    }
}
