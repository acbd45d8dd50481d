use crate::device::base::SpectrometerUsb;
use anyhow::{Context, Result};
use log::debug;
use rusb::{Device, DeviceDescriptor, DeviceHandle, Direction, GlobalContext, Recipient, RequestType};
use std::time::Duration;

/// A claimed spectrometer over libusb. Control transfers are vendor
/// requests addressed to the device (0x40 out / 0xC0 in).
pub struct WasatchUsb {
    handle: DeviceHandle<GlobalContext>,
    product_id: u16,
}

impl WasatchUsb {
    /// open → set-configuration(1) → claim-interface(0). Any failure makes
    /// the candidate unusable; the registry logs the error and skips it.
    pub fn from_device(
        device: Device<GlobalContext>,
        descriptor: &DeviceDescriptor,
    ) -> Result<Self> {
        let mut handle = device.open().context("unable to open device")?;
        debug!(
            "opened device at bus {} address {}",
            device.bus_number(),
            device.address()
        );

        handle
            .set_active_configuration(1)
            .context("unable to select configuration 1")?;
        handle
            .claim_interface(0)
            .context("unable to claim interface 0")?;

        Ok(Self {
            handle,
            product_id: descriptor.product_id(),
        })
    }
}

impl SpectrometerUsb for WasatchUsb {
    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn control_write(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), rusb::Error> {
        self.handle.write_control(
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device),
            request,
            value,
            index,
            data,
            timeout,
        )?;

        Ok(())
    }

    fn control_read(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error> {
        let mut buf = vec![0; length];
        let response_length = self.handle.read_control(
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device),
            request,
            value,
            index,
            &mut buf,
            timeout,
        )?;
        buf.truncate(response_length);
        Ok(buf)
    }

    fn bulk_read(
        &mut self,
        endpoint: u8,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error> {
        let mut buf = vec![0; length];
        let bytes_read = self.handle.read_bulk(endpoint, &mut buf, timeout)?;
        buf.truncate(bytes_read);
        Ok(buf)
    }

    fn release(&mut self) -> Result<(), rusb::Error> {
        self.handle.release_interface(0)
    }
}
