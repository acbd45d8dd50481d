use std::time::Duration;

/// The slice of USB behaviour a session needs from its transport: vendor
/// control transfers in both directions and blocking bulk reads. The
/// libusb implementation talks to real hardware; tests script one.
///
/// Every call blocks the current thread for up to `timeout`.
pub trait SpectrometerUsb {
    fn product_id(&self) -> u16;

    fn control_write(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), rusb::Error>;

    fn control_read(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error>;

    fn bulk_read(
        &mut self,
        endpoint: u8,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error>;

    /// Releases the claimed interface; the handle itself closes when the
    /// transport is dropped.
    fn release(&mut self) -> Result<(), rusb::Error>;
}
