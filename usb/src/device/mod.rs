pub mod base;
pub mod libusb;

pub use base::SpectrometerUsb;
