#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No spectrometer was found")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),

    #[error("Unable to claim interface")]
    DeviceNotClaimed,
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),

    #[error("Malformed response from spectrometer: {0}")]
    MalformedResponse(String),

    #[error("Operation not supported by this unit: {0}")]
    Unsupported(&'static str),

    #[error("Argument out of range: {0}")]
    OutOfRange(&'static str),
}
