use enumset::EnumSetType;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::Display;

/// One bit of the 16-bit capability word stored on newer EEPROMs (format 9
/// and up). The word replaces the older one-byte-per-capability fields and
/// leaves the upper bits free for future hardware revisions.
///
/// Bit positions are fixed by the EEPROM layout and match declaration order
/// here (bit 0 first).
#[derive(EnumSetType, Debug, Display)]
#[enumset(repr = "u16")]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Feature {
    /// The grating and detector are mounted such that spectra read out
    /// red-to-blue; the driver reverses each spectrum so callers always see
    /// increasing wavelengths, which is the order the factory wavelength
    /// calibration assumes.
    InvertXAxis,

    /// The detector carries a Bayer filter whose columns alternate red/blue
    /// sensitivity. Firmware performs the vertical half of the 2x2 binning;
    /// the horizontal half (averaging adjacent pixels) is done in the driver.
    Bin2x2,

    /// Unit has the "Gen 1.5" OEM accessory connector (triggering, lamp
    /// control, continuous strobe, fan and shutter control, external power).
    Gen15,

    /// A cutoff filter is installed in the optical path.
    CutoffFilterInstalled,

    /// InGaAs unit with even/odd pixel gain and offset correction applied in
    /// the FPGA rather than in software.
    HardwareEvenOdd,
}

/// Secondary selector (EEPROM page 5, byte 63) telling the driver how to
/// interpret the byte ranges shared between Raman intensity calibration and
/// free-form user data. Only meaningful on format 6 and later; explicit on
/// the EEPROM from format 8.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Subformat {
    /// Page 4 (and the intensity-correction byte range) hold opaque
    /// customer data.
    UserData,

    /// Page 6 holds a Raman intensity (SRM) calibration polynomial.
    RamanIntensityCalibration,

    /// Page 6 holds spline wavelength-calibration knots.
    SplineWavecal,
}

impl From<u8> for Subformat {
    fn from(value: u8) -> Self {
        match value {
            1 => Subformat::RamanIntensityCalibration,
            2 => Subformat::SplineWavecal,
            // Unknown selectors (blank EEPROMs read 0xff here) fall back to
            // the conservative interpretation.
            _ => Subformat::UserData,
        }
    }
}

impl Default for Subformat {
    fn default() -> Self {
        Subformat::UserData
    }
}
