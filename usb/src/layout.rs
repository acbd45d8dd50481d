//! Byte locations of every calibration-record field, grouped by page.
//!
//! The record has been revised ten times; rather than scattering the format
//! checks through the decoder, each field carries the inclusive range of
//! format revisions for which its bytes hold that meaning. Historical
//! byte-range reuse shows up here as adjacent constants with disjoint
//! ranges (page 0 byte 39, page 2 byte 21).

/// One fixed-width field on a calibration page, valid for an inclusive
/// range of format revisions. Reads outside the range decode to the field
/// type's default.
#[derive(Copy, Clone, Debug)]
pub struct Field {
    pub page: usize,
    pub offset: usize,
    min_format: u8,
    max_format: u8,
}

impl Field {
    pub const fn at(page: usize, offset: usize) -> Self {
        Self {
            page,
            offset,
            min_format: 0,
            max_format: u8::MAX,
        }
    }

    pub const fn since(page: usize, offset: usize, min_format: u8) -> Self {
        Self {
            page,
            offset,
            min_format,
            max_format: u8::MAX,
        }
    }

    pub const fn until(page: usize, offset: usize, max_format: u8) -> Self {
        Self {
            page,
            offset,
            min_format: 0,
            max_format,
        }
    }

    pub const fn defined_for(&self, format: u8) -> bool {
        self.min_format <= format && format <= self.max_format
    }
}

/// A fixed-length string field.
#[derive(Copy, Clone, Debug)]
pub struct StrField {
    pub page: usize,
    pub offset: usize,
    pub len: usize,
    min_format: u8,
}

impl StrField {
    pub const fn at(page: usize, offset: usize, len: usize) -> Self {
        Self {
            page,
            offset,
            len,
            min_format: 0,
        }
    }

    pub const fn since(page: usize, offset: usize, len: usize, min_format: u8) -> Self {
        Self {
            page,
            offset,
            len,
            min_format,
        }
    }

    pub const fn defined_for(&self, format: u8) -> bool {
        self.min_format <= format
    }
}

/// Identity, capability flags and controller startup defaults.
pub mod page0 {
    use super::{Field, StrField};

    pub const MODEL: StrField = StrField::at(0, 0, 16);
    pub const SERIAL_NUMBER: StrField = StrField::at(0, 16, 16);
    pub const BAUD_RATE: Field = Field::at(0, 32);
    pub const HAS_COOLING: Field = Field::at(0, 36);
    pub const HAS_BATTERY: Field = Field::at(0, 37);
    pub const HAS_LASER: Field = Field::at(0, 38);
    /// u16 nanometres; these two bytes were reassigned to the feature word
    /// on format 9 (excitation moved to a float on page 3 back on format 4).
    pub const EXCITATION_NM_LEGACY: Field = Field::until(0, 39, 8);
    pub const FEATURE_MASK: Field = Field::since(0, 39, 9);
    pub const SLIT_SIZE_UM: Field = Field::at(0, 41);
    pub const STARTUP_INTEGRATION_TIME_MS: Field = Field::at(0, 43);
    pub const STARTUP_DETECTOR_TEMP_DEG_C: Field = Field::at(0, 45);
    pub const STARTUP_TRIGGERING_MODE: Field = Field::at(0, 47);
    pub const DETECTOR_GAIN: Field = Field::at(0, 48);
    pub const DETECTOR_OFFSET: Field = Field::at(0, 52);
    pub const DETECTOR_GAIN_ODD: Field = Field::at(0, 54);
    pub const DETECTOR_OFFSET_ODD: Field = Field::at(0, 58);
    pub const FORMAT: Field = Field::at(0, 63);
}

/// Wavelength calibration and thermal compensation.
pub mod page1 {
    use super::{Field, StrField};

    pub const WAVECAL_COEFFS: [Field; 4] = [
        Field::at(1, 0),
        Field::at(1, 4),
        Field::at(1, 8),
        Field::at(1, 12),
    ];
    pub const DEG_C_TO_DAC_COEFFS: [Field; 3] =
        [Field::at(1, 16), Field::at(1, 20), Field::at(1, 24)];
    pub const DETECTOR_TEMP_MAX: Field = Field::at(1, 28);
    pub const DETECTOR_TEMP_MIN: Field = Field::at(1, 30);
    pub const ADC_TO_DEG_C_COEFFS: [Field; 3] =
        [Field::at(1, 32), Field::at(1, 36), Field::at(1, 40)];
    pub const THERMISTOR_RESISTANCE_AT_298K: Field = Field::at(1, 44);
    pub const THERMISTOR_BETA: Field = Field::at(1, 46);
    pub const CALIBRATION_DATE: StrField = StrField::at(1, 48, 12);
    pub const CALIBRATION_BY: StrField = StrField::at(1, 60, 3);
}

/// Detector geometry, ROI and linearity.
pub mod page2 {
    use super::{Field, StrField};

    pub const DETECTOR_NAME: StrField = StrField::at(2, 0, 16);
    pub const ACTIVE_PIXELS_HORIZ: Field = Field::at(2, 16);
    pub const ACTIVE_PIXELS_VERT: Field = Field::at(2, 19);
    /// u16 limits, superseded by 32-bit fields on page 3 from format 5; the
    /// bytes were recycled for the fifth wavelength coefficient on format 8.
    pub const MIN_INTEGRATION_LEGACY: Field = Field::until(2, 21, 4);
    pub const MAX_INTEGRATION_LEGACY: Field = Field::until(2, 23, 4);
    pub const WAVECAL_COEFF_4: Field = Field::since(2, 21, 8);
    pub const ACTUAL_PIXELS_HORIZ: Field = Field::at(2, 25);
    pub const ROI_HORIZ_START: Field = Field::at(2, 27);
    pub const ROI_HORIZ_END: Field = Field::at(2, 29);
    pub const ROI_VERT_REGION_START: [Field; 3] =
        [Field::at(2, 31), Field::at(2, 35), Field::at(2, 39)];
    pub const ROI_VERT_REGION_END: [Field; 3] =
        [Field::at(2, 33), Field::at(2, 37), Field::at(2, 41)];
    pub const LINEARITY_COEFFS: [Field; 5] = [
        Field::at(2, 43),
        Field::at(2, 47),
        Field::at(2, 51),
        Field::at(2, 55),
        Field::at(2, 59),
    ];
}

/// Laser power calibration and the wide integration limits.
pub mod page3 {
    use super::Field;

    pub const LASER_POWER_COEFFS: [Field; 4] = [
        Field::at(3, 12),
        Field::at(3, 16),
        Field::at(3, 20),
        Field::at(3, 24),
    ];
    pub const MAX_LASER_POWER_MW: Field = Field::at(3, 28);
    pub const MIN_LASER_POWER_MW: Field = Field::at(3, 32);
    pub const EXCITATION_NM: Field = Field::since(3, 36, 4);
    pub const MIN_INTEGRATION_TIME_MS: Field = Field::since(3, 40, 5);
    pub const MAX_INTEGRATION_TIME_MS: Field = Field::since(3, 44, 5);
    pub const AVG_RESOLUTION: Field = Field::since(3, 48, 7);
}

/// Bad pixels, product configuration and the subformat selector.
pub mod page5 {
    use super::{Field, StrField};

    pub const MAX_BAD_PIXELS: usize = 15;

    pub const fn bad_pixel(i: usize) -> Field {
        Field::at(5, i * 2)
    }

    pub const PRODUCT_CONFIGURATION: StrField = StrField::since(5, 30, 16, 5);
    pub const SUBFORMAT: Field = Field::since(5, 63, 8);
}

/// Raman intensity (SRM) calibration.
pub mod page6 {
    use super::Field;

    pub const MAX_INTENSITY_CORRECTION_COEFFS: usize = 8;

    pub const INTENSITY_CORRECTION_ORDER: Field = Field::since(6, 0, 6);

    pub const fn intensity_correction_coeff(i: usize) -> Field {
        Field::since(6, 1 + 4 * i, 6)
    }
}
