//! Scripted transport and calibration-page builders shared by the unit
//! tests. The builder writes through the public codec, so the writer half
//! of the codec gets exercised on every parse test.

use crate::commands::{EEPROM_PAGES, EEPROM_PAGE_SIZE, PID_FX2};
use crate::device::SpectrometerUsb;
use crate::layout::{page0, page1, page2, page3, page5, page6};
use crate::parse;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
pub struct ControlWrite {
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
}

/// Serves calibration pages to control reads, records control writes, and
/// replays a queue of bulk-read results.
pub struct MockUsb {
    pub product_id: u16,
    pub pages: Vec<Vec<u8>>,
    pub control_writes: Vec<ControlWrite>,
    pub bulk_results: VecDeque<Result<Vec<u8>, rusb::Error>>,
    pub bulk_timeouts: Vec<Duration>,
    pub fail_control_reads: bool,
    pub fail_control_writes: bool,
    pub released: bool,
}

impl MockUsb {
    pub fn new(pages: Vec<Vec<u8>>) -> Self {
        Self {
            product_id: PID_FX2,
            pages,
            control_writes: Vec::new(),
            bulk_results: VecDeque::new(),
            bulk_timeouts: Vec::new(),
            fail_control_reads: false,
            fail_control_writes: false,
            released: false,
        }
    }

    pub fn queue_bulk(&mut self, result: Result<Vec<u8>, rusb::Error>) {
        self.bulk_results.push_back(result);
    }
}

impl SpectrometerUsb for MockUsb {
    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn control_write(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<(), rusb::Error> {
        if self.fail_control_writes {
            return Err(rusb::Error::Pipe);
        }
        self.control_writes.push(ControlWrite {
            request,
            value,
            index,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn control_read(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error> {
        if self.fail_control_reads {
            return Err(rusb::Error::Pipe);
        }
        if request == 0xff && value == 0x01 {
            let mut page = self
                .pages
                .get(usize::from(index))
                .cloned()
                .unwrap_or_else(|| vec![0; EEPROM_PAGE_SIZE]);
            page.truncate(length);
            return Ok(page);
        }
        Ok(vec![0; length])
    }

    fn bulk_read(
        &mut self,
        _endpoint: u8,
        _length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, rusb::Error> {
        self.bulk_timeouts.push(timeout);
        self.bulk_results
            .pop_front()
            .unwrap_or(Err(rusb::Error::Timeout))
    }

    fn release(&mut self) -> Result<(), rusb::Error> {
        self.released = true;
        Ok(())
    }
}

/// A plausible calibration record for the requested format revision:
/// a cooled 785 nm Raman unit with a 1024-pixel detector, a usable laser
/// power calibration, two bad pixels (one duplicated) and, from format 8,
/// an explicit Raman-intensity subformat.
pub fn fake_pages(format: u8) -> Vec<Vec<u8>> {
    let mut pages = vec![vec![0u8; EEPROM_PAGE_SIZE]; EEPROM_PAGES];

    // page 0: identity and startup defaults
    {
        let p = &mut pages[0];
        parse::write_string("WP-785", p, page0::MODEL.offset, page0::MODEL.len);
        parse::write_string(
            "WP-00693",
            p,
            page0::SERIAL_NUMBER.offset,
            page0::SERIAL_NUMBER.len,
        );
        parse::write_u32(115200, p, page0::BAUD_RATE.offset);
        parse::write_bool(true, p, page0::HAS_COOLING.offset);
        parse::write_bool(false, p, page0::HAS_BATTERY.offset);
        parse::write_bool(true, p, page0::HAS_LASER.offset);
        if format >= 9 {
            // recycled bytes carry the feature word: invert + 2x2 binning
            parse::write_u16(0x0003, p, page0::FEATURE_MASK.offset);
        } else {
            parse::write_u16(785, p, page0::EXCITATION_NM_LEGACY.offset);
        }
        parse::write_u16(50, p, page0::SLIT_SIZE_UM.offset);
        parse::write_u16(10, p, page0::STARTUP_INTEGRATION_TIME_MS.offset);
        // deliberately above the detector maximum so the clamp is visible
        parse::write_i16(15, p, page0::STARTUP_DETECTOR_TEMP_DEG_C.offset);
        parse::write_u8(0, p, page0::STARTUP_TRIGGERING_MODE.offset);
        parse::write_f32(1.9, p, page0::DETECTOR_GAIN.offset);
        parse::write_i16(-10, p, page0::DETECTOR_OFFSET.offset);
        parse::write_f32(1.85, p, page0::DETECTOR_GAIN_ODD.offset);
        parse::write_i16(5, p, page0::DETECTOR_OFFSET_ODD.offset);
        parse::write_u8(format, p, page0::FORMAT.offset);
    }

    // page 1: wavelength calibration and thermal compensation
    {
        let p = &mut pages[1];
        for (field, coeff) in page1::WAVECAL_COEFFS
            .iter()
            .zip([780.24f32, 0.102, -1.1e-5, 2.0e-9])
        {
            parse::write_f32(coeff, p, field.offset);
        }
        for (field, coeff) in page1::DEG_C_TO_DAC_COEFFS.iter().zip([1000.0f32, 35.5, 0.25]) {
            parse::write_f32(coeff, p, field.offset);
        }
        parse::write_i16(10, p, page1::DETECTOR_TEMP_MAX.offset);
        parse::write_i16(-15, p, page1::DETECTOR_TEMP_MIN.offset);
        for (field, coeff) in page1::ADC_TO_DEG_C_COEFFS.iter().zip([66.0f32, 0.015, 0.0]) {
            parse::write_f32(coeff, p, field.offset);
        }
        parse::write_i16(10000, p, page1::THERMISTOR_RESISTANCE_AT_298K.offset);
        parse::write_i16(3977, p, page1::THERMISTOR_BETA.offset);
        parse::write_string(
            "2024-06-01",
            p,
            page1::CALIBRATION_DATE.offset,
            page1::CALIBRATION_DATE.len,
        );
        parse::write_string("MZ", p, page1::CALIBRATION_BY.offset, page1::CALIBRATION_BY.len);
    }

    // page 2: detector geometry
    {
        let p = &mut pages[2];
        parse::write_string(
            "S11511-1106",
            p,
            page2::DETECTOR_NAME.offset,
            page2::DETECTOR_NAME.len,
        );
        parse::write_u16(1024, p, page2::ACTIVE_PIXELS_HORIZ.offset);
        parse::write_u16(1, p, page2::ACTIVE_PIXELS_VERT.offset);
        if format >= 8 {
            parse::write_f32(1.5e-12, p, page2::WAVECAL_COEFF_4.offset);
        } else {
            parse::write_u16(1, p, page2::MIN_INTEGRATION_LEGACY.offset);
            parse::write_u16(60000, p, page2::MAX_INTEGRATION_LEGACY.offset);
        }
        parse::write_u16(1044, p, page2::ACTUAL_PIXELS_HORIZ.offset);
        parse::write_u16(10, p, page2::ROI_HORIZ_START.offset);
        parse::write_u16(1014, p, page2::ROI_HORIZ_END.offset);
        for (field, coeff) in page2::LINEARITY_COEFFS.iter().zip([1.0f32, 0.0, 0.0, 0.0, 0.0]) {
            parse::write_f32(coeff, p, field.offset);
        }
    }

    // page 3: laser power calibration, wide integration limits
    {
        let p = &mut pages[3];
        for (field, coeff) in page3::LASER_POWER_COEFFS.iter().zip([0.1f32, 0.05, 0.0, 0.0]) {
            parse::write_f32(coeff, p, field.offset);
        }
        parse::write_f32(450.0, p, page3::MAX_LASER_POWER_MW.offset);
        parse::write_f32(5.0, p, page3::MIN_LASER_POWER_MW.offset);
        parse::write_f32(785.3, p, page3::EXCITATION_NM.offset);
        parse::write_u32(8, p, page3::MIN_INTEGRATION_TIME_MS.offset);
        parse::write_u32(1_000_000, p, page3::MAX_INTEGRATION_TIME_MS.offset);
        parse::write_f32(0.85, p, page3::AVG_RESOLUTION.offset);
    }

    // page 4: free-form user data
    parse::write_string("customer notes", &mut pages[4], 0, EEPROM_PAGE_SIZE);

    // page 5: bad pixels (one duplicate), product config, subformat
    {
        let p = &mut pages[5];
        parse::write_i16(100, p, page5::bad_pixel(0).offset);
        parse::write_i16(101, p, page5::bad_pixel(1).offset);
        parse::write_i16(100, p, page5::bad_pixel(2).offset);
        for i in 3..page5::MAX_BAD_PIXELS {
            parse::write_i16(-1, p, page5::bad_pixel(i).offset);
        }
        parse::write_string(
            "OEM-785-XS",
            p,
            page5::PRODUCT_CONFIGURATION.offset,
            page5::PRODUCT_CONFIGURATION.len,
        );
        if format >= 8 {
            parse::write_u8(1, p, page5::SUBFORMAT.offset); // Raman intensity
        }
    }

    // page 6: Raman intensity calibration
    {
        let p = &mut pages[6];
        parse::write_u8(2, p, page6::INTENSITY_CORRECTION_ORDER.offset);
        for (i, coeff) in [100.0f32, -0.01, 1.0e-5].iter().enumerate() {
            parse::write_f32(*coeff, p, page6::intensity_correction_coeff(i).offset);
        }
    }

    pages
}
