//! The versioned binary calibration record persisted on every unit.
//!
//! Eight 64-byte pages cover identity, calibration polynomials and
//! capability flags. Byte meanings are selected by the `format` revision in
//! page 0 and, for the overlapping Raman-intensity/user-data range, by the
//! `subformat` selector in page 5; the decoder walks the per-revision field
//! tables in [`crate::layout`].
//!
//! Decoding is deliberately lenient: malformed-but-present data falls back
//! to the codec's zero/empty defaults rather than failing the parse. Only
//! missing pages fail.

use crate::commands::{EEPROM_PAGES, EEPROM_PAGE_SIZE};
use crate::layout::{page0, page1, page2, page3, page5, page6, Field, StrField};
use crate::parse;
use enumset::EnumSet;
use log::{debug, error};
use std::collections::BTreeSet;
use wasatch_types::{Feature, Subformat};

/// The factory writes an identity polynomial when no laser power
/// calibration has been performed.
const LASER_POWER_COEFFS_DEFAULT: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

#[derive(Clone, Debug, Default)]
pub struct Eeprom {
    pub format: u8,

    pub model: String,
    pub serial_number: String,
    pub baud_rate: u32,
    pub has_cooling: bool,
    pub has_battery: bool,
    pub has_laser: bool,
    pub excitation_nm: f32,
    pub slit_size_um: u16,

    pub startup_integration_time_ms: u16,
    pub startup_detector_temperature_deg_c: i16,
    pub startup_triggering_mode: u8,
    pub detector_gain: f32,
    pub detector_offset: i16,
    pub detector_gain_odd: f32,
    pub detector_offset_odd: i16,

    pub wavecal_coeffs: [f32; 5],
    pub deg_c_to_dac_coeffs: [f32; 3],
    pub detector_temp_max: i16,
    pub detector_temp_min: i16,
    pub adc_to_deg_c_coeffs: [f32; 3],
    pub thermistor_resistance_at_298k: i16,
    pub thermistor_beta: i16,
    pub calibration_date: String,
    pub calibration_by: String,

    pub detector_name: String,
    pub active_pixels_horiz: u16,
    pub active_pixels_vert: u16,
    pub min_integration_time_ms: u32,
    pub max_integration_time_ms: u32,
    pub actual_pixels_horiz: u16,
    pub roi_horiz_start: u16,
    pub roi_horiz_end: u16,
    pub roi_vert_region_start: [u16; 3],
    pub roi_vert_region_end: [u16; 3],
    pub linearity_coeffs: [f32; 5],

    pub laser_power_coeffs: [f32; 4],
    pub max_laser_power_mw: f32,
    pub min_laser_power_mw: f32,

    pub user_data: Vec<u8>,
    pub user_text: String,

    pub bad_pixels: BTreeSet<i16>,
    pub product_configuration: String,

    pub intensity_correction_order: u8,
    pub intensity_correction_coeffs: Vec<f32>,

    pub avg_resolution: f32,

    pub subformat: Subformat,
    pub feature_mask: EnumSet<Feature>,

    pages: Vec<Vec<u8>>,
    stringified: Vec<(&'static str, String)>,
}

impl Eeprom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the eight raw pages into typed fields. Returns false only
    /// when pages are missing; short or garbage page contents decode to
    /// field defaults.
    pub fn parse(&mut self, pages: &[Vec<u8>]) -> bool {
        if pages.len() < EEPROM_PAGES {
            error!(
                "EEPROM parse: expected {} pages, received {}",
                EEPROM_PAGES,
                pages.len()
            );
            return false;
        }
        self.pages = pages[..EEPROM_PAGES].to_vec();

        self.format = parse::to_u8(&self.pages[0], page0::FORMAT.offset);
        debug!("EEPROM format {}", self.format);

        self.decode_identity();
        self.decode_wavecal_and_thermal();
        self.decode_detector_geometry();
        self.decode_laser_power();
        self.decode_user_data();
        self.decode_bad_pixels_and_config();
        self.decode_intensity_correction();
        self.decode_subformat();
        self.decode_feature_mask();

        self.clamp_startup_temperature();
        self.stringify();

        true
    }

    fn decode_identity(&mut self) {
        self.model = self.str_at(page0::MODEL);
        self.serial_number = self.str_at(page0::SERIAL_NUMBER);
        self.baud_rate = self.u32_at(page0::BAUD_RATE);
        self.has_cooling = self.bool_at(page0::HAS_COOLING);
        self.has_battery = self.bool_at(page0::HAS_BATTERY);
        self.has_laser = self.bool_at(page0::HAS_LASER);

        // The integer reading stood alone until format 4 grew the float
        // field on page 3; that one wins wherever it exists.
        self.excitation_nm = f32::from(self.u16_at(page0::EXCITATION_NM_LEGACY));
        if page3::EXCITATION_NM.defined_for(self.format) {
            self.excitation_nm = self.f32_at(page3::EXCITATION_NM);
        }

        self.slit_size_um = self.u16_at(page0::SLIT_SIZE_UM);
        self.startup_integration_time_ms = self.u16_at(page0::STARTUP_INTEGRATION_TIME_MS);
        self.startup_detector_temperature_deg_c = self.i16_at(page0::STARTUP_DETECTOR_TEMP_DEG_C);
        self.startup_triggering_mode = self.u8_at(page0::STARTUP_TRIGGERING_MODE);
        self.detector_gain = self.f32_at(page0::DETECTOR_GAIN);
        self.detector_offset = self.i16_at(page0::DETECTOR_OFFSET);
        self.detector_gain_odd = self.f32_at(page0::DETECTOR_GAIN_ODD);
        self.detector_offset_odd = self.i16_at(page0::DETECTOR_OFFSET_ODD);
    }

    fn decode_wavecal_and_thermal(&mut self) {
        for (i, field) in page1::WAVECAL_COEFFS.iter().enumerate() {
            self.wavecal_coeffs[i] = self.f32_at(*field);
        }
        self.wavecal_coeffs[4] = self.f32_at(page2::WAVECAL_COEFF_4);

        for (i, field) in page1::DEG_C_TO_DAC_COEFFS.iter().enumerate() {
            self.deg_c_to_dac_coeffs[i] = self.f32_at(*field);
        }
        self.detector_temp_max = self.i16_at(page1::DETECTOR_TEMP_MAX);
        self.detector_temp_min = self.i16_at(page1::DETECTOR_TEMP_MIN);
        for (i, field) in page1::ADC_TO_DEG_C_COEFFS.iter().enumerate() {
            self.adc_to_deg_c_coeffs[i] = self.f32_at(*field);
        }
        self.thermistor_resistance_at_298k = self.i16_at(page1::THERMISTOR_RESISTANCE_AT_298K);
        self.thermistor_beta = self.i16_at(page1::THERMISTOR_BETA);
        self.calibration_date = self.str_at(page1::CALIBRATION_DATE);
        self.calibration_by = self.str_at(page1::CALIBRATION_BY);
    }

    fn decode_detector_geometry(&mut self) {
        self.detector_name = self.str_at(page2::DETECTOR_NAME);
        self.active_pixels_horiz = self.u16_at(page2::ACTIVE_PIXELS_HORIZ);
        self.active_pixels_vert = self.u16_at(page2::ACTIVE_PIXELS_VERT);

        self.min_integration_time_ms = u32::from(self.u16_at(page2::MIN_INTEGRATION_LEGACY));
        self.max_integration_time_ms = u32::from(self.u16_at(page2::MAX_INTEGRATION_LEGACY));
        if page3::MIN_INTEGRATION_TIME_MS.defined_for(self.format) {
            self.min_integration_time_ms = self.u32_at(page3::MIN_INTEGRATION_TIME_MS);
            self.max_integration_time_ms = self.u32_at(page3::MAX_INTEGRATION_TIME_MS);
        }

        self.actual_pixels_horiz = self.u16_at(page2::ACTUAL_PIXELS_HORIZ);
        self.roi_horiz_start = self.u16_at(page2::ROI_HORIZ_START);
        self.roi_horiz_end = self.u16_at(page2::ROI_HORIZ_END);
        for i in 0..3 {
            self.roi_vert_region_start[i] = self.u16_at(page2::ROI_VERT_REGION_START[i]);
            self.roi_vert_region_end[i] = self.u16_at(page2::ROI_VERT_REGION_END[i]);
        }
        for (i, field) in page2::LINEARITY_COEFFS.iter().enumerate() {
            self.linearity_coeffs[i] = self.f32_at(*field);
        }
    }

    fn decode_laser_power(&mut self) {
        for (i, field) in page3::LASER_POWER_COEFFS.iter().enumerate() {
            self.laser_power_coeffs[i] = self.f32_at(*field);
        }
        self.max_laser_power_mw = self.f32_at(page3::MAX_LASER_POWER_MW);
        self.min_laser_power_mw = self.f32_at(page3::MIN_LASER_POWER_MW);
        self.avg_resolution = self.f32_at(page3::AVG_RESOLUTION);
    }

    fn decode_user_data(&mut self) {
        self.user_data = self.pages[4].clone();
        self.user_text = parse::to_string(&self.pages[4], 0, EEPROM_PAGE_SIZE);
    }

    fn decode_bad_pixels_and_config(&mut self) {
        self.bad_pixels.clear();
        for i in 0..page5::MAX_BAD_PIXELS {
            let pixel = self.i16_at(page5::bad_pixel(i));
            // negative entries are "no bad pixel here" sentinels
            if pixel >= 0 {
                self.bad_pixels.insert(pixel);
            }
        }
        self.product_configuration = self.str_at(page5::PRODUCT_CONFIGURATION);
    }

    fn decode_intensity_correction(&mut self) {
        self.intensity_correction_order = self.u8_at(page6::INTENSITY_CORRECTION_ORDER);
        self.intensity_correction_coeffs.clear();
        if !page6::INTENSITY_CORRECTION_ORDER.defined_for(self.format) {
            return;
        }

        let mut num_coeffs = usize::from(self.intensity_correction_order) + 1;
        if num_coeffs > page6::MAX_INTENSITY_CORRECTION_COEFFS {
            num_coeffs = 0;
        }
        for i in 0..num_coeffs {
            self.intensity_correction_coeffs
                .push(self.f32_at(page6::intensity_correction_coeff(i)));
        }
    }

    fn decode_subformat(&mut self) {
        if page5::SUBFORMAT.defined_for(self.format) {
            self.subformat = Subformat::from(self.u8_at(page5::SUBFORMAT));
            if self.subformat == Subformat::UserData {
                // mutually exclusive with the Raman intensity calibration
                self.intensity_correction_order = 0;
                self.intensity_correction_coeffs.clear();
            }
        } else if self.format >= 6 {
            self.subformat = Subformat::RamanIntensityCalibration;
        } else {
            self.subformat = Subformat::UserData;
        }
    }

    fn decode_feature_mask(&mut self) {
        self.feature_mask = if page0::FEATURE_MASK.defined_for(self.format) {
            EnumSet::from_repr_truncated(self.u16_at(page0::FEATURE_MASK))
        } else {
            EnumSet::empty()
        };
    }

    fn clamp_startup_temperature(&mut self) {
        if self.detector_temp_min > self.detector_temp_max {
            debug!(
                "not clamping startup temperature: inverted detector limits [{}, {}]",
                self.detector_temp_min, self.detector_temp_max
            );
            return;
        }
        self.startup_detector_temperature_deg_c = self
            .startup_detector_temperature_deg_c
            .clamp(self.detector_temp_min, self.detector_temp_max);
    }

    ////////////////////////////////////////////////////////////////////////
    // Laser power calibration
    ////////////////////////////////////////////////////////////////////////

    /// Whether the unit carries a usable laser power calibration, as
    /// opposed to the factory identity polynomial or garbage bytes.
    pub fn has_laser_power_calibration(&self) -> bool {
        if self.max_laser_power_mw <= 0.0 {
            return false;
        }
        if self.laser_power_coeffs.iter().any(|c| c.is_nan()) {
            return false;
        }
        if self.laser_power_coeffs == LASER_POWER_COEFFS_DEFAULT {
            return false;
        }
        let first = self.laser_power_coeffs[0];
        if self.laser_power_coeffs.iter().all(|&c| c == first) {
            return false;
        }
        true
    }

    /// Evaluates the calibrated cubic mapping laser output power in mW to a
    /// modulation percentage; 0 when no valid calibration is present.
    pub fn laser_power_to_percent(&self, mw: f32) -> f32 {
        if !self.has_laser_power_calibration() {
            return 0.0;
        }
        let c = &self.laser_power_coeffs;
        c[0] + c[1] * mw + c[2] * mw * mw + c[3] * mw * mw * mw
    }

    ////////////////////////////////////////////////////////////////////////
    // Generic access
    ////////////////////////////////////////////////////////////////////////

    /// Every field as an ordered name → formatted-value table. A derived
    /// view rebuilt on each parse; the typed fields are the source of
    /// truth.
    pub fn stringified(&self) -> &[(&'static str, String)] {
        &self.stringified
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.stringified
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Raw page bytes as read from the device.
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        self.pages.get(index).map(Vec::as_slice)
    }

    fn stringify(&mut self) {
        fn floats(values: &[f32]) -> String {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut table: Vec<(&'static str, String)> = Vec::with_capacity(48);
        table.push(("format", self.format.to_string()));
        table.push(("model", self.model.clone()));
        table.push(("serial_number", self.serial_number.clone()));
        table.push(("baud_rate", self.baud_rate.to_string()));
        table.push(("has_cooling", self.has_cooling.to_string()));
        table.push(("has_battery", self.has_battery.to_string()));
        table.push(("has_laser", self.has_laser.to_string()));
        table.push(("excitation_nm", self.excitation_nm.to_string()));
        table.push(("slit_size_um", self.slit_size_um.to_string()));
        table.push((
            "startup_integration_time_ms",
            self.startup_integration_time_ms.to_string(),
        ));
        table.push((
            "startup_detector_temperature_deg_c",
            self.startup_detector_temperature_deg_c.to_string(),
        ));
        table.push((
            "startup_triggering_mode",
            self.startup_triggering_mode.to_string(),
        ));
        table.push(("detector_gain", self.detector_gain.to_string()));
        table.push(("detector_offset", self.detector_offset.to_string()));
        table.push(("detector_gain_odd", self.detector_gain_odd.to_string()));
        table.push(("detector_offset_odd", self.detector_offset_odd.to_string()));
        table.push(("wavecal_coeffs", floats(&self.wavecal_coeffs)));
        table.push(("deg_c_to_dac_coeffs", floats(&self.deg_c_to_dac_coeffs)));
        table.push(("detector_temp_max", self.detector_temp_max.to_string()));
        table.push(("detector_temp_min", self.detector_temp_min.to_string()));
        table.push(("adc_to_deg_c_coeffs", floats(&self.adc_to_deg_c_coeffs)));
        table.push((
            "thermistor_resistance_at_298k",
            self.thermistor_resistance_at_298k.to_string(),
        ));
        table.push(("thermistor_beta", self.thermistor_beta.to_string()));
        table.push(("calibration_date", self.calibration_date.clone()));
        table.push(("calibration_by", self.calibration_by.clone()));
        table.push(("detector_name", self.detector_name.clone()));
        table.push((
            "active_pixels_horiz",
            self.active_pixels_horiz.to_string(),
        ));
        table.push(("active_pixels_vert", self.active_pixels_vert.to_string()));
        table.push((
            "min_integration_time_ms",
            self.min_integration_time_ms.to_string(),
        ));
        table.push((
            "max_integration_time_ms",
            self.max_integration_time_ms.to_string(),
        ));
        table.push((
            "actual_pixels_horiz",
            self.actual_pixels_horiz.to_string(),
        ));
        table.push(("roi_horiz_start", self.roi_horiz_start.to_string()));
        table.push(("roi_horiz_end", self.roi_horiz_end.to_string()));
        for i in 0..3 {
            table.push((
                ROI_VERT_START_NAMES[i],
                self.roi_vert_region_start[i].to_string(),
            ));
            table.push((
                ROI_VERT_END_NAMES[i],
                self.roi_vert_region_end[i].to_string(),
            ));
        }
        table.push(("linearity_coeffs", floats(&self.linearity_coeffs)));
        table.push(("laser_power_coeffs", floats(&self.laser_power_coeffs)));
        table.push(("max_laser_power_mw", self.max_laser_power_mw.to_string()));
        table.push(("min_laser_power_mw", self.min_laser_power_mw.to_string()));
        table.push(("user_text", self.user_text.clone()));
        table.push((
            "bad_pixels",
            self.bad_pixels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ));
        table.push((
            "product_configuration",
            self.product_configuration.clone(),
        ));
        table.push((
            "intensity_correction_order",
            self.intensity_correction_order.to_string(),
        ));
        table.push((
            "intensity_correction_coeffs",
            floats(&self.intensity_correction_coeffs),
        ));
        table.push(("avg_resolution", self.avg_resolution.to_string()));
        table.push(("subformat", self.subformat.to_string()));
        table.push((
            "feature_mask",
            self.feature_mask
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ));

        self.stringified = table;
    }

    ////////////////////////////////////////////////////////////////////////
    // Field readers (format-gated via the layout tables)
    ////////////////////////////////////////////////////////////////////////

    fn bool_at(&self, field: Field) -> bool {
        field.defined_for(self.format) && parse::to_bool(&self.pages[field.page], field.offset)
    }

    fn u8_at(&self, field: Field) -> u8 {
        if !field.defined_for(self.format) {
            return 0;
        }
        parse::to_u8(&self.pages[field.page], field.offset)
    }

    fn u16_at(&self, field: Field) -> u16 {
        if !field.defined_for(self.format) {
            return 0;
        }
        parse::to_u16(&self.pages[field.page], field.offset)
    }

    fn i16_at(&self, field: Field) -> i16 {
        if !field.defined_for(self.format) {
            return 0;
        }
        parse::to_i16(&self.pages[field.page], field.offset)
    }

    fn u32_at(&self, field: Field) -> u32 {
        if !field.defined_for(self.format) {
            return 0;
        }
        parse::to_u32(&self.pages[field.page], field.offset)
    }

    fn f32_at(&self, field: Field) -> f32 {
        if !field.defined_for(self.format) {
            return 0.0;
        }
        parse::to_f32(&self.pages[field.page], field.offset)
    }

    fn str_at(&self, field: StrField) -> String {
        if !field.defined_for(self.format) {
            return String::new();
        }
        parse::to_string(&self.pages[field.page], field.offset, field.len)
    }
}

const ROI_VERT_START_NAMES: [&str; 3] = [
    "roi_vert_region_0_start",
    "roi_vert_region_1_start",
    "roi_vert_region_2_start",
];
const ROI_VERT_END_NAMES: [&str; 3] = [
    "roi_vert_region_0_end",
    "roi_vert_region_1_end",
    "roi_vert_region_2_end",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_pages;

    fn parsed(format: u8) -> Eeprom {
        let mut eeprom = Eeprom::new();
        assert!(eeprom.parse(&fake_pages(format)));
        eeprom
    }

    #[test]
    fn parse_fails_on_missing_pages() {
        let mut eeprom = Eeprom::new();
        assert!(!eeprom.parse(&fake_pages(7)[..5]));
    }

    #[test]
    fn identity_fields_decode_on_every_format() {
        for format in 0..=9 {
            let eeprom = parsed(format);
            assert_eq!(eeprom.format, format);
            assert_eq!(eeprom.model, "WP-785");
            assert_eq!(eeprom.serial_number, "WP-00693");
            assert_eq!(eeprom.baud_rate, 115200);
            assert!(eeprom.has_cooling);
            assert!(!eeprom.has_battery);
            assert!(eeprom.has_laser);
            assert_eq!(eeprom.active_pixels_horiz, 1024);
            assert_eq!(eeprom.detector_name, "S11511-1106");
        }
    }

    #[test]
    fn legacy_format_leaves_gated_fields_at_defaults() {
        let eeprom = parsed(3);
        assert_eq!(eeprom.excitation_nm, 785.0); // integer reading
        assert_eq!(eeprom.min_integration_time_ms, 1); // 16-bit reading
        assert_eq!(eeprom.max_integration_time_ms, 60000);
        assert_eq!(eeprom.avg_resolution, 0.0);
        assert_eq!(eeprom.wavecal_coeffs[4], 0.0);
        assert!(eeprom.intensity_correction_coeffs.is_empty());
        assert_eq!(eeprom.intensity_correction_order, 0);
        assert_eq!(eeprom.subformat, Subformat::UserData);
        assert!(eeprom.feature_mask.is_empty());
        assert!(eeprom.product_configuration.is_empty());
    }

    #[test]
    fn format_4_reads_excitation_as_float() {
        assert_eq!(parsed(3).excitation_nm, 785.0);
        assert_eq!(parsed(4).excitation_nm, 785.3);
    }

    #[test]
    fn format_5_widens_integration_limits_and_adds_config() {
        let eeprom = parsed(5);
        assert_eq!(eeprom.min_integration_time_ms, 8);
        assert_eq!(eeprom.max_integration_time_ms, 1_000_000);
        assert_eq!(eeprom.product_configuration, "OEM-785-XS");
        // still inferred as user data below format 6
        assert_eq!(eeprom.subformat, Subformat::UserData);
    }

    #[test]
    fn format_6_infers_raman_intensity_subformat() {
        let eeprom = parsed(6);
        assert_eq!(eeprom.subformat, Subformat::RamanIntensityCalibration);
        assert_eq!(eeprom.intensity_correction_order, 2);
        assert_eq!(eeprom.intensity_correction_coeffs.len(), 3);
        assert_eq!(eeprom.intensity_correction_coeffs[0], 100.0);
        assert_eq!(eeprom.avg_resolution, 0.0); // format 7 field
    }

    #[test]
    fn format_7_adds_average_resolution() {
        assert_eq!(parsed(7).avg_resolution, 0.85);
    }

    #[test]
    fn intensity_correction_order_above_seven_clamps_to_no_coeffs() {
        let mut pages = fake_pages(6);
        pages[6][0] = 9;
        let mut eeprom = Eeprom::new();
        assert!(eeprom.parse(&pages));
        assert_eq!(eeprom.intensity_correction_order, 9);
        assert!(eeprom.intensity_correction_coeffs.is_empty());
    }

    #[test]
    fn format_8_reads_fifth_wavecal_coeff_and_explicit_subformat() {
        let eeprom = parsed(8);
        assert_eq!(eeprom.wavecal_coeffs[4], 1.5e-12);
        assert_eq!(eeprom.subformat, Subformat::RamanIntensityCalibration);
        assert_eq!(eeprom.intensity_correction_coeffs.len(), 3);
    }

    #[test]
    fn format_8_user_data_subformat_discards_intensity_correction() {
        let mut pages = fake_pages(8);
        pages[5][63] = 0; // user data
        let mut eeprom = Eeprom::new();
        assert!(eeprom.parse(&pages));
        assert_eq!(eeprom.subformat, Subformat::UserData);
        assert_eq!(eeprom.intensity_correction_order, 0);
        assert!(eeprom.intensity_correction_coeffs.is_empty());
    }

    #[test]
    fn format_9_decodes_feature_word_from_recycled_bytes() {
        let eeprom = parsed(9);
        assert!(eeprom.feature_mask.contains(Feature::InvertXAxis));
        assert!(eeprom.feature_mask.contains(Feature::Bin2x2));
        assert!(!eeprom.feature_mask.contains(Feature::Gen15));
        // excitation must come from the float field, not the feature word
        assert_eq!(eeprom.excitation_nm, 785.3);
    }

    #[test]
    fn startup_temperature_is_clamped_into_detector_limits() {
        // the builder writes 15 degC against limits [-15, 10]
        let eeprom = parsed(7);
        assert_eq!(eeprom.detector_temp_min, -15);
        assert_eq!(eeprom.detector_temp_max, 10);
        assert_eq!(eeprom.startup_detector_temperature_deg_c, 10);
    }

    #[test]
    fn bad_pixels_exclude_negative_sentinels_and_dedup() {
        let eeprom = parsed(7);
        assert_eq!(
            eeprom.bad_pixels.iter().copied().collect::<Vec<_>>(),
            vec![100, 101]
        );
    }

    #[test]
    fn user_data_retains_page_and_text_projection() {
        let eeprom = parsed(7);
        assert_eq!(eeprom.user_data.len(), EEPROM_PAGE_SIZE);
        assert_eq!(eeprom.user_text, "customer notes");
    }

    #[test]
    fn raw_pages_are_accessible_by_index() {
        let eeprom = parsed(7);
        assert_eq!(eeprom.page(0).unwrap().len(), EEPROM_PAGE_SIZE);
        assert_eq!(eeprom.page(0).unwrap()[63], 7);
        assert!(eeprom.page(8).is_none());
    }

    #[test]
    fn stringified_table_exposes_fields_by_name() {
        let eeprom = parsed(7);
        assert_eq!(eeprom.field_value("model"), Some("WP-785"));
        assert_eq!(eeprom.field_value("serial_number"), Some("WP-00693"));
        assert_eq!(eeprom.field_value("bad_pixels"), Some("100, 101"));
        assert_eq!(eeprom.field_value("no_such_field"), None);
    }

    #[test]
    fn stringified_table_is_rebuilt_not_appended() {
        let mut eeprom = Eeprom::new();
        let pages = fake_pages(7);
        assert!(eeprom.parse(&pages));
        let count = eeprom.stringified().len();
        assert!(eeprom.parse(&pages));
        assert_eq!(eeprom.stringified().len(), count);
    }

    #[test]
    fn laser_power_calibration_validity() {
        let mut eeprom = parsed(7);

        // the builder writes a representative calibrated set
        assert_eq!(eeprom.laser_power_coeffs, [0.1, 0.05, 0.0, 0.0]);
        assert!(eeprom.has_laser_power_calibration());

        eeprom.laser_power_coeffs = [1.0, 0.0, 0.0, 0.0]; // factory default
        assert!(!eeprom.has_laser_power_calibration());

        eeprom.laser_power_coeffs = [2.0, 2.0, 2.0, 2.0]; // all-constant
        assert!(!eeprom.has_laser_power_calibration());

        eeprom.laser_power_coeffs = [0.1, f32::NAN, 0.0, 0.0];
        assert!(!eeprom.has_laser_power_calibration());

        eeprom.laser_power_coeffs = [0.1, 0.05, 0.0, 0.0];
        eeprom.max_laser_power_mw = 0.0;
        assert!(!eeprom.has_laser_power_calibration());
    }

    #[test]
    fn laser_power_to_percent_evaluates_the_cubic() {
        let mut eeprom = parsed(7);
        eeprom.laser_power_coeffs = [0.1, 0.05, 0.0, 0.0];
        assert!((eeprom.laser_power_to_percent(100.0) - 5.1).abs() < 1e-5);

        eeprom.laser_power_coeffs = [1.0, 0.0, 0.0, 0.0];
        assert_eq!(eeprom.laser_power_to_percent(100.0), 0.0);
    }
}
