//! One open, claimed and calibrated spectrometer.

use crate::commands::{
    Command, SecondTierCommand, EEPROM_PAGES, EEPROM_PAGE_SIZE, ENDPOINT_SPECTRUM,
    MIN_ARM_PAYLOAD, PID_ARM,
};
use crate::device::SpectrometerUsb;
use crate::eeprom::Eeprom;
use crate::error::CommandError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, info};
use std::time::Duration;
use wasatch_types::Feature;

const MAX_UINT24: u32 = 1 << 24;

/// Base acquisition timeout; the integration-dependent share comes on top.
const ACQUIRE_TIMEOUT_FLOOR_MS: u64 = 2000;

/// The TEC setpoint DAC is 12 bits wide.
const DAC_MAX: f32 = 0xfff as f32;

pub struct Spectrometer<T: SpectrometerUsb> {
    usb: T,
    pub eeprom: Eeprom,

    pixels: usize,
    wavelengths: Vec<f64>,
    wavenumbers: Vec<f64>,

    integration_time_ms: u32,
    laser_enabled: bool,
    tec_setpoint_set: bool,

    /// Per-call control-transfer timeout; acquisition computes its own.
    timeout: Duration,
}

impl<T: SpectrometerUsb> Spectrometer<T> {
    /// Reads and parses the calibration record, then derives the
    /// wavelength and wavenumber axes. Construction fails soft: a unit
    /// whose record cannot be read yields a session with zero pixels,
    /// which is non-functional but safe to hold and close.
    pub fn new(usb: T) -> Self {
        let mut spectrometer = Self {
            usb,
            eeprom: Eeprom::new(),
            pixels: 0,
            wavelengths: Vec::new(),
            wavenumbers: Vec::new(),
            integration_time_ms: 0,
            laser_enabled: false,
            tec_setpoint_set: false,
            timeout: Duration::from_secs(1),
        };

        if let Err(e) = spectrometer.read_eeprom() {
            error!("unable to read calibration record, session is degraded: {e}");
        }

        spectrometer.pixels = usize::from(spectrometer.eeprom.active_pixels_horiz);
        spectrometer.expand_axes();

        info!(
            "instantiated {} {} ({} pixels)",
            spectrometer.eeprom.model, spectrometer.eeprom.serial_number, spectrometer.pixels
        );

        spectrometer
    }

    fn read_eeprom(&mut self) -> Result<(), CommandError> {
        let mut pages = Vec::with_capacity(EEPROM_PAGES);
        for page in 0..EEPROM_PAGES {
            debug!("reading EEPROM page {page}");
            let buf = self.get_cmd(
                Command::SecondTier(SecondTierCommand::GetEepromPage),
                page as u16,
                EEPROM_PAGE_SIZE,
            )?;
            pages.push(buf);
        }

        if !self.eeprom.parse(&pages) {
            return Err(CommandError::MalformedResponse(
                "unable to parse calibration record".into(),
            ));
        }
        Ok(())
    }

    fn expand_axes(&mut self) {
        let c = self.eeprom.wavecal_coeffs.map(f64::from);
        self.wavelengths = (0..self.pixels)
            .map(|i| {
                let x = i as f64;
                c[0] + c[1] * x + c[2] * x * x + c[3] * x * x * x + c[4] * x * x * x * x
            })
            .collect();

        if self.eeprom.excitation_nm > 0.0 {
            const NM_TO_CM: f64 = 1.0 / 1e7;
            let laser_cm = 1.0 / (f64::from(self.eeprom.excitation_nm) * NM_TO_CM);
            self.wavenumbers = self
                .wavelengths
                .iter()
                .map(|&nm| {
                    if nm != 0.0 {
                        laser_cm - 1.0 / (nm * NM_TO_CM)
                    } else {
                        0.0
                    }
                })
                .collect();
        } else {
            self.wavenumbers = Vec::new();
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Accessors
    ////////////////////////////////////////////////////////////////////////

    pub fn pixels(&self) -> usize {
        self.pixels
    }

    pub fn model(&self) -> &str {
        &self.eeprom.model
    }

    pub fn serial_number(&self) -> &str {
        &self.eeprom.serial_number
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Empty when the unit has no excitation wavelength configured.
    pub fn wavenumbers(&self) -> &[f64] {
        &self.wavenumbers
    }

    pub fn integration_time_ms(&self) -> u32 {
        self.integration_time_ms
    }

    pub fn laser_enabled(&self) -> bool {
        self.laser_enabled
    }

    ////////////////////////////////////////////////////////////////////////
    // Opcodes
    ////////////////////////////////////////////////////////////////////////

    /// Clamps into the controller's 24-bit range. The hardware family
    /// returns no verifiable status for this opcode, so the clamped value
    /// is recorded locally whether or not the transfer went through.
    pub fn set_integration_time_ms(&mut self, ms: u32) -> Result<(), CommandError> {
        let ms = ms.clamp(1, MAX_UINT24 - 1);

        let lsw = (ms & 0xffff) as u16;
        let msw = ((ms >> 16) & 0xff) as u16;

        let result = self.send_cmd(Command::SetIntegrationTime, lsw, msw, &[]);
        self.integration_time_ms = ms;
        debug!("integration_time_ms -> {ms}");

        result.map_err(CommandError::from)
    }

    /// Same assume-success contract as integration time.
    pub fn set_laser_enable(&mut self, flag: bool) -> Result<(), CommandError> {
        let result = self.send_cmd(Command::SetLaserEnable, u16::from(flag), 0, &[]);
        self.laser_enabled = flag;
        debug!("laser_enabled -> {flag}");

        result.map_err(CommandError::from)
    }

    pub fn set_detector_gain(&mut self, gain: f32) -> Result<(), CommandError> {
        let raw = gain_to_fixed_point(gain);
        self.send_cmd(Command::SetDetectorGain, raw, 0, &[])?;
        debug!("detector gain -> {gain} ({raw:#06x})");
        Ok(())
    }

    pub fn set_detector_gain_odd(&mut self, gain: f32) -> Result<(), CommandError> {
        let raw = gain_to_fixed_point(gain);
        self.send_cmd(Command::SetDetectorGainOdd, raw, 0, &[])?;
        debug!("detector gain (odd) -> {gain} ({raw:#06x})");
        Ok(())
    }

    pub fn set_detector_offset(&mut self, offset: i16) -> Result<(), CommandError> {
        self.send_cmd(Command::SetDetectorOffset, offset as u16, 0, &[])?;
        debug!("detector offset -> {offset}");
        Ok(())
    }

    pub fn set_detector_offset_odd(&mut self, offset: i16) -> Result<(), CommandError> {
        self.send_cmd(Command::SetDetectorOffsetOdd, offset as u16, 0, &[])?;
        debug!("detector offset (odd) -> {offset}");
        Ok(())
    }

    /// Applies the startup setpoint first if none has been sent, so the
    /// cooler never starts against an uninitialized DAC.
    pub fn set_detector_tec_enable(&mut self, flag: bool) -> Result<(), CommandError> {
        if !self.eeprom.has_cooling {
            return Err(CommandError::Unsupported("detector TEC"));
        }

        if flag && !self.tec_setpoint_set {
            let startup = self.eeprom.startup_detector_temperature_deg_c;
            self.set_detector_tec_setpoint_deg_c(startup)?;
        }

        self.send_cmd(Command::SetDetectorTecEnable, u16::from(flag), 0, &[])?;
        debug!("detector TEC -> {flag}");
        Ok(())
    }

    pub fn set_detector_tec_setpoint_deg_c(&mut self, deg_c: i16) -> Result<(), CommandError> {
        if !self.eeprom.has_cooling {
            return Err(CommandError::Unsupported("detector TEC"));
        }
        if deg_c < self.eeprom.detector_temp_min || deg_c > self.eeprom.detector_temp_max {
            return Err(CommandError::OutOfRange(
                "TEC setpoint outside detector limits",
            ));
        }

        let c = &self.eeprom.deg_c_to_dac_coeffs;
        let x = f32::from(deg_c);
        let dac = c[0] + c[1] * x + c[2] * x * x;
        let raw = dac.round().clamp(0.0, DAC_MAX) as u16;

        self.send_cmd(Command::SetDetectorTecSetpoint, raw, 0, &[])?;
        self.tec_setpoint_set = true;
        debug!("detector TEC setpoint -> {deg_c} degC (DAC {raw:#05x})");
        Ok(())
    }

    pub fn set_high_gain_mode(&mut self, flag: bool) -> Result<(), CommandError> {
        self.send_cmd(Command::SetHighGainMode, u16::from(flag), 0, &[])?;
        debug!("high gain mode -> {flag}");
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Acquisition
    ////////////////////////////////////////////////////////////////////////

    /// Triggers an acquisition and accumulates `pixels * 2` bytes from the
    /// bulk endpoint; firmware may spread the spectrum across several
    /// transfers. A transport fault, an empty read or an odd byte count
    /// aborts the loop and whatever decoded so far is returned, so callers
    /// must treat a short vector as a failed acquisition.
    pub fn get_spectrum(&mut self) -> Vec<f64> {
        debug!("sending ACQUIRE");
        if let Err(e) = self.send_cmd(Command::AcquireSpectrum, 0, 0, &[]) {
            error!("get_spectrum: unable to trigger acquisition: {e}");
            return Vec::new();
        }

        let bytes_expected = self.pixels * 2;

        // computed once per acquisition, not per read
        let timeout = Duration::from_millis(
            2 * u64::from(self.integration_time_ms) + ACQUIRE_TIMEOUT_FLOOR_MS,
        );

        let mut spectrum: Vec<f64> = Vec::with_capacity(self.pixels);
        let mut total_read = 0;

        while total_read < bytes_expected {
            let remaining = bytes_expected - total_read;
            debug!("attempting to read {remaining} bytes from endpoint {ENDPOINT_SPECTRUM:#04x}");

            let buf = match self.usb.bulk_read(ENDPOINT_SPECTRUM, remaining, timeout) {
                Ok(buf) => buf,
                Err(e) => {
                    error!("get_spectrum: bulk read failed, giving up: {e}");
                    break;
                }
            };

            if buf.is_empty() {
                error!("get_spectrum: empty bulk read, giving up");
                break;
            }
            if buf.len() % 2 != 0 {
                error!(
                    "get_spectrum: read an odd number of bytes ({}), giving up",
                    buf.len()
                );
                break;
            }

            for pair in buf.chunks_exact(2) {
                spectrum.push(f64::from(LittleEndian::read_u16(pair)));
            }

            total_read += buf.len();
            debug!("get_spectrum: {total_read} of {bytes_expected} bytes");
        }

        self.apply_feature_corrections(&mut spectrum);

        debug!("get_spectrum: returning {} pixels", spectrum.len());
        spectrum
    }

    /// Hardware-orientation corrections announced by the feature word:
    /// reverse red-to-blue units so spectra always read blue-to-red, and
    /// do the horizontal half of 2x2 binning (firmware bins vertically).
    fn apply_feature_corrections(&self, spectrum: &mut Vec<f64>) {
        if self.eeprom.feature_mask.contains(Feature::InvertXAxis) {
            spectrum.reverse();
        }
        if self.eeprom.feature_mask.contains(Feature::Bin2x2) {
            for i in 0..spectrum.len().saturating_sub(1) {
                spectrum[i] = (spectrum[i] + spectrum[i + 1]) / 2.0;
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Lifecycle
    ////////////////////////////////////////////////////////////////////////

    /// Releases the claimed interface. Only the owning registry calls
    /// this; the handle itself closes when the session is dropped.
    pub fn close(&mut self) {
        info!("closing {} {}", self.eeprom.model, self.eeprom.serial_number);
        if let Err(e) = self.usb.release() {
            debug!("close: release failed: {e}");
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Control messages
    ////////////////////////////////////////////////////////////////////////

    fn send_cmd(
        &mut self,
        command: Command,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), rusb::Error> {
        if self.requires_min_payload() && data.len() < MIN_ARM_PAYLOAD {
            let mut padded = data.to_vec();
            padded.resize(MIN_ARM_PAYLOAD, 0);
            return self
                .usb
                .control_write(command.request_code(), value, index, &padded, self.timeout);
        }
        self.usb
            .control_write(command.request_code(), value, index, data, self.timeout)
    }

    fn get_cmd(
        &mut self,
        command: Command,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>, rusb::Error> {
        let value = command.second_tier_value().unwrap_or(0);
        let request_length = if self.requires_min_payload() {
            length.max(MIN_ARM_PAYLOAD)
        } else {
            length
        };
        let mut buf =
            self.usb
                .control_read(command.request_code(), value, index, request_length, self.timeout)?;
        buf.truncate(length);
        Ok(buf)
    }

    fn requires_min_payload(&self) -> bool {
        self.usb.product_id() == PID_ARM
    }
}

/// Detector gain crosses the wire as 16-bit fixed point: integral part in
/// the high byte, fraction in 1/256 steps in the low byte.
fn gain_to_fixed_point(gain: f32) -> u16 {
    let gain = gain.clamp(0.0, 255.0 + 255.0 / 256.0);
    let msb = gain.trunc() as u16;
    let lsb = ((gain.fract() * 256.0).round() as u16).min(255);
    (msb << 8) | lsb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::PID_FX2;
    use crate::layout::{page0, page2, page3};
    use crate::parse;
    use crate::testing::{fake_pages, MockUsb};

    fn session(format: u8) -> Spectrometer<MockUsb> {
        Spectrometer::new(MockUsb::new(fake_pages(format)))
    }

    fn small_session(pixels: u16) -> Spectrometer<MockUsb> {
        let mut pages = fake_pages(7);
        assert!(parse::write_u16(
            pixels,
            &mut pages[page2::ACTIVE_PIXELS_HORIZ.page][..],
            page2::ACTIVE_PIXELS_HORIZ.offset
        ));
        Spectrometer::new(MockUsb::new(pages))
    }

    #[test]
    fn construction_reads_the_record_and_expands_axes() {
        let spec = session(7);
        assert_eq!(spec.pixels(), 1024);
        assert_eq!(spec.model(), "WP-785");
        assert_eq!(spec.serial_number(), "WP-00693");
        assert_eq!(spec.wavelengths().len(), 1024);
        assert_eq!(spec.wavenumbers().len(), 1024);
    }

    #[test]
    fn first_wavelength_is_the_constant_coefficient() {
        let spec = session(7);
        assert_eq!(spec.wavelengths()[0], f64::from(spec.eeprom.wavecal_coeffs[0]));
    }

    #[test]
    fn wavenumbers_follow_the_raman_shift_transform() {
        let spec = session(7);
        let laser_cm = 1e7 / f64::from(spec.eeprom.excitation_nm);
        let expected = laser_cm - 1e7 / spec.wavelengths()[0];
        assert!((spec.wavenumbers()[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn wavenumbers_are_empty_without_excitation() {
        let mut pages = fake_pages(7);
        assert!(parse::write_u16(
            0,
            &mut pages[page0::EXCITATION_NM_LEGACY.page][..],
            page0::EXCITATION_NM_LEGACY.offset
        ));
        assert!(parse::write_f32(
            0.0,
            &mut pages[page3::EXCITATION_NM.page][..],
            page3::EXCITATION_NM.offset
        ));
        let spec = Spectrometer::new(MockUsb::new(pages));
        assert!(spec.wavenumbers().is_empty());
        assert_eq!(spec.wavelengths().len(), 1024);
    }

    #[test]
    fn failed_record_read_degrades_the_session() {
        let mut usb = MockUsb::new(fake_pages(7));
        usb.fail_control_reads = true;
        let mut spec = Spectrometer::new(usb);
        assert_eq!(spec.pixels(), 0);
        assert!(spec.wavelengths().is_empty());
        assert!(spec.get_spectrum().is_empty());
    }

    #[test]
    fn integration_time_is_clamped_and_split_across_value_and_index() {
        let mut spec = session(7);

        spec.set_integration_time_ms(0).unwrap();
        assert_eq!(spec.integration_time_ms(), 1);

        spec.set_integration_time_ms(1 << 24).unwrap();
        assert_eq!(spec.integration_time_ms(), (1 << 24) - 1);

        let write = spec.usb.control_writes.last().unwrap();
        assert_eq!(write.request, 0xb2);
        assert_eq!(write.value, 0xffff);
        assert_eq!(write.index, 0x00ff);
    }

    #[test]
    fn integration_time_is_recorded_even_when_the_transfer_fails() {
        let mut spec = session(7);
        spec.usb.fail_control_writes = true;
        assert!(spec.set_integration_time_ms(25).is_err());
        assert_eq!(spec.integration_time_ms(), 25);
    }

    #[test]
    fn laser_enable_sends_a_flag_and_records_state() {
        let mut spec = session(7);
        assert!(!spec.laser_enabled());

        spec.set_laser_enable(true).unwrap();
        assert!(spec.laser_enabled());

        let write = spec.usb.control_writes.last().unwrap();
        assert_eq!(write.request, 0xbe);
        assert_eq!(write.value, 1);
    }

    #[test]
    fn arm_controllers_get_padded_control_payloads() {
        let mut pages_usb = MockUsb::new(fake_pages(7));
        pages_usb.product_id = PID_ARM;
        let mut spec = Spectrometer::new(pages_usb);

        spec.set_laser_enable(true).unwrap();
        let write = spec.usb.control_writes.last().unwrap();
        assert_eq!(write.data.len(), MIN_ARM_PAYLOAD);

        let mut spec = session(7); // FX2 sends payloads as-is
        assert_eq!(spec.usb.product_id, PID_FX2);
        spec.set_laser_enable(true).unwrap();
        assert!(spec.usb.control_writes.last().unwrap().data.is_empty());
    }

    #[test]
    fn spectrum_accumulates_across_split_bulk_reads() {
        let mut spec = small_session(4);
        spec.usb.queue_bulk(Ok(vec![1, 0, 2, 0]));
        spec.usb.queue_bulk(Ok(vec![3, 0]));
        spec.usb.queue_bulk(Ok(vec![0x10, 0x01]));

        let spectrum = spec.get_spectrum();
        assert_eq!(spectrum, vec![1.0, 2.0, 3.0, 272.0]);

        // the trigger went out before the reads
        let write = spec.usb.control_writes.last().unwrap();
        assert_eq!(write.request, 0xad);
    }

    #[test]
    fn spectrum_aborts_on_an_odd_byte_count() {
        let mut spec = small_session(4);
        spec.usb.queue_bulk(Ok(vec![5, 0]));
        spec.usb.queue_bulk(Ok(vec![7, 0, 9]));
        spec.usb.queue_bulk(Ok(vec![1, 0, 1, 0]));

        // nothing decoded past the fault
        assert_eq!(spec.get_spectrum(), vec![5.0]);
    }

    #[test]
    fn spectrum_aborts_on_an_empty_read() {
        let mut spec = small_session(4);
        spec.usb.queue_bulk(Ok(vec![5, 0]));
        spec.usb.queue_bulk(Ok(Vec::new()));

        assert_eq!(spec.get_spectrum(), vec![5.0]);
    }

    #[test]
    fn spectrum_aborts_on_a_transport_error() {
        let mut spec = small_session(4);
        spec.usb.queue_bulk(Ok(vec![5, 0, 6, 0]));
        spec.usb.queue_bulk(Err(rusb::Error::Timeout));

        assert_eq!(spec.get_spectrum(), vec![5.0, 6.0]);
    }

    #[test]
    fn acquisition_timeout_tracks_integration_time() {
        let mut spec = small_session(2);
        spec.set_integration_time_ms(100).unwrap();
        spec.usb.queue_bulk(Ok(vec![1, 0, 2, 0]));
        spec.get_spectrum();

        assert_eq!(
            spec.usb.bulk_timeouts.last().copied(),
            Some(Duration::from_millis(2200))
        );
    }

    #[test]
    fn inverted_units_reverse_the_spectrum() {
        // format 9 sets InvertXAxis and Bin2x2 in the feature word
        let mut pages = fake_pages(9);
        assert!(parse::write_u16(
            4,
            &mut pages[page2::ACTIVE_PIXELS_HORIZ.page][..],
            page2::ACTIVE_PIXELS_HORIZ.offset
        ));
        let mut spec = Spectrometer::new(MockUsb::new(pages));
        spec.usb.queue_bulk(Ok(vec![1, 0, 2, 0, 3, 0, 4, 0]));

        // reversed to [4, 3, 2, 1], then horizontally binned
        assert_eq!(spec.get_spectrum(), vec![3.5, 2.5, 1.5, 1.0]);
    }

    #[test]
    fn tec_requires_cooling() {
        let mut pages = fake_pages(7);
        pages[page0::HAS_COOLING.page][page0::HAS_COOLING.offset] = 0;
        let mut spec = Spectrometer::new(MockUsb::new(pages));

        assert!(matches!(
            spec.set_detector_tec_enable(true),
            Err(CommandError::Unsupported(_))
        ));
        assert!(spec.usb.control_writes.is_empty());
    }

    #[test]
    fn tec_setpoint_rejects_out_of_range_temperatures() {
        let mut spec = session(7);
        assert!(matches!(
            spec.set_detector_tec_setpoint_deg_c(50),
            Err(CommandError::OutOfRange(_))
        ));
    }

    #[test]
    fn tec_setpoint_converts_through_the_dac_polynomial() {
        let mut spec = session(7);
        // coeffs [1000, 35.5, 0.25] at -10 degC: 1000 - 355 + 25 = 670
        spec.set_detector_tec_setpoint_deg_c(-10).unwrap();
        let write = spec.usb.control_writes.last().unwrap();
        assert_eq!(write.request, 0xd8);
        assert_eq!(write.value, 670);
    }

    #[test]
    fn enabling_tec_applies_the_startup_setpoint_first() {
        let mut spec = session(7);
        spec.set_detector_tec_enable(true).unwrap();

        let requests: Vec<u8> = spec.usb.control_writes.iter().map(|w| w.request).collect();
        assert_eq!(requests, vec![0xd8, 0xd6]);

        // a second enable must not resend the setpoint
        spec.set_detector_tec_enable(true).unwrap();
        let requests: Vec<u8> = spec.usb.control_writes.iter().map(|w| w.request).collect();
        assert_eq!(requests, vec![0xd8, 0xd6, 0xd6]);
    }

    #[test]
    fn gain_encodes_as_fixed_point() {
        assert_eq!(gain_to_fixed_point(0.0), 0x0000);
        assert_eq!(gain_to_fixed_point(1.0), 0x0100);
        assert_eq!(gain_to_fixed_point(1.9), 0x01e6);
        assert_eq!(gain_to_fixed_point(2.5), 0x0280);
        assert_eq!(gain_to_fixed_point(-1.0), 0x0000);
    }

    #[test]
    fn close_releases_the_interface() {
        let mut spec = session(7);
        spec.close();
        assert!(spec.usb.released);
    }
}
