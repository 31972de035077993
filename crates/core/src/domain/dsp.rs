//! Digital Signal Processing stages of the mastering chain
//!
//! This module provides the building blocks the signal chain is made of:
//! - Shelving and peaking EQ bands (biquad-based IIR filters)
//! - Waveshaping saturation with 4x oversampling
//! - Dynamic range compressor and a fixed-ratio limiter
//! - Mid/side stereo width
//! - Output gain
//!
//! Every stage processes interleaved f32 blocks in place and keeps its own
//! state between calls, so splitting a signal into blocks of any size gives
//! the same result as processing it in one go.

use crate::domain::audio::{AudioBuffer, AudioError, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tracing::trace;

/// Core trait for all chain stages
///
/// All stages process audio in-place on interleaved f32 buffers normalized
/// to [-1.0, 1.0].
pub trait Effect: Send + Sync {
    /// Process an interleaved block of `channels`-channel frames in place
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()>;

    /// Reset stage state (filter memories, envelopes) to initial conditions
    fn reset(&mut self);

    /// Get stage name for debugging/display
    fn name(&self) -> &str;
}

/// Fixed constants of the processing stages
pub mod params {
    /// Maximum channel count any stage keeps state for
    pub const MAX_CHANNELS: usize = 2;

    /// Shelf slope used for both shelving bands (S = 1)
    pub const SHELF_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

    /// Level floor for the dynamics detectors
    pub const LEVEL_FLOOR_DB: f32 = -120.0;

    /// Number of points in a saturation transfer curve
    pub const SATURATION_CURVE_LEN: usize = 44100;

    /// Oversampling factor around the saturation waveshaper
    pub const OVERSAMPLE_FACTOR: usize = 4;

    /// Anti-aliasing FIR length (a multiple of the oversampling factor)
    pub const OVERSAMPLE_TAPS: usize = 48;

    /// Limiter ratio, not preset-configurable
    pub const LIMITER_RATIO: f32 = 20.0;

    /// Limiter attack in seconds, not preset-configurable
    pub const LIMITER_ATTACK_SEC: f32 = 0.001;
}

fn check_channels(frames: &[f32], channels: usize) -> Result<()> {
    if channels == 0 || channels > params::MAX_CHANNELS {
        return Err(AudioError::InvalidConfiguration(format!(
            "stages support 1 or 2 channels, got {channels}"
        )));
    }
    if frames.len() % channels != 0 {
        return Err(AudioError::InvalidConfiguration(format!(
            "block of {} samples is not a whole number of {}-channel frames",
            frames.len(),
            channels
        )));
    }
    Ok(())
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels (with floor)
#[inline]
pub fn gain_to_db(level: f32) -> f32 {
    if level <= 1e-6 {
        params::LEVEL_FLOOR_DB
    } else {
        (20.0 * level.log10()).max(params::LEVEL_FLOOR_DB)
    }
}

// ============================================================================
// BIQUAD FILTER (Low-level IIR filter for EQ)
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Shared intermediate terms of the cookbook formulas
struct CookbookTerms {
    a: f32,
    cos_w0: f32,
    alpha: f32,
}

impl CookbookTerms {
    fn new(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        // Filters are only defined up to Nyquist
        let nyquist = sample_rate * 0.5;
        let freq = freq.clamp(1.0, nyquist * 0.999);
        let w0 = 2.0 * PI * freq / sample_rate;
        Self {
            a: 10.0_f32.powf(gain_db / 40.0),
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q),
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency. The gain is
    /// taken as given; 0 dB yields a unity response.
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the corner frequency.
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }
}

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I is chosen over Transposed Direct Form II for:
/// - Better numerical stability with low-frequency filters
/// - Easier coefficient updates without artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients
    ///
    /// Can be called in real-time for parameter changes.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of mono samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// EQ BANDS
// ============================================================================

/// Shelving band parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShelfParams {
    pub freq: f32,
    pub gain_db: f32,
}

/// Peaking (bell) band parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    pub freq: f32,
    pub gain_db: f32,
    pub q: f32,
}

/// Filter shape of an EQ band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandKind {
    LowShelf,
    Peaking,
    HighShelf,
}

/// One EQ band with independent filter state per channel
#[derive(Debug, Clone)]
pub struct EqBand {
    kind: BandKind,
    sample_rate: f32,
    freq: f32,
    gain_db: f32,
    q: f32,
    filters: [BiquadFilter; params::MAX_CHANNELS],
}

impl EqBand {
    /// Default corner frequencies of a neutral band
    pub const DEFAULT_LOW_FREQ: f32 = 350.0;
    pub const DEFAULT_MID_FREQ: f32 = 1000.0;
    pub const DEFAULT_HIGH_FREQ: f32 = 3500.0;

    /// Create a neutral (0 dB) band
    pub fn new(kind: BandKind, sample_rate: u32) -> Self {
        let freq = match kind {
            BandKind::LowShelf => Self::DEFAULT_LOW_FREQ,
            BandKind::Peaking => Self::DEFAULT_MID_FREQ,
            BandKind::HighShelf => Self::DEFAULT_HIGH_FREQ,
        };
        let q = match kind {
            BandKind::Peaking => 1.0,
            _ => params::SHELF_Q,
        };

        let mut band = Self {
            kind,
            sample_rate: sample_rate as f32,
            freq,
            gain_db: 0.0,
            q,
            filters: [BiquadFilter::bypass(), BiquadFilter::bypass()],
        };
        band.update_coefficients();
        band
    }

    pub fn kind(&self) -> BandKind {
        self.kind
    }

    /// Set shelf parameters (Q stays at the fixed shelf slope)
    pub fn set_shelf(&mut self, shelf: ShelfParams) {
        self.freq = shelf.freq;
        self.gain_db = shelf.gain_db;
        self.update_coefficients();
    }

    /// Set peaking parameters
    pub fn set_peak(&mut self, peak: PeakParams) {
        self.freq = peak.freq;
        self.gain_db = peak.gain_db;
        self.q = peak.q;
        self.update_coefficients();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        self.update_coefficients();
    }

    pub fn freq(&self) -> f32 {
        self.freq
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Current coefficients shared by every channel
    pub fn coeffs(&self) -> BiquadCoeffs {
        self.filters[0].coeffs
    }

    fn update_coefficients(&mut self) {
        let coeffs = match self.kind {
            BandKind::LowShelf => {
                BiquadCoeffs::low_shelf(self.sample_rate, self.freq, self.gain_db, self.q)
            }
            BandKind::Peaking => {
                BiquadCoeffs::peaking(self.sample_rate, self.freq, self.gain_db, self.q)
            }
            BandKind::HighShelf => {
                BiquadCoeffs::high_shelf(self.sample_rate, self.freq, self.gain_db, self.q)
            }
        };

        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }

        trace!(
            "{:?} band updated: {:.1}dB@{:.0}Hz Q={:.2}",
            self.kind,
            self.gain_db,
            self.freq,
            self.q
        );
    }
}

impl Effect for EqBand {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        check_channels(frames, channels)?;

        for frame in frames.chunks_exact_mut(channels) {
            for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
                *sample = filter.process_sample(*sample);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn name(&self) -> &str {
        match self.kind {
            BandKind::LowShelf => "LowShelf",
            BandKind::Peaking => "MidPeak",
            BandKind::HighShelf => "HighShelf",
        }
    }
}

// ============================================================================
// SATURATION
// ============================================================================

/// Tabulated waveshaper transfer curve over the input domain [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationCurve {
    table: Vec<f32>,
}

impl SaturationCurve {
    /// Build the curve for a drive amount in 0..=100
    ///
    /// Returns `None` for zero drive: the shaper is the identity function.
    pub fn for_drive(drive: f32) -> Option<Self> {
        if drive == 0.0 {
            return None;
        }

        let d = drive / 100.0;
        let deg = PI / 180.0;
        let last = (params::SATURATION_CURVE_LEN - 1) as f32;
        let table = (0..params::SATURATION_CURVE_LEN)
            .map(|i| {
                let x = (i as f32 * 2.0) / last - 1.0;
                ((3.0 + d) * x * 20.0 * deg) / (PI + d * x.abs())
            })
            .collect();

        Some(Self { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn points(&self) -> &[f32] {
        &self.table
    }

    /// Look up the curve with linear interpolation; inputs outside [-1, 1]
    /// take the end values
    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        let last = self.table.len() - 1;
        let v = last as f32 * 0.5 * (x + 1.0);

        if v <= 0.0 {
            self.table[0]
        } else if v >= last as f32 {
            self.table[last]
        } else {
            let k = v.floor() as usize;
            let frac = v - k as f32;
            self.table[k] + frac * (self.table[k + 1] - self.table[k])
        }
    }
}

/// Design a windowed-sinc low-pass kernel normalized to unity DC gain
fn design_lowpass(taps: usize, cutoff: f32) -> Vec<f32> {
    let center = (taps - 1) as f32 / 2.0;
    let mut kernel: Vec<f32> = (0..taps)
        .map(|n| {
            let t = n as f32 - center;
            let sinc = if t == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * t).sin() / (PI * t)
            };
            // Blackman window
            let phase = 2.0 * PI * n as f32 / (taps - 1) as f32;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            sinc * window
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for h in &mut kernel {
        *h /= sum;
    }
    kernel
}

/// Polyphase 4x upsampler / decimator pair around a memoryless nonlinearity
#[derive(Debug, Clone)]
pub struct Oversampler {
    kernel: Vec<f32>,
    // Newest input sample first
    up_history: Vec<f32>,
    // Newest oversampled value first
    down_history: Vec<f32>,
}

impl Oversampler {
    pub fn new() -> Self {
        let cutoff = 0.45 / params::OVERSAMPLE_FACTOR as f32;
        Self {
            kernel: design_lowpass(params::OVERSAMPLE_TAPS, cutoff),
            up_history: vec![0.0; params::OVERSAMPLE_TAPS / params::OVERSAMPLE_FACTOR],
            down_history: vec![0.0; params::OVERSAMPLE_TAPS],
        }
    }

    /// Upsample one sample, apply `shape` at the high rate, and decimate back
    #[inline]
    pub fn process_sample(&mut self, x: f32, shape: impl Fn(f32) -> f32) -> f32 {
        let factor = params::OVERSAMPLE_FACTOR;

        self.up_history.rotate_right(1);
        self.up_history[0] = x;

        for phase in 0..factor {
            let interpolated: f32 = self
                .up_history
                .iter()
                .enumerate()
                .map(|(k, v)| self.kernel[k * factor + phase] * v)
                .sum();

            self.down_history.rotate_right(1);
            self.down_history[0] = shape(interpolated * factor as f32);
        }

        self.kernel
            .iter()
            .zip(self.down_history.iter())
            .map(|(h, v)| h * v)
            .sum()
    }

    pub fn reset(&mut self) {
        self.up_history.fill(0.0);
        self.down_history.fill(0.0);
    }
}

impl Default for Oversampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationParams {
    pub enabled: bool,
    /// Drive amount, 0-100
    pub drive: f32,
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self {
            enabled: false,
            drive: 0.0,
        }
    }
}

impl SaturationParams {
    /// Drive actually applied (disabled saturation means zero drive)
    pub fn effective_drive(&self) -> f32 {
        if self.enabled {
            self.drive
        } else {
            0.0
        }
    }
}

/// Memoryless waveshaping saturation, oversampled 4x
///
/// At zero drive the stage is the identity and passes samples through
/// untouched.
#[derive(Debug, Clone)]
pub struct Saturator {
    drive: f32,
    curve: Option<SaturationCurve>,
    oversamplers: [Oversampler; params::MAX_CHANNELS],
}

impl Saturator {
    pub fn new() -> Self {
        Self {
            drive: 0.0,
            curve: None,
            oversamplers: [Oversampler::new(), Oversampler::new()],
        }
    }

    /// Set the drive, rebuilding the curve only when it changed
    ///
    /// Returns `true` if the curve was regenerated.
    pub fn set_drive(&mut self, drive: f32) -> bool {
        if drive == self.drive {
            return false;
        }

        self.drive = drive;
        self.curve = SaturationCurve::for_drive(drive);
        trace!("Saturation curve rebuilt for drive {:.1}", drive);
        true
    }

    pub fn drive(&self) -> f32 {
        self.drive
    }

    pub fn is_identity(&self) -> bool {
        self.curve.is_none()
    }

    pub fn curve(&self) -> Option<&SaturationCurve> {
        self.curve.as_ref()
    }
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Saturator {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        check_channels(frames, channels)?;

        let Some(curve) = &self.curve else {
            return Ok(());
        };

        for frame in frames.chunks_exact_mut(channels) {
            for (sample, oversampler) in frame.iter_mut().zip(self.oversamplers.iter_mut()) {
                *sample = oversampler.process_sample(*sample, |x| curve.shape(x));
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        for oversampler in &mut self.oversamplers {
            oversampler.reset();
        }
    }

    fn name(&self) -> &str {
        "Saturation"
    }
}

// ============================================================================
// DYNAMIC RANGE COMPRESSOR
// ============================================================================

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
}

impl Default for CompressorParams {
    /// Transparent settings (1:1 ratio)
    fn default() -> Self {
        Self {
            threshold_db: 0.0,
            knee_db: 0.0,
            ratio: 1.0,
            attack_sec: 0.003,
            release_sec: 0.25,
        }
    }
}

/// Convert a time constant to a one-pole smoothing coefficient
#[inline]
fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

/// Dynamic range compressor
///
/// Feed-forward design with a channel-linked peak detector, a soft-knee
/// static curve, and attack/release smoothing of the gain reduction in dB.
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    // Smoothed gain reduction in dB (<= 0)
    gain_reduction_db: f32,
}

impl Compressor {
    /// Create a compressor with transparent parameters
    pub fn new(sample_rate: u32) -> Self {
        let mut comp = Self {
            params: CompressorParams::default(),
            sample_rate: sample_rate as f32,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain_reduction_db: 0.0,
        };
        comp.update_coefficients();
        comp
    }

    /// Set all parameters at once; values are used as given
    pub fn set_params(&mut self, params: CompressorParams) {
        self.params = params;
        self.update_coefficients();
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        self.update_coefficients();
    }

    /// Current gain reduction in dB (0 = none)
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_coeff(self.params.attack_sec, self.sample_rate);
        self.release_coeff = time_coeff(self.params.release_sec, self.sample_rate);
    }

    /// Static curve: output level in dB for an input level in dB
    #[inline]
    pub fn output_level_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.params.knee_db;

        if knee <= 0.0 {
            if input_db <= threshold {
                input_db
            } else {
                threshold + (input_db - threshold) / ratio
            }
        } else {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                input_db
            } else if input_db >= knee_end {
                threshold + (input_db - threshold) / ratio
            } else {
                // Quadratic transition across the knee
                let x = input_db - knee_start;
                input_db - (1.0 - 1.0 / ratio) * x * x / (2.0 * knee)
            }
        }
    }

    /// Advance the detector by one frame and return the linear gain to apply
    #[inline]
    fn next_gain(&mut self, frame_peak: f32) -> f32 {
        let level_db = gain_to_db(frame_peak);
        let target_db = self.output_level_db(level_db) - level_db;

        // More negative target = attacking
        let coeff = if target_db < self.gain_reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain_reduction_db = coeff * self.gain_reduction_db + (1.0 - coeff) * target_db;

        db_to_gain(self.gain_reduction_db)
    }
}

impl Effect for Compressor {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        check_channels(frames, channels)?;

        for frame in frames.chunks_exact_mut(channels) {
            let peak = frame.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
            let gain = self.next_gain(peak);
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.gain_reduction_db = 0.0;
    }

    fn name(&self) -> &str {
        "Compressor"
    }
}

// ============================================================================
// LIMITER
// ============================================================================

/// Limiter parameters (ratio and attack are fixed)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub release_sec: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: 0.0,
            release_sec: 0.05,
        }
    }
}

/// Safety ceiling after the compressor: 20:1, 1 ms attack, hard knee
#[derive(Debug, Clone)]
pub struct Limiter {
    params: LimiterParams,
    inner: Compressor,
}

impl Limiter {
    pub fn new(sample_rate: u32) -> Self {
        let mut limiter = Self {
            params: LimiterParams::default(),
            inner: Compressor::new(sample_rate),
        };
        limiter.set_params(LimiterParams::default());
        limiter
    }

    pub fn set_params(&mut self, params: LimiterParams) {
        self.params = params;
        self.inner.set_params(CompressorParams {
            threshold_db: params.threshold_db,
            knee_db: 0.0,
            ratio: params::LIMITER_RATIO,
            attack_sec: params::LIMITER_ATTACK_SEC,
            release_sec: params.release_sec,
        });
    }

    pub fn params(&self) -> LimiterParams {
        self.params
    }

    /// Full compressor settings the limiter runs with
    pub fn compressor_params(&self) -> CompressorParams {
        self.inner.params()
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.inner.set_sample_rate(sample_rate);
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.inner.gain_reduction_db()
    }
}

impl Effect for Limiter {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        self.inner.process(frames, channels)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn name(&self) -> &str {
        "Limiter"
    }
}

// ============================================================================
// STEREO WIDTH
// ============================================================================

/// Stereo width parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoWidthParams {
    pub enabled: bool,
    /// 1.0 = unity, 0.0 = mono, >1.0 = wider
    pub width: f32,
}

impl Default for StereoWidthParams {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 1.0,
        }
    }
}

/// Mid/side stereo width
///
/// Each input channel feeds the mid bus with gain 0.5 and the side bus with
/// `0.5 + side_gain` (sign per channel), where `side_gain = (width - 1) * 0.5`.
/// Output is `L = mid + side`, `R = mid - side`, so width 1 reproduces the
/// input. Width is not clamped.
#[derive(Debug, Clone)]
pub struct StereoWidth {
    width: f32,
    mid_gain: f32,
    side_gain: f32,
}

impl StereoWidth {
    pub fn new(width: f32) -> Self {
        let mut stage = Self {
            width: 1.0,
            mid_gain: 0.5,
            side_gain: 0.0,
        };
        stage.set_width(width);
        stage
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width;
        self.mid_gain = 0.5;
        self.side_gain = (width - 1.0) * 0.5;
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn mid_gain(&self) -> f32 {
        self.mid_gain
    }

    pub fn side_gain(&self) -> f32 {
        self.side_gain
    }
}

impl Default for StereoWidth {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Effect for StereoWidth {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        check_channels(frames, channels)?;
        if channels != 2 {
            return Err(AudioError::InvalidConfiguration(
                "stereo width needs a 2-channel signal".into(),
            ));
        }

        let side_scale = self.mid_gain + self.side_gain;
        for frame in frames.chunks_exact_mut(2) {
            let (l, r) = (frame[0], frame[1]);
            let mid = self.mid_gain * (l + r);
            let side = side_scale * (l - r);
            frame[0] = mid + side;
            frame[1] = mid - side;
        }

        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "StereoWidth"
    }
}

// ============================================================================
// OUTPUT GAIN
// ============================================================================

/// Scalar output gain
#[derive(Debug, Clone)]
pub struct OutputGain {
    gain: f32,
}

impl OutputGain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for OutputGain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Effect for OutputGain {
    fn process(&mut self, frames: &mut [f32], channels: usize) -> Result<()> {
        check_channels(frames, channels)?;
        for sample in frames.iter_mut() {
            *sample *= self.gain;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "OutputGain"
    }
}

// ============================================================================
// RESAMPLER
// ============================================================================

/// Linear-interpolation sample-rate converter for interleaved blocks
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    ratio: f64,
    position: f64,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::InvalidConfiguration(
                "sample rates must be non-zero".into(),
            ));
        }
        if channels == 0 {
            return Err(AudioError::InvalidConfiguration(
                "resampler needs at least one channel".into(),
            ));
        }

        trace!(
            "Creating resampler: {}Hz -> {}Hz, {} channels",
            source_rate,
            target_rate,
            channels
        );

        Ok(Self {
            channels,
            ratio: target_rate as f64 / source_rate as f64,
            position: 0.0,
        })
    }

    /// Number of output frames produced for `input_frames` input frames
    pub fn output_frames(&self, input_frames: usize) -> usize {
        (input_frames as f64 * self.ratio).round() as usize
    }

    /// Convert a whole interleaved signal; returns the resampled samples
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let input_frames = input.len() / self.channels;
        if self.ratio == 1.0 || input_frames == 0 {
            return input.to_vec();
        }

        let output_frames = self.output_frames(input_frames);
        let step = self.ratio.recip();
        let mut output = Vec::with_capacity(output_frames * self.channels);

        self.position = 0.0;
        for _ in 0..output_frames {
            let i0 = (self.position.floor() as usize).min(input_frames - 1);
            let i1 = (i0 + 1).min(input_frames - 1);
            let frac = (self.position - i0 as f64).clamp(0.0, 1.0) as f32;

            for ch in 0..self.channels {
                let a = input[i0 * self.channels + ch];
                let b = input[i1 * self.channels + ch];
                output.push(a + frac * (b - a));
            }

            self.position += step;
        }

        output
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

/// Resample a planar buffer to `target_rate`
pub fn resample_buffer(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate() == target_rate {
        return Ok(buffer.clone());
    }

    let channels = buffer.num_channels();
    let mut resampler = Resampler::new(buffer.sample_rate(), target_rate, channels)?;
    let output = resampler.process(&buffer.interleaved());

    AudioBuffer::from_interleaved(target_rate, channels, &output)
}

// ============================================================================
// TESTS
// ============================================================================
