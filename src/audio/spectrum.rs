//! FFT-based spectrum analyzer for real-time audio visualization

use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of frequency bands published for display
pub const NUM_BANDS: usize = 32;

/// Level mapped to 0 on the normalized scale
pub const MIN_DECIBELS: f32 = -100.0;
/// Level mapped to 1 on the normalized scale
pub const MAX_DECIBELS: f32 = -30.0;

/// Default smoothing between successive analyses
const DEFAULT_SMOOTHING: f32 = 0.8;

/// Linear-bin spectrum analyzer.
///
/// The transform window is twice the band count, so every bin below Nyquist is
/// one band (a 64-sample window yields 32 bands).
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    input_buffer: Vec<f32>,
    spectrum_buffer: Vec<realfft::num_complex::Complex<f32>>,
    /// Pre-allocated scratch buffer for windowed samples (avoids allocation in hot path)
    windowed_buffer: Vec<f32>,
    window: Vec<f32>,
    write_pos: usize,
    /// Smoothed linear magnitude per band
    magnitudes: Vec<f32>,
    /// Normalized band levels (0.0 - 1.0)
    levels: Vec<f32>,
    smoothing: f32,
}

impl SpectrumAnalyzer {
    pub fn new(band_count: usize) -> Self {
        let band_count = band_count.max(1);
        let fft_size = band_count * 2;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum_buffer = fft.make_output_vec();

        // Hann window for smooth frequency response
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * x).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            input_buffer: vec![0.0; fft_size],
            spectrum_buffer,
            windowed_buffer: vec![0.0; fft_size],
            window,
            write_pos: 0,
            magnitudes: vec![0.0; band_count],
            levels: vec![0.0; band_count],
            smoothing: DEFAULT_SMOOTHING,
        }
    }

    pub fn band_count(&self) -> usize {
        self.levels.len()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Push a mono sample into the analysis window
    #[inline]
    pub fn push_sample(&mut self, sample: f32) {
        self.input_buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.fft_size;
    }

    /// Compute FFT over the most recent window and update band levels
    pub fn analyze(&mut self) {
        // Oldest sample first, so the window lines up with time order
        let (newest, oldest) = self.input_buffer.split_at(self.write_pos);
        for (i, &s) in oldest.iter().chain(newest.iter()).enumerate() {
            self.windowed_buffer[i] = s * self.window[i];
        }

        if self
            .fft
            .process(&mut self.windowed_buffer, &mut self.spectrum_buffer)
            .is_err()
        {
            return;
        }

        let scale = 1.0 / self.fft_size as f32;
        for band in 0..self.levels.len() {
            let magnitude = self.spectrum_buffer[band].norm() * scale;
            let smoothed =
                self.magnitudes[band] * self.smoothing + magnitude * (1.0 - self.smoothing);
            self.magnitudes[band] = smoothed;
            self.levels[band] = normalize_db(magnitude_to_db(smoothed));
        }
    }

    /// Current normalized band levels (0.0 - 1.0)
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Reset the analyzer state
    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.write_pos = 0;
        self.magnitudes.fill(0.0);
        self.levels.fill(0.0);
    }
}

/// Convert linear magnitude to decibels
pub fn magnitude_to_db(mag: f32) -> f32 {
    if mag <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * mag.log10()
    }
}

/// Map a level in dB onto 0.0 - 1.0 between MIN_DECIBELS and MAX_DECIBELS
pub fn normalize_db(db: f32) -> f32 {
    if !db.is_finite() {
        return 0.0;
    }
    ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0)
}

/// Normalized amplitude per band, 0 - 100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSnapshot {
    pub bands: [f32; NUM_BANDS],
}

impl SpectrumSnapshot {
    /// All bands at the minimum value
    pub const fn baseline() -> Self {
        Self {
            bands: [0.0; NUM_BANDS],
        }
    }

    /// Build a snapshot from 0.0 - 1.0 levels; missing bands stay at baseline
    pub fn from_levels(levels: &[f32]) -> Self {
        let mut bands = [0.0f32; NUM_BANDS];
        for (band, &level) in bands.iter_mut().zip(levels) {
            *band = if level.is_finite() {
                (level * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
        }
        Self { bands }
    }

    pub fn is_baseline(&self) -> bool {
        self.bands.iter().all(|&b| b == 0.0)
    }

    /// Index of the loudest band
    pub fn peak_band(&self) -> usize {
        self.bands
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &b)| if b > best.1 { (i, b) } else { best })
            .0
    }
}

impl Default for SpectrumSnapshot {
    fn default() -> Self {
        Self::baseline()
    }
}
