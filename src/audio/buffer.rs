//! Sample frame types shared by the render path

use std::ops::{Add, AddAssign, Mul};

/// A single stereo frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: f32,
    pub right: f32,
}

impl StereoSample {
    #[inline]
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn silence() -> Self {
        Self::new(0.0, 0.0)
    }

    #[inline]
    pub const fn mono(value: f32) -> Self {
        Self::new(value, value)
    }

    /// Average of both channels
    #[inline]
    pub fn mid(&self) -> f32 {
        (self.left + self.right) * 0.5
    }
}

impl Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.left * rhs, self.right * rhs)
    }
}

/// Write a rendered frame into an interleaved device buffer chunk.
/// Channels beyond the first two are filled with silence.
#[inline]
pub fn write_frame(chunk: &mut [f32], frame: StereoSample) {
    match chunk.len() {
        0 => {}
        1 => chunk[0] = frame.mid(),
        _ => {
            chunk[0] = frame.left;
            chunk[1] = frame.right;
            for extra in &mut chunk[2..] {
                *extra = 0.0;
            }
        }
    }
}

/// Hard safety limiter: clamps to [-1, 1] and replaces non-finite values with silence.
/// Returns true if any sample had to be corrected.
pub fn limit(data: &mut [f32]) -> bool {
    let mut clipped = false;
    for sample in data.iter_mut() {
        if !sample.is_finite() {
            *sample = 0.0;
            clipped = true;
        } else if *sample > 1.0 || *sample < -1.0 {
            *sample = sample.clamp(-1.0, 1.0);
            clipped = true;
        }
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_frame_mono_and_surround() {
        let frame = StereoSample::new(0.5, -0.5);

        let mut mono = [1.0f32];
        write_frame(&mut mono, frame);
        assert_eq!(mono[0], 0.0);

        let mut quad = [1.0f32; 4];
        write_frame(&mut quad, frame);
        assert_eq!(quad, [0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_limit() {
        let mut data = [0.5, 1.5, -2.0, f32::NAN, f32::INFINITY];
        assert!(limit(&mut data));
        assert_eq!(data, [0.5, 1.0, -1.0, 0.0, 0.0]);

        let mut clean = [0.1, -0.1];
        assert!(!limit(&mut clean));
    }
}
