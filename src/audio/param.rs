//! Lock-free automatable parameters shared between the control thread and the
//! render thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// f32 stored as its bit pattern in an AtomicU32
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub const fn zero() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

/// Control-side half of an automatable parameter.
///
/// `set_value` jumps immediately; `set_target` starts an exponential approach
/// with the given time constant. A new target always restarts the approach from
/// wherever the render side currently is.
#[derive(Debug)]
pub struct AudioParam {
    target: AtomicF32,
    time_constant: AtomicF32,
    /// Bumped by every `set_value` so the render side snaps instead of ramping
    jumps: AtomicU32,
}

impl AudioParam {
    pub fn new(value: f32) -> Arc<Self> {
        Arc::new(Self {
            target: AtomicF32::new(value),
            time_constant: AtomicF32::zero(),
            jumps: AtomicU32::new(0),
        })
    }

    /// Set the value immediately (no smoothing)
    pub fn set_value(&self, value: f32) {
        self.target.store(value, Ordering::Relaxed);
        self.jumps.fetch_add(1, Ordering::Release);
    }

    /// Approach `value` exponentially with time constant `tau` seconds
    pub fn set_target(&self, value: f32, tau: f32) {
        self.time_constant.store(tau.max(0.0), Ordering::Relaxed);
        self.target.store(value, Ordering::Release);
    }

    /// The value the parameter is at or heading towards
    pub fn target(&self) -> f32 {
        self.target.load(Ordering::Acquire)
    }

    pub fn time_constant(&self) -> f32 {
        self.time_constant.load(Ordering::Relaxed)
    }
}

/// Render-side follower that turns an [`AudioParam`] into a per-sample value
pub(crate) struct ParamFollower {
    param: Arc<AudioParam>,
    current: f32,
    jumps: u32,
    tau: f32,
    coeff: f32,
    sample_rate: f32,
}

impl ParamFollower {
    pub fn new(param: Arc<AudioParam>, sample_rate: u32) -> Self {
        let current = param.target();
        let jumps = param.jumps.load(Ordering::Acquire);
        Self {
            param,
            current,
            jumps,
            tau: 0.0,
            coeff: 1.0,
            sample_rate: sample_rate.max(1) as f32,
        }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        let jumps = self.param.jumps.load(Ordering::Acquire);
        let target = self.param.target.load(Ordering::Acquire);
        if jumps != self.jumps {
            self.jumps = jumps;
            self.current = target;
            return target;
        }

        let tau = self.param.time_constant();
        if tau != self.tau {
            self.tau = tau;
            self.coeff = smoothing_coefficient(tau, self.sample_rate);
        }

        self.current += self.coeff * (target - self.current);
        self.current
    }

    #[cfg(test)]
    pub fn current(&self) -> f32 {
        self.current
    }
}

/// One-pole coefficient for an exponential approach with time constant `tau`
pub(crate) fn smoothing_coefficient(tau: f32, sample_rate: f32) -> f32 {
    let samples = tau * sample_rate;
    if samples <= 1.0 {
        1.0
    } else {
        (1.0 - (-1.0 / samples).exp()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_jumps() {
        let param = AudioParam::new(0.0);
        let mut follower = ParamFollower::new(Arc::clone(&param), 48000);
        param.set_target(1.0, 0.1);
        follower.next();
        param.set_value(0.25);
        assert_eq!(follower.next(), 0.25);
    }

    #[test]
    fn test_target_is_approached_exponentially() {
        let param = AudioParam::new(0.0);
        let mut follower = ParamFollower::new(Arc::clone(&param), 1000);
        param.set_target(1.0, 0.1);

        // One time constant (100 samples at 1 kHz) covers ~63% of the distance
        for _ in 0..100 {
            follower.next();
        }
        let after_tau = follower.current();
        assert!((after_tau - 0.632).abs() < 0.01, "got {}", after_tau);

        for _ in 0..1000 {
            follower.next();
        }
        assert!((follower.current() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_retarget_mid_ramp() {
        let param = AudioParam::new(1.0);
        let mut follower = ParamFollower::new(Arc::clone(&param), 1000);
        param.set_target(0.0, 0.1);
        for _ in 0..50 {
            follower.next();
        }
        let mid = follower.current();
        assert!(mid > 0.0 && mid < 1.0);

        // New target restarts from the current position, not from the old start
        param.set_target(1.0, 0.1);
        let next = follower.next();
        assert!(next > mid && next < 1.0);
    }

    #[test]
    fn test_zero_time_constant_is_instant() {
        assert_eq!(smoothing_coefficient(0.0, 48000.0), 1.0);
        let c = smoothing_coefficient(0.1, 48000.0);
        assert!(c > 0.0 && c < 0.001);
    }
}
