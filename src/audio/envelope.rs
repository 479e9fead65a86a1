//! Percussive pulse envelopes.
//!
//! A pulse is an instant rise to full level followed by an exponential decay to
//! a small floor. The envelope multiplies a gain stage's output; it does not
//! touch the gain parameter itself, so mixer automation and pulses compose.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::param::AtomicF32;
use super::ticker::PeriodicWorker;
use crate::error::Result;

/// Pulse timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseSettings {
    pub enabled: bool,
    /// Time between pulses
    pub period_ms: u64,
    /// Time to decay from full level to `floor`
    pub decay_ms: u64,
    pub floor: f32,
}

impl Default for PulseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 500,
            decay_ms: 100,
            floor: 0.01,
        }
    }
}

/// Shared between a gain stage's render state and its pulse scheduler
#[derive(Debug)]
pub struct EnvelopeTrigger {
    armed: AtomicBool,
    pulses: AtomicU32,
    decay_secs: AtomicF32,
    floor: AtomicF32,
}

impl EnvelopeTrigger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(false),
            pulses: AtomicU32::new(0),
            decay_secs: AtomicF32::new(0.1),
            floor: AtomicF32::new(0.01),
        })
    }

    /// Enable the envelope on the gain stage
    pub fn arm(&self, settings: &PulseSettings) {
        self.decay_secs
            .store(settings.decay_ms.max(1) as f32 / 1000.0, Ordering::Relaxed);
        self.floor.store(settings.floor.clamp(1e-4, 1.0), Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Return the gain stage to a flat (unity) envelope
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Restart the envelope at full level
    pub fn fire(&self) {
        self.pulses.fetch_add(1, Ordering::Release);
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulses.load(Ordering::Acquire)
    }
}

/// Render-side envelope state
pub(crate) struct EnvelopeFollower {
    trigger: Arc<EnvelopeTrigger>,
    level: f32,
    seen: u32,
    sample_rate: f32,
}

impl EnvelopeFollower {
    pub fn new(trigger: Arc<EnvelopeTrigger>, sample_rate: u32) -> Self {
        let seen = trigger.pulse_count();
        Self {
            trigger,
            level: 0.0,
            seen,
            sample_rate: sample_rate.max(1) as f32,
        }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if !self.trigger.is_armed() {
            return 1.0;
        }

        let floor = self.trigger.floor.load(Ordering::Relaxed);
        let pulses = self.trigger.pulse_count();
        if pulses != self.seen {
            self.seen = pulses;
            self.level = 1.0;
            return self.level;
        }

        // Exponential ramp from 1.0 to `floor` over decay_secs
        let decay_samples = self.trigger.decay_secs.load(Ordering::Relaxed) * self.sample_rate;
        let step = floor.powf(1.0 / decay_samples.max(1.0));
        self.level = (self.level * step).max(floor);
        self.level
    }
}

/// Repeats pulses on a fixed period until dropped
pub struct PulseScheduler {
    trigger: Arc<EnvelopeTrigger>,
    worker: Option<PeriodicWorker>,
}

impl PulseScheduler {
    pub fn start(name: &str, trigger: Arc<EnvelopeTrigger>, settings: &PulseSettings) -> Result<Self> {
        trigger.arm(settings);
        let fire = Arc::clone(&trigger);
        let worker = PeriodicWorker::spawn(
            &format!("pulse-{}", name),
            Duration::from_millis(settings.period_ms.max(1)),
            true,
            move || fire.fire(),
        );
        match worker {
            Ok(worker) => Ok(Self {
                trigger,
                worker: Some(worker),
            }),
            Err(e) => {
                trigger.disarm();
                Err(e)
            }
        }
    }

    pub fn trigger(&self) -> &Arc<EnvelopeTrigger> {
        &self.trigger
    }
}

impl std::fmt::Debug for PulseScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseScheduler")
            .field("pulses", &self.trigger.pulse_count())
            .finish()
    }
}

impl Drop for PulseScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel();
        }
        self.trigger.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_envelope_is_unity() {
        let trigger = EnvelopeTrigger::new();
        let mut env = EnvelopeFollower::new(Arc::clone(&trigger), 1000);
        trigger.fire();
        assert_eq!(env.next(), 1.0);
    }

    #[test]
    fn test_pulse_decays_to_floor() {
        let trigger = EnvelopeTrigger::new();
        trigger.arm(&PulseSettings {
            enabled: true,
            period_ms: 500,
            decay_ms: 100,
            floor: 0.01,
        });
        let mut env = EnvelopeFollower::new(Arc::clone(&trigger), 1000);
        trigger.fire();
        assert_eq!(env.next(), 1.0);

        // 100 ms at 1 kHz reaches the floor
        let mut level = 1.0;
        for _ in 0..100 {
            level = env.next();
        }
        assert!((level - 0.01).abs() < 1e-3, "got {}", level);

        // Holds at the floor until the next pulse
        for _ in 0..100 {
            level = env.next();
        }
        assert!((level - 0.01).abs() < 1e-6);

        trigger.fire();
        assert_eq!(env.next(), 1.0);
    }

    #[test]
    fn test_scheduler_drop_disarms_and_stops() {
        let trigger = EnvelopeTrigger::new();
        let scheduler = PulseScheduler::start(
            "kick",
            Arc::clone(&trigger),
            &PulseSettings {
                period_ms: 5,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(trigger.is_armed());
        std::thread::sleep(Duration::from_millis(30));
        drop(scheduler);

        assert!(!trigger.is_armed());
        let pulses = trigger.pulse_count();
        assert!(pulses >= 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(trigger.pulse_count(), pulses);
    }
}
