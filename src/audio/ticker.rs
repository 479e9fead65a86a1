//! Fixed-rate background worker with prompt cancellation.
//!
//! Used for the percussive pulse schedulers and the spectrum sampler. Dropping
//! (or cancelling) a worker wakes its thread and joins it, so no tick can run
//! after `cancel` returns.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

struct TickerShared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

pub struct PeriodicWorker {
    name: String,
    shared: Arc<TickerShared>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicWorker {
    /// Spawn a worker that calls `tick` every `period`.
    /// The first tick fires immediately when `fire_immediately` is set.
    pub fn spawn<F>(name: &str, period: Duration, fire_immediately: bool, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(EngineError::Scheduler(format!("{}: period must be non-zero", name)));
        }

        let shared = Arc::new(TickerShared {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let shared_clone = Arc::clone(&shared);

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut next = Instant::now();
                if !fire_immediately {
                    next += period;
                }

                loop {
                    {
                        let mut cancelled = shared_clone.cancelled.lock();
                        while !*cancelled && Instant::now() < next {
                            if shared_clone.wake.wait_until(&mut cancelled, next).timed_out() {
                                break;
                            }
                        }
                        if *cancelled {
                            break;
                        }
                    }

                    tick();

                    next += period;
                    let now = Instant::now();
                    if next < now {
                        // Fell behind; skip the missed ticks instead of bursting
                        next = now + period;
                    }
                }
            })
            .map_err(|e| EngineError::Scheduler(format!("failed to spawn {}: {}", name, e)))?;

        log::debug!("{}: started ({:?} period)", name, period);

        Ok(Self {
            name: name.to_string(),
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the worker and wait for its thread to exit
    pub fn cancel(mut self) {
        self.shutdown();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn shutdown(&mut self) {
        {
            let mut cancelled = self.shared.cancelled.lock();
            *cancelled = true;
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("{}: worker thread panicked", self.name);
            } else {
                log::debug!("{}: stopped", self.name);
            }
        }
    }
}

impl Drop for PeriodicWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fires_and_stops() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let worker = PeriodicWorker::spawn("test-ticker", Duration::from_millis(5), true, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(60));
        worker.cancel();

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "fired {} times", fired);

        // Nothing fires after cancel returns
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }

    #[test]
    fn test_cancel_is_prompt() {
        let worker = PeriodicWorker::spawn("slow-ticker", Duration::from_secs(3600), false, || {}).unwrap();
        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(PeriodicWorker::spawn("zero", Duration::ZERO, true, || {}).is_err());
    }
}
