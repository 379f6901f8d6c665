//! Plant acquisition on a dedicated thread.
//!
//! [`BackgroundPlant`] samples the wrapped plant at its own cadence,
//! independent of the control period. The control loop then reads the most
//! recent cached sample instead of waiting on the device. The device and the
//! cache sit behind separate mutexes: device I/O holds only the device lock,
//! so reading the cache never waits on the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tc_core::{Commands, Measurements, Plant, TcError, TcResult};
use tracing::{debug, info, warn};

struct Cache {
    latest: Measurements,
    /// Last failed acquisition, cleared by the next success.
    fault: Option<TcError>,
    samples: u64,
}

struct Shared<P> {
    device: Mutex<P>,
    cache: Mutex<Cache>,
    running: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> TcResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| TcError::Poisoned)
}

/// Wraps a plant with a background sampling thread.
pub struct BackgroundPlant<P: Plant + 'static> {
    shared: Arc<Shared<P>>,
    worker: Option<JoinHandle<()>>,
    interval: Duration,
}

impl<P: Plant + 'static> BackgroundPlant<P> {
    /// Take one reading synchronously, then start sampling every `interval`.
    ///
    /// # Errors
    ///
    /// The initial read error, or `Io` if the thread cannot be spawned.
    pub fn spawn(mut plant: P, interval: Duration) -> TcResult<Self> {
        let latest = plant.read()?;
        let shared = Arc::new(Shared {
            device: Mutex::new(plant),
            cache: Mutex::new(Cache {
                latest,
                fault: None,
                samples: 1,
            }),
            running: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("plant-sampler".into())
            .spawn(move || sample_loop(&worker_shared, interval))
            .map_err(|source| TcError::Io {
                op: "spawn sampler thread",
                source,
            })?;
        info!(interval_ms = interval.as_millis() as u64, "background sampling started");

        Ok(Self {
            shared,
            worker: Some(worker),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Successful acquisitions so far, including the initial one.
    pub fn samples(&self) -> TcResult<u64> {
        Ok(lock(&self.shared.cache)?.samples)
    }

    fn is_stopped(&self) -> bool {
        self.worker.is_none()
    }
}

fn sample_loop<P: Plant>(shared: &Shared<P>, interval: Duration) {
    let mut next = Instant::now() + interval;
    while shared.running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next {
            // Woken early by stop() or spuriously; recheck the flag.
            thread::park_timeout(next - now);
            continue;
        }

        let reading = match shared.device.lock() {
            Ok(mut plant) => plant.read(),
            Err(_) => {
                warn!("plant device poisoned; sampler exiting");
                return;
            }
        };
        let Ok(mut cache) = lock(&shared.cache) else {
            warn!("sample cache poisoned; sampler exiting");
            return;
        };
        match reading {
            Ok(m) => {
                cache.latest = m;
                cache.fault = None;
                cache.samples += 1;
            }
            Err(e) => {
                warn!(error = %e, "background acquisition failed");
                cache.fault = Some(e);
            }
        }
        drop(cache);

        next += interval;
        let now = Instant::now();
        if next <= now {
            // The read overran the interval; leave the device free for writes.
            debug!("sampler overran its interval");
            next = now + interval;
        }
    }
    debug!("sampler thread exiting");
}

impl<P: Plant + 'static> Plant for BackgroundPlant<P> {
    /// Latest cached sample, or the pending acquisition fault.
    fn read(&mut self) -> TcResult<Measurements> {
        if self.is_stopped() {
            return Err(TcError::Stopped);
        }
        let cache = lock(&self.shared.cache)?;
        match &cache.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(cache.latest),
        }
    }

    /// Waits at most for the sample in flight, which the inner plant bounds.
    fn write(&mut self, commands: Commands) -> TcResult<()> {
        if self.is_stopped() {
            return Err(TcError::Stopped);
        }
        lock(&self.shared.device)?.write(commands)
    }

    /// Stop and join the sampler, then stop the inner plant.
    fn stop(&mut self) -> TcResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::SeqCst);
        worker.thread().unpark();
        if worker.join().is_err() {
            warn!("sampler thread panicked");
        }
        let result = lock(&self.shared.device)?.stop();
        info!("background sampling stopped");
        result
    }
}

impl<P: Plant + 'static> Drop for BackgroundPlant<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "background plant stop failed on drop");
        }
    }
}
