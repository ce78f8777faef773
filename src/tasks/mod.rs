//! Background worker pool for water samples and FFT snapshots.
//!
//! One thread keeps every registered [`SpectrumLevel`] ring filled; the
//! sampling threads step registered [`WaterSample`]s in rotation. A worker that
//! fails stops for good and leaves a [`WaterError::WorkerFault`] behind for
//! [`TaskRunner::take_faults`].

mod round_robin;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use thread_priority::{set_current_thread_priority, ThreadPriorityValue};

use crate::error::{Result, WaterError};
use crate::fft::CpuSpectrumTransform;
use crate::ocean::SpectrumLevel;
use crate::params::{TaskSettings, ThreadPriority};
use crate::sampling::WaterSample;
use crate::spectrum::KMapCache;
use crate::sync::lock;

pub use round_robin::RoundRobin;

/// State shared between the handle and its threads
struct Shared {
    settings: TaskSettings,
    running: AtomicBool,
    samples: Mutex<RoundRobin<Arc<WaterSample>>>,
    levels: Mutex<RoundRobin<Arc<SpectrumLevel>>>,
    faults: Mutex<Vec<WaterError>>,
}

/// Worker pool handle. Dropping the last handle stops and joins the threads.
pub struct TaskRunner {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRunner {
    /// Spawn one FFT thread and `settings.sampling_threads` sampling threads.
    pub fn start(settings: TaskSettings) -> Result<Arc<Self>> {
        let sampling_threads = settings.sampling_threads.max(1);
        let priority = settings.priority;
        let shared = Arc::new(Shared {
            settings,
            running: AtomicBool::new(true),
            samples: Mutex::new(RoundRobin::new()),
            levels: Mutex::new(RoundRobin::new()),
            faults: Mutex::new(Vec::new()),
        });

        let runner = Arc::new(Self {
            shared: Arc::clone(&shared),
            threads: Mutex::new(Vec::new()),
        });

        // On a spawn failure the early return drops `runner`, which joins
        // whatever was already started
        let fft = spawn_worker(&shared, "water-fft".to_string(), fft_loop)?;
        lock(&runner.threads).push(fft);
        for index in 0..sampling_threads {
            let worker = spawn_worker(&shared, format!("water-sampling-{}", index), sampling_loop)?;
            lock(&runner.threads).push(worker);
        }

        debug!(
            "Task runner started: {} sampling thread(s), priority {:?}",
            sampling_threads, priority
        );
        Ok(runner)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Register a sample; registering twice is a no-op
    pub fn add_sample(&self, sample: Arc<WaterSample>) {
        let mut samples = lock(&self.shared.samples);
        if !samples.contains_where(|s| Arc::ptr_eq(s, &sample)) {
            samples.push(sample);
        }
    }

    pub fn remove_sample(&self, sample: &Arc<WaterSample>) {
        lock(&self.shared.samples).remove_where(|s| Arc::ptr_eq(s, sample));
    }

    pub fn sample_count(&self) -> usize {
        lock(&self.shared.samples).len()
    }

    pub fn add_level(&self, level: Arc<SpectrumLevel>) {
        let mut levels = lock(&self.shared.levels);
        if !levels.contains_where(|l| Arc::ptr_eq(l, &level)) {
            levels.push(level);
        }
    }

    pub fn remove_level(&self, level: &Arc<SpectrumLevel>) {
        lock(&self.shared.levels).remove_where(|l| Arc::ptr_eq(l, level));
    }

    pub fn level_count(&self) -> usize {
        lock(&self.shared.levels).len()
    }

    /// Faults recorded since the last call
    pub fn take_faults(&self) -> Vec<WaterError> {
        std::mem::take(&mut *lock(&self.shared.faults))
    }

    /// Stop all threads and wait for them. Safe to call more than once.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        lock(&self.shared.samples).clear();
        lock(&self.shared.levels).clear();

        let threads = std::mem::take(&mut *lock(&self.threads));
        for handle in threads {
            // The last handle can be dropped by a worker holding a resolver
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("Worker '{}' panicked while stopping", name);
            }
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    shared: &Arc<Shared>,
    name: String,
    body: fn(&Shared) -> Result<()>,
) -> Result<JoinHandle<()>> {
    let shared = Arc::clone(shared);
    let thread_name = name.clone();

    thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            apply_priority(&name, shared.settings.priority);
            debug!("Worker '{}' started", name);
            let message = match panic::catch_unwind(AssertUnwindSafe(|| body(&shared))) {
                Ok(Ok(())) => {
                    debug!("Worker '{}' stopped", name);
                    return;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload),
            };

            // Fail-stop: the loop is not restarted
            error!("Worker '{}' faulted: {}", name, message);
            lock(&shared.faults).push(WaterError::WorkerFault {
                worker: name,
                message,
            });
        })
        .map_err(|e| WaterError::ThreadSpawn(e.to_string()))
}

/// OS priority for a requested level; `None` keeps the scheduler default
fn os_priority(priority: ThreadPriority) -> Option<thread_priority::ThreadPriority> {
    let level = |value: u8| {
        ThreadPriorityValue::try_from(value).map_or(
            thread_priority::ThreadPriority::Min,
            thread_priority::ThreadPriority::Crossplatform,
        )
    };

    match priority {
        ThreadPriority::Lowest => Some(thread_priority::ThreadPriority::Min),
        ThreadPriority::BelowNormal => Some(level(25)),
        ThreadPriority::Normal => None,
        ThreadPriority::AboveNormal => Some(level(75)),
        ThreadPriority::Highest => Some(thread_priority::ThreadPriority::Max),
    }
}

/// Set the calling thread's priority. Failure (e.g. missing privileges) only warns.
fn apply_priority(name: &str, priority: ThreadPriority) {
    let Some(os) = os_priority(priority) else {
        return;
    };
    if let Err(e) = set_current_thread_priority(os) {
        warn!("Worker '{}' keeps default priority, {:?} rejected: {:?}", name, priority, e);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Step samples in rotation, sleeping after a full pass without work.
fn sampling_loop(shared: &Shared) -> Result<()> {
    let mut idle_streak = 0;

    while shared.running.load(Ordering::Acquire) {
        let (sample, count) = {
            let mut samples = lock(&shared.samples);
            (samples.next_item().cloned(), samples.len())
        };

        let worked = match sample {
            Some(sample) => sample.computation_step(),
            None => false,
        };

        if worked {
            idle_streak = 0;
        } else {
            idle_streak += 1;
            if idle_streak >= count.max(1) {
                thread::sleep(shared.settings.sampling_idle);
                idle_streak = 0;
            }
        }
    }

    Ok(())
}

/// Keep the snapshot rings of registered levels ahead of simulation time.
fn fft_loop(shared: &Shared) -> Result<()> {
    let mut transform = CpuSpectrumTransform::new();
    let mut kmaps = KMapCache::default();
    let mut idle_streak = 0;

    while shared.running.load(Ordering::Acquire) {
        let (level, count) = {
            let mut levels = lock(&shared.levels);
            (levels.next_item().cloned(), levels.len())
        };

        let Some(level) = level else {
            thread::sleep(shared.settings.fft_idle);
            continue;
        };

        if level.refresh(&mut transform, &mut kmaps)? {
            idle_streak = 0;
        } else {
            idle_streak += 1;
            if idle_streak >= count {
                thread::sleep(shared.settings.fft_no_work);
                idle_streak = 0;
            }
        }
    }

    Ok(())
}
