//! Background worker pool configuration.

use std::time::Duration;

/// Requested scheduling priority for worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPriority {
    Lowest,
    BelowNormal,
    Normal,
    AboveNormal,
    Highest,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct TaskSettings {
    /// Number of threads round-robining water samples
    pub sampling_threads: usize,

    /// Scheduler priority applied to every worker; `Normal` leaves the OS default
    pub priority: ThreadPriority,

    /// Sampling thread sleep when no samples are registered
    pub sampling_idle: Duration,

    /// FFT thread sleep when every level is up to date
    pub fft_no_work: Duration,

    /// FFT thread sleep when no level is registered
    pub fft_idle: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            sampling_threads: 1,
            priority: ThreadPriority::BelowNormal,
            sampling_idle: Duration::from_millis(2),
            fft_no_work: Duration::from_millis(3),
            fft_idle: Duration::from_millis(6),
        }
    }
}

impl TaskSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.sampling_threads == 0 {
            return Err("at least one sampling thread is required".to_string());
        }
        Ok(())
    }
}
