use std::time::Duration;

/// Chunk size, timing thresholds and ping parameters for a measurement run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chunk_size: usize,
    pub min_duration: Duration,
    pub progress_interval: Duration,
    pub ping_attempts: usize,
    pub ping_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 10_000_000,
            min_duration: Duration::from_secs(5),
            progress_interval: Duration::from_millis(150),
            ping_attempts: 5,
            ping_timeout: Duration::from_secs(15),
        }
    }
}
