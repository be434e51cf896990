pub mod error;
pub mod orchestrator;
pub mod ping;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;

pub use error::{AlreadyRunning, MeasureError};
pub use orchestrator::{Orchestrator, Snapshot};

/// Bytes per second in one megabit per second.
const BYTES_PER_MEGABIT: f64 = 125_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementResult {
    pub ping: Option<f64>,
    pub download: Option<f64>,
    pub upload: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TestPhase {
    #[default]
    Idle,
    MeasuringPing,
    MeasuringDownload,
    MeasuringUpload,
    Done,
    Error(String),
}

impl TestPhase {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TestPhase::MeasuringPing | TestPhase::MeasuringDownload | TestPhase::MeasuringUpload
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

/// Progress of an in-flight transfer run: bytes moved so far across all
/// chunks and seconds since the first chunk started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSample {
    pub bytes: u64,
    pub elapsed_secs: f64,
}

impl TransferSample {
    pub fn mbps(&self) -> f64 {
        throughput_mbps(self.bytes, self.elapsed_secs)
    }
}

/// Megabits per second for `bytes` moved in `elapsed_secs`; zero when no time
/// has passed.
pub fn throughput_mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        bytes as f64 / elapsed_secs / BYTES_PER_MEGABIT
    } else {
        0.0
    }
}
