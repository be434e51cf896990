use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("no connection")]
    NoConnectivity,

    #[error("{0}")]
    Transport(String),

    #[error("measurement cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for MeasureError {
    fn from(err: reqwest::Error) -> Self {
        MeasureError::Transport(err.to_string())
    }
}

/// Returned when `start` or `reset` is called while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a measurement is already running")]
pub struct AlreadyRunning;
