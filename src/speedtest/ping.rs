use super::transport::Transport;
use super::MeasureError;
use crate::settings::Settings;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct LatencySampler<T> {
    transport: Arc<T>,
    attempts: usize,
}

impl<T: Transport> LatencySampler<T> {
    pub fn new(transport: Arc<T>, settings: &Settings) -> Self {
        Self {
            transport,
            attempts: settings.ping_attempts,
        }
    }

    /// Average round trip in milliseconds over the successful attempts.
    pub async fn measure(&self, cancel: &CancellationToken) -> Result<f64, MeasureError> {
        let mut samples = Vec::with_capacity(self.attempts);

        for attempt in 1..=self.attempts {
            let start = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MeasureError::Cancelled),
                outcome = self.transport.ping() => outcome,
            };
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(status) if (200..300).contains(&status) => samples.push(elapsed_ms),
                Ok(status) => tracing::debug!(attempt, status, "discarding ping sample"),
                Err(err) => tracing::debug!(attempt, error = %err, "discarding ping sample"),
            }
        }

        let avg = mean_latency(&samples)?;
        tracing::info!(samples = samples.len(), avg_ms = avg, "latency measured");
        Ok(avg)
    }
}

fn mean_latency(samples: &[f64]) -> Result<f64, MeasureError> {
    if samples.is_empty() {
        return Err(MeasureError::NoConnectivity);
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}
