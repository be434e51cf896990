use super::transport::Transport;
use super::{throughput_mbps, Direction, MeasureError, TransferSample};
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Measures throughput in one direction by moving fixed-size chunks until the
/// run has lasted at least `min_duration`.
pub struct TransferMeasurer<T> {
    transport: Arc<T>,
    direction: Direction,
    chunk_size: usize,
    min_duration: Duration,
    progress_interval: Duration,
}

#[derive(Debug, PartialEq)]
enum ChunkVerdict {
    NextChunk,
    Finished(f64),
}

impl<T: Transport> TransferMeasurer<T> {
    pub fn new(transport: Arc<T>, direction: Direction, settings: &Settings) -> Self {
        Self {
            transport,
            direction,
            chunk_size: settings.chunk_size,
            min_duration: settings.min_duration,
            progress_interval: settings.progress_interval,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Runs chunks until the duration floor is met and returns megabits per
    /// second over the whole run. Samples go to `progress_tx` at most once per
    /// progress interval.
    pub async fn measure(
        &self,
        progress_tx: mpsc::Sender<TransferSample>,
        cancel: &CancellationToken,
    ) -> Result<f64, MeasureError> {
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut first_chunk_start: Option<Instant> = None;
        let mut total_bytes: u64 = 0;
        let mut chunks: u32 = 0;

        loop {
            let started = *first_chunk_start.get_or_insert_with(Instant::now);
            let (moved_tx, mut moved_rx) = mpsc::unbounded_channel();
            let chunk = self
                .transport
                .transfer_chunk(self.direction, self.chunk_size, moved_tx);
            tokio::pin!(chunk);

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(direction = self.direction.label(), chunks, "transfer cancelled mid-chunk");
                        return Err(MeasureError::Cancelled);
                    }
                    outcome = &mut chunk => break outcome,
                    Some(moved) = moved_rx.recv() => {
                        let now = Instant::now();
                        if throttle.ready(now) {
                            let sample = TransferSample {
                                bytes: total_bytes + moved,
                                elapsed_secs: now.duration_since(started).as_secs_f64(),
                            };
                            let _ = progress_tx.send(sample).await;
                        }
                    }
                }
            };

            chunks += 1;
            let chunk_bytes = match outcome {
                Ok(bytes) => bytes,
                Err(_) if cancel.is_cancelled() => return Err(MeasureError::Cancelled),
                Err(err) => {
                    tracing::warn!(direction = self.direction.label(), chunks, error = %err, "chunk failed");
                    return Err(err);
                }
            };
            if cancel.is_cancelled() {
                return Err(MeasureError::Cancelled);
            }

            total_bytes += chunk_bytes;
            let elapsed = started.elapsed();
            tracing::debug!(
                direction = self.direction.label(),
                chunks,
                chunk_bytes,
                total_bytes,
                elapsed_secs = elapsed.as_secs_f64(),
                "chunk complete"
            );

            match settle(total_bytes, elapsed, self.min_duration)? {
                ChunkVerdict::Finished(mbps) => {
                    tracing::info!(direction = self.direction.label(), chunks, total_bytes, mbps, "transfer measured");
                    return Ok(mbps);
                }
                ChunkVerdict::NextChunk => continue,
            }
        }
    }
}

/// Decides what follows a completed chunk given the run's running totals.
fn settle(
    total_bytes: u64,
    elapsed: Duration,
    min_duration: Duration,
) -> Result<ChunkVerdict, MeasureError> {
    if total_bytes == 0 {
        return Err(MeasureError::NoConnectivity);
    }
    if elapsed >= min_duration {
        Ok(ChunkVerdict::Finished(throughput_mbps(total_bytes, elapsed.as_secs_f64())))
    } else {
        Ok(ChunkVerdict::NextChunk)
    }
}

/// Lets a progress report through only when `interval` has passed since the
/// last one. The first report always passes.
#[derive(Debug)]
struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::testing::{Chunk, FakeTransport};

    fn measurer(transport: FakeTransport, direction: Direction) -> (Arc<FakeTransport>, TransferMeasurer<FakeTransport>) {
        let transport = Arc::new(transport);
        let measurer = TransferMeasurer::new(Arc::clone(&transport), direction, &Settings::default());
        (transport, measurer)
    }

    async fn collect(mut rx: mpsc::Receiver<TransferSample>) -> Vec<TransferSample> {
        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        samples
    }

    #[test]
    fn settle_loops_until_floor() {
        let floor = Duration::from_secs(5);
        assert_eq!(settle(10, Duration::from_secs(4), floor), Ok(ChunkVerdict::NextChunk));
        match settle(52_000_000, Duration::from_millis(5200), floor) {
            Ok(ChunkVerdict::Finished(mbps)) => assert!((mbps - 80.0).abs() < 1e-6),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn settle_treats_empty_run_as_no_connectivity() {
        let floor = Duration::from_secs(5);
        assert_eq!(settle(0, Duration::from_secs(1), floor), Err(MeasureError::NoConnectivity));
        assert_eq!(settle(0, Duration::from_secs(6), floor), Err(MeasureError::NoConnectivity));
    }

    #[test]
    fn throttle_spaces_reports() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_millis(150));
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(149)));
        assert!(throttle.ready(start + Duration::from_millis(150)));
        assert!(!throttle.ready(start + Duration::from_millis(200)));
        assert!(throttle.ready(start + Duration::from_millis(301)));
    }

    #[tokio::test(start_paused = true)]
    async fn accumulates_chunks_over_one_timer() {
        let (transport, measurer) =
            measurer(FakeTransport::new().downloads([Chunk::new(1040, 10_400_000)]), Direction::Download);
        let (tx, rx) = mpsc::channel(1024);

        let mbps = measurer.measure(tx, &CancellationToken::new()).await.unwrap();

        assert_eq!(transport.chunks_started(), 5);
        assert!((mbps - 80.0).abs() < 0.1, "got {mbps}");
        let samples = collect(rx).await;
        assert!(samples.windows(2).all(|w| w[1].bytes >= w[0].bytes));
        assert!(samples.last().unwrap().bytes <= 52_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn single_long_chunk_finishes_immediately() {
        let (transport, measurer) =
            measurer(FakeTransport::new().uploads([Chunk::new(8000, 10_000_000)]), Direction::Upload);
        let (tx, _rx) = mpsc::channel(1024);

        let mbps = measurer.measure(tx, &CancellationToken::new()).await.unwrap();

        assert_eq!(transport.chunks_started(), 1);
        assert!((mbps - 10.0).abs() < 0.01, "got {mbps}");
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_throttled_under_frequent_events() {
        let chunk = Chunk::new(2000, 4_000_000).steps(2000);
        let (_, measurer) = measurer(FakeTransport::new().downloads([chunk]), Direction::Download);
        let (tx, rx) = mpsc::channel(1024);

        measurer.measure(tx, &CancellationToken::new()).await.unwrap();

        let samples = collect(rx).await;
        assert!(samples.len() >= 30, "only {} samples", samples.len());
        for pair in samples.windows(2) {
            assert!(pair[1].elapsed_secs - pair[0].elapsed_secs >= 0.15 - 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_chunk_never_yields_throughput() {
        let (transport, measurer) =
            measurer(FakeTransport::new().downloads([Chunk::new(2000, 10_000_000)]), Direction::Download);
        let (tx, _rx) = mpsc::channel(1024);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3000)).await;
            trigger.cancel();
        });

        let outcome = measurer.measure(tx, &cancel).await;
        assert_eq!(outcome, Err(MeasureError::Cancelled));
        assert_eq!(transport.chunks_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_chunk_aborts_run() {
        let transport = FakeTransport::new().downloads([
            Chunk::new(1000, 10_000_000),
            Chunk::failing(500, "connection reset"),
            Chunk::new(1000, 10_000_000),
        ]);
        let (transport, measurer) = measurer(transport, Direction::Download);
        let (tx, _rx) = mpsc::channel(1024);

        let outcome = measurer.measure(tx, &CancellationToken::new()).await;
        assert_eq!(outcome, Err(MeasureError::Transport("connection reset".into())));
        assert_eq!(transport.chunks_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_chunk_means_no_connectivity() {
        let (_, measurer) =
            measurer(FakeTransport::new().uploads([Chunk::new(300, 0)]), Direction::Upload);
        let (tx, _rx) = mpsc::channel(1024);

        let outcome = measurer.measure(tx, &CancellationToken::new()).await;
        assert_eq!(outcome, Err(MeasureError::NoConnectivity));
    }
}
