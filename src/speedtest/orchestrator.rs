use super::ping::LatencySampler;
use super::transfer::TransferMeasurer;
use super::transport::{HttpTransport, Transport};
use super::{AlreadyRunning, Direction, MeasureError, MeasurementResult, TestPhase, TransferSample};
use crate::settings::Settings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Everything an observer can see about the current run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub phase: TestPhase,
    pub result: MeasurementResult,
    /// Instantaneous Mbps while a transfer phase is running.
    pub live_speed: f64,
    /// Fraction of phases completed, 0.0 to 1.0.
    pub progress: f64,
}

/// Runs download, upload and ping in order and publishes state through a
/// `watch` channel. Only the orchestrator writes that state.
pub struct Orchestrator<T> {
    latency: LatencySampler<T>,
    download: TransferMeasurer<T>,
    upload: TransferMeasurer<T>,
    state: watch::Sender<Snapshot>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
}

impl Orchestrator<HttpTransport> {
    pub fn cloudflare(settings: &Settings) -> Result<Self, MeasureError> {
        let transport = Arc::new(HttpTransport::new(settings.ping_timeout)?);
        Ok(Self::new(transport, settings))
    }
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: Arc<T>, settings: &Settings) -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Self {
            latency: LatencySampler::new(Arc::clone(&transport), settings),
            download: TransferMeasurer::new(Arc::clone(&transport), Direction::Download, settings),
            upload: TransferMeasurer::new(transport, Direction::Upload, settings),
            state,
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clears state and runs a full measurement. Resolves when the run ends
    /// in `Done`, `Error` or, after `stop`, `Idle`.
    pub async fn start(&self) -> Result<(), AlreadyRunning> {
        let _guard = RunGuard::acquire(&self.running)?;

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        self.state.send_replace(Snapshot::default());
        tracing::info!("speed test started");

        match self.run_phases(&cancel).await {
            Ok(()) => {
                let result = self.state.borrow().result.clone();
                tracing::info!(
                    download_mbps = ?result.download,
                    upload_mbps = ?result.upload,
                    ping_ms = ?result.ping,
                    "speed test complete"
                );
            }
            Err(MeasureError::Cancelled) => {
                tracing::info!("speed test cancelled");
                self.state.send_modify(|s| s.phase = TestPhase::Idle);
            }
            Err(err) => {
                tracing::error!(error = %err, "speed test failed");
                self.state.send_modify(|s| s.phase = TestPhase::Error(err.to_string()));
            }
        }

        Ok(())
    }

    /// Requests cancellation of the current run without waiting for it.
    pub fn stop(&self) {
        tracing::debug!("stop requested");
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn reset(&self) -> Result<(), AlreadyRunning> {
        if self.is_running() {
            return Err(AlreadyRunning);
        }
        self.state.send_replace(Snapshot::default());
        Ok(())
    }

    async fn run_phases(&self, cancel: &CancellationToken) -> Result<(), MeasureError> {
        self.state.send_modify(|s| s.phase = TestPhase::MeasuringDownload);
        let download = self.run_transfer(&self.download, cancel).await?;
        self.state.send_modify(|s| {
            s.result.download = Some(download);
            s.progress = 1.0 / 3.0;
        });
        if cancel.is_cancelled() {
            return Err(MeasureError::Cancelled);
        }

        self.state.send_modify(|s| {
            s.phase = TestPhase::MeasuringUpload;
            s.live_speed = 0.0;
        });
        let upload = self.run_transfer(&self.upload, cancel).await?;
        self.state.send_modify(|s| {
            s.result.upload = Some(upload);
            s.progress = 2.0 / 3.0;
        });
        if cancel.is_cancelled() {
            return Err(MeasureError::Cancelled);
        }

        self.state.send_modify(|s| s.phase = TestPhase::MeasuringPing);
        let ping = self.latency.measure(cancel).await?;
        self.state.send_modify(|s| {
            s.result.ping = Some(ping);
            s.progress = 1.0;
            s.phase = TestPhase::Done;
        });

        Ok(())
    }

    /// Drives one transfer while forwarding its samples into `live_speed`.
    async fn run_transfer(
        &self,
        measurer: &TransferMeasurer<T>,
        cancel: &CancellationToken,
    ) -> Result<f64, MeasureError> {
        tracing::debug!(direction = measurer.direction().label(), "transfer phase started");
        let (progress_tx, mut progress_rx) = mpsc::channel::<TransferSample>(32);
        let measure = measurer.measure(progress_tx, cancel);
        tokio::pin!(measure);

        loop {
            tokio::select! {
                outcome = &mut measure => return outcome,
                Some(sample) = progress_rx.recv() => {
                    self.state.send_modify(|s| s.live_speed = sample.mbps());
                }
            }
        }
    }
}

/// Marks the orchestrator busy for the lifetime of one `start` call.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AlreadyRunning> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(AlreadyRunning);
        }
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
