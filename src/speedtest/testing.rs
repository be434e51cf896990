use super::transport::Transport;
use super::{Direction, MeasureError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum Ping {
    Status { after: Duration, status: u16 },
    Fail { after: Duration },
}

impl Ping {
    pub fn ok_ms(ms: u64) -> Self {
        Ping::Status { after: Duration::from_millis(ms), status: 200 }
    }

    pub fn status_ms(ms: u64, status: u16) -> Self {
        Ping::Status { after: Duration::from_millis(ms), status }
    }

    pub fn fail_ms(ms: u64) -> Self {
        Ping::Fail { after: Duration::from_millis(ms) }
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub duration: Duration,
    pub bytes: u64,
    pub steps: u32,
    pub error: Option<String>,
}

impl Chunk {
    pub fn new(duration_ms: u64, bytes: u64) -> Self {
        Self {
            duration: Duration::from_millis(duration_ms),
            bytes,
            steps: 4,
            error: None,
        }
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn failing(duration_ms: u64, message: &str) -> Self {
        Self {
            duration: Duration::from_millis(duration_ms),
            bytes: 0,
            steps: 1,
            error: Some(message.to_string()),
        }
    }
}

/// Transport that replays scripted pings and chunks on tokio's clock. When a
/// direction's script runs dry its last chunk repeats.
#[derive(Default)]
pub struct FakeTransport {
    pings: Mutex<VecDeque<Ping>>,
    downloads: Mutex<VecDeque<Chunk>>,
    uploads: Mutex<VecDeque<Chunk>>,
    chunks_started: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pings(self, pings: impl IntoIterator<Item = Ping>) -> Self {
        self.pings.lock().unwrap().extend(pings);
        self
    }

    pub fn downloads(self, chunks: impl IntoIterator<Item = Chunk>) -> Self {
        self.downloads.lock().unwrap().extend(chunks);
        self
    }

    pub fn uploads(self, chunks: impl IntoIterator<Item = Chunk>) -> Self {
        self.uploads.lock().unwrap().extend(chunks);
        self
    }

    pub fn chunks_started(&self) -> usize {
        self.chunks_started.load(Ordering::SeqCst)
    }

    fn next_chunk(&self, direction: Direction) -> Chunk {
        let mut script = match direction {
            Direction::Download => self.downloads.lock().unwrap(),
            Direction::Upload => self.uploads.lock().unwrap(),
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("no chunk scripted")
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn ping(&self) -> Result<u16, MeasureError> {
        let ping = self
            .pings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ping::Fail { after: Duration::from_millis(1) });
        match ping {
            Ping::Status { after, status } => {
                tokio::time::sleep(after).await;
                Ok(status)
            }
            Ping::Fail { after } => {
                tokio::time::sleep(after).await;
                Err(MeasureError::Transport("request timed out".into()))
            }
        }
    }

    async fn transfer_chunk(
        &self,
        direction: Direction,
        _chunk_size: usize,
        moved: mpsc::UnboundedSender<u64>,
    ) -> Result<u64, MeasureError> {
        let chunk = self.next_chunk(direction);
        self.chunks_started.fetch_add(1, Ordering::SeqCst);

        let step = chunk.duration / chunk.steps;
        for i in 1..=u64::from(chunk.steps) {
            tokio::time::sleep(step).await;
            let _ = moved.send(chunk.bytes * i / u64::from(chunk.steps));
        }

        match chunk.error {
            Some(message) => Err(MeasureError::Transport(message)),
            None => Ok(chunk.bytes),
        }
    }
}
