use crate::speedtest::transport::Transport;
use crate::speedtest::{Orchestrator, Snapshot, TestPhase};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct App {
    pub snapshot: Snapshot,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::default(),
            should_quit: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.phase.is_running()
    }

    /// Copies the latest orchestrator state if it changed since the last frame.
    pub fn refresh(&mut self, state_rx: &mut watch::Receiver<Snapshot>) {
        if state_rx.has_changed().unwrap_or(false) {
            self.snapshot = state_rx.borrow_and_update().clone();
        }
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if self.is_running() {
                    Some(AppAction::StopTest)
                } else {
                    Some(AppAction::StartTest)
                }
            }
            KeyCode::Esc => {
                if self.is_running() {
                    Some(AppAction::StopTest)
                } else {
                    None
                }
            }
            KeyCode::Char('r') => match self.snapshot.phase {
                TestPhase::Error(_) => Some(AppAction::StartTest),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    StartTest,
    StopTest,
}

/// Clears the previous run's results and starts a new run in the background.
/// Returns `None` when a run is already in flight.
pub fn launch_test<T: Transport + 'static>(orchestrator: &Arc<Orchestrator<T>>) -> Option<JoinHandle<()>> {
    if let Err(err) = orchestrator.reset() {
        tracing::warn!(error = %err, "start ignored");
        return None;
    }

    let orchestrator = Arc::clone(orchestrator);
    Some(tokio::spawn(async move {
        if let Err(err) = orchestrator.start().await {
            tracing::warn!(error = %err, "start ignored");
        }
    }))
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
