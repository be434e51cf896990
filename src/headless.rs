use crate::speedtest::transport::Transport;
use crate::speedtest::{Orchestrator, Snapshot, TestPhase};
use crate::ui::format_metric;
use anyhow::{bail, Result};
use std::future::Future;
use std::sync::Arc;

/// Runs one measurement without the terminal UI. Phase changes and results are
/// printed as they happen; Ctrl-C stops the run.
pub async fn run<T: Transport + 'static>(orchestrator: Arc<Orchestrator<T>>, json: bool) -> Result<()> {
    run_until_interrupted(orchestrator, json, tokio::signal::ctrl_c).await
}

async fn run_until_interrupted<T, F, Fut>(orchestrator: Arc<Orchestrator<T>>, json: bool, mut interrupt: F) -> Result<()>
where
    T: Transport + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut state_rx = orchestrator.subscribe();
    let mut previous = orchestrator.snapshot();

    let mut runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.start().await })
    };

    let pending = interrupt();
    tokio::pin!(pending);
    let mut armed = true;

    loop {
        tokio::select! {
            outcome = &mut runner => {
                outcome??;
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = state_rx.borrow_and_update().clone();
                if !json {
                    for line in report_changes(&previous, &next) {
                        println!("{}", line);
                    }
                }
                previous = next;
            }
            signal = &mut pending, if armed => match signal {
                Ok(()) => {
                    tracing::info!("interrupt received, stopping");
                    orchestrator.stop();
                    pending.set(interrupt());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "cannot listen for interrupts");
                    armed = false;
                }
            },
        }
    }

    let snap = orchestrator.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snap.result)?);
    } else {
        for line in report_changes(&previous, &snap) {
            println!("{}", line);
        }
    }

    match snap.phase {
        TestPhase::Error(message) => bail!("speed test failed: {}", message),
        TestPhase::Idle => {
            eprintln!("speed test cancelled");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Lines describing what changed between two snapshots: a newly entered phase
/// or a newly finished measurement. Live speed updates are not reported.
fn report_changes(prev: &Snapshot, next: &Snapshot) -> Vec<String> {
    let mut lines = Vec::new();

    let fields = [
        ("download", prev.result.download, next.result.download, "Mbps"),
        ("upload", prev.result.upload, next.result.upload, "Mbps"),
        ("ping", prev.result.ping, next.result.ping, "ms"),
    ];
    for (label, before, after, unit) in fields {
        if let (None, Some(value)) = (before, after) {
            lines.push(format!("{:<9}{}", label, format_metric(value, unit)));
        }
    }

    if prev.phase != next.phase {
        match &next.phase {
            TestPhase::MeasuringDownload => lines.push("measuring download...".to_string()),
            TestPhase::MeasuringUpload => lines.push("measuring upload...".to_string()),
            TestPhase::MeasuringPing => lines.push("measuring latency...".to_string()),
            TestPhase::Done => lines.push("done".to_string()),
            TestPhase::Error(message) => lines.push(format!("error: {}", message)),
            TestPhase::Idle => {}
        }
    }

    lines
}
