mod app;
mod headless;
mod settings;
mod speedtest;
mod ui;

use anyhow::Result;
use app::{launch_test, poll_event, App, AppAction};
use clap::Parser;
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use settings::Settings;
use speedtest::transport::HttpTransport;
use speedtest::Orchestrator;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

#[derive(Parser)]
#[command(
    name = "cfspeed",
    about = "Measure latency, download and upload speed against Cloudflare",
    version,
    long_about = None
)]
struct Cli {
    /// Run a single test without the terminal UI and print the results
    #[arg(long)]
    headless: bool,

    /// Print the final result as JSON
    #[arg(long, requires = "headless")]
    json: bool,

    /// Write logs to this file (the terminal UI does not log otherwise)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let orchestrator = Arc::new(Orchestrator::cloudflare(&Settings::default())?);

    if cli.headless {
        return headless::run(orchestrator, cli.json).await;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, orchestrator).await;

    ratatui::restore();
    result
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = &cli.log_file {
        let file = std::fs::File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if cli.headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, orchestrator: Arc<Orchestrator<HttpTransport>>) -> Result<()> {
    let mut app = App::new();
    let mut state_rx = orchestrator.subscribe();

    loop {
        app.refresh(&mut state_rx);
        terminal.draw(|frame| draw_ui(frame, &app))?;

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => {
                        orchestrator.stop();
                        break;
                    }
                    AppAction::StartTest => {
                        launch_test(&orchestrator);
                    }
                    AppAction::StopTest => orchestrator.stop(),
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
