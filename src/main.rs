use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};

mod api;
mod app;
mod codec;
mod config;
mod events;
mod gateway;
mod logging;
mod model;
mod navigation;
mod render;
mod session;
mod theme;
mod timer;
mod ui;

use api::{ApiError, AttemptApi, HttpAttemptApi};
use app::App;
use codec::AnswerShape;
use config::{ClientConfig, ConfigError};
use events::AppEvent;
use gateway::AttemptGateway;
use session::{LaunchMetadata, LoadFailure, Phase, Session};
use theme::Theme;

const MAX_GATEWAY_EVENTS_PER_LOOP: usize = 128;
const THEME_FILE: &str = "theme.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal client for a timed exam attempt")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<CliCommand>,

    /// Attempt to open.
    attempt_id: Option<u64>,

    /// Server base URL, overrides `server.base_url`.
    #[arg(long)]
    server: Option<String>,

    /// Value of the `session` cookie, overrides `server.session_cookie`.
    #[arg(long)]
    cookie: Option<String>,

    /// Config file to use instead of `~/.attempt-tui/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Attempt duration in seconds.
    #[arg(long)]
    duration: Option<u64>,

    #[arg(long)]
    started_at: Option<String>,

    #[arg(long)]
    finished_at: Option<String>,

    #[arg(long)]
    variant: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print the answer layout used for a task display number.
    Layout { number: u32 },
}

#[derive(Debug, Error)]
enum LaunchError {
    #[error("missing attempt id; usage: attempt-tui <ATTEMPT_ID>")]
    MissingAttemptId,
    #[error("{0}")]
    Client(#[from] ApiError),
    #[error("{0}")]
    Load(#[from] LoadFailure),
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("attempt-tui: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LaunchError> {
    if let Some(CliCommand::Layout { number }) = cli.command {
        println!("KIM № {number}: {}", AnswerShape::resolve(None, number).label());
        return Ok(());
    }
    let attempt_id = cli.attempt_id.ok_or(LaunchError::MissingAttemptId)?;

    let (config, config_error) = load_config(cli.config.as_deref());
    let log_path = logging::init(&config.logging);
    info!(attempt_id, log = ?log_path, "attempt-tui starting");
    if let Some(err) = config_error {
        warn!(error = %err, "failed to load config; using defaults");
    }

    let mut server = config.server.clone();
    if let Some(base_url) = cli.server {
        server.base_url = base_url;
    }
    if let Some(cookie) = cli.cookie {
        server.session_cookie = cookie;
    }
    let api = Arc::new(HttpAttemptApi::new(&server)?);
    info!(server = api.base_url(), "using attempt server");

    let launch = LaunchMetadata {
        attempt_id,
        variant_id: cli.variant,
        duration_secs: cli.duration.unwrap_or(config.exam.duration_secs),
        started_at: cli.started_at,
        finished_at: cli.finished_at,
    };
    let mut session = Session::initialize(launch, api.as_ref()).inspect_err(|err| {
        error!(attempt_id, error = %err, "attempt failed to load");
    })?;

    let api: Arc<dyn AttemptApi> = api;
    let gateway = AttemptGateway::new(api, attempt_id, config.autosave.overlap);
    if session.phase() == Phase::Finished {
        session.request_results(&gateway);
    }
    let mut app = App::new(session, gateway.results_page_url());
    let theme = Theme::load_or_default(
        config::config_dir()
            .map(|dir| dir.join(THEME_FILE))
            .unwrap_or_else(|_| PathBuf::from(THEME_FILE)),
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    let result = run_app(&mut terminal, &mut app, &gateway, &theme);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    if gateway.is_saving() {
        warn!("exiting with an answer save still in flight");
    }
    info!(phase = ?app.session().phase(), "attempt-tui exiting");
    result.map_err(LaunchError::from)
}

fn load_config(path: Option<&Path>) -> (ClientConfig, Option<ConfigError>) {
    match ClientConfig::load(path) {
        Ok(config) => (config, None),
        Err(err) => (ClientConfig::default(), Some(err)),
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    gateway: &AttemptGateway,
    theme: &Theme,
) -> io::Result<()> {
    while app.running {
        for event in gateway.drain_events_limited(MAX_GATEWAY_EVENTS_PER_LOOP) {
            app.on_gateway_event(event, gateway);
        }
        app.on_clock(Utc::now(), Instant::now(), gateway);

        terminal.draw(|frame| ui::render(frame, app, theme))?;

        match events::next_event()? {
            AppEvent::MouseLeftClick(x, y) => {
                let size = terminal.size()?;
                let screen = Rect::new(0, 0, size.width, size.height);
                if let Some(entry) = ui::sidebar_entry_at(screen, app, x, y) {
                    app.open_entry(entry, gateway);
                }
            }
            event => app.handle_event(event, gateway),
        }
    }
    Ok(())
}
