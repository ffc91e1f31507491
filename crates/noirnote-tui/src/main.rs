mod app;
mod clock;
mod config;
mod leaderboard;
mod render;
mod session;
mod stats;
mod store;
mod theme;

use app::App;
use clap::Parser;
use clock::{Clock, SystemClock};
use config::{AppConfig, Cli};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use session::{SessionConfig, SessionController, SessionError};
use stats::StatsAggregator;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::PersistenceGateway;

fn main() -> ExitCode {
    let config = AppConfig::from_cli(Cli::parse());

    if let Err(e) = config::init_logging(&config) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let app = match build_app(&config) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            if let Some(SessionError::NotAuthenticated) = e.downcast_ref::<SessionError>() {
                eprintln!("Pass --player <id> or set NOIRNOTE_PLAYER.");
            }
            return ExitCode::FAILURE;
        }
    };

    match run_terminal(app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("terminal error: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wire the catalog, store and session together before touching the terminal
fn build_app(config: &AppConfig) -> Result<App, Box<dyn std::error::Error>> {
    let catalog = Arc::new(config.load_catalog()?);
    let case_id = match &config.case_id {
        Some(id) => id.clone(),
        None => catalog
            .first()
            .map(|case| case.id.clone())
            .ok_or("the case catalog is empty")?,
    };

    let backend = store::create_backend(config.environment, &config.data_dir);
    let gateway = Arc::new(PersistenceGateway::new(backend));
    if config.offline {
        gateway.set_network_enabled(false);
    }
    log::info!(
        "starting on {} with the {} store ({:?})",
        case_id,
        gateway.backend_name(),
        config.environment
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session_config = SessionConfig::default();
    let stats = StatsAggregator::new(gateway, catalog, clock.clone());
    let session = SessionController::open(
        config.player.clone(),
        &case_id,
        stats,
        clock.clone(),
        session_config,
    )?;

    Ok(App::new(session, clock, session_config))
}

fn run_terminal(mut app: App) -> io::Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let result = run_app(&mut stdout, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen)?;

    let pending = app.session.gateway().pending_writes();
    if pending > 0 {
        log::warn!("exiting with {} writes not yet delivered", pending);
        eprintln!("{} changes were saved locally but not synced", pending);
    }

    result
}

fn run_app(stdout: &mut io::Stdout, app: &mut App) -> io::Result<()> {
    let mut last_tick = Instant::now();

    loop {
        let tick_rate = app.get_tick_rate();

        // Render
        render::render(stdout, app)?;
        stdout.flush()?;

        // Handle input with timeout for the timer display
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout.min(Duration::from_millis(100)))? {
            if let Event::Key(key) = event::read()? {
                // Handle Ctrl+C
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    app.session.flush_board();
                    break;
                }

                match app.handle_key(key) {
                    app::AppAction::Continue => {}
                    app::AppAction::Quit => break,
                }
            }
        }

        // Tick timers and debounced saves
        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }
    }

    Ok(())
}
