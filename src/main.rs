use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseButton,
    MouseEventKind,
};
use crossterm::execute;
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod actions;
mod app;
mod config;
mod controller;
mod error;
mod exam;
mod notify;
mod status;

use actions::Action;
use app::App;
use config::Config;
use controller::PollController;
use error::MonitorError;
use exam::{parse_sessions, HttpSnapshotSource, SnapshotSource, StaticSnapshotSource};
use notify::{
    LogSurface, NotificationDispatcher, Overlay, RodioToneSynth, SystemNotifier, TerminalTitle,
};

/// Watch an exam booking page and raise an alarm the moment a session opens up
#[derive(Debug, Parser)]
#[command(name = "slot-sentry", version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/slot-sentry/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Booking page to monitor; overrides monitor.url
    #[arg(short, long)]
    url: Option<String>,

    /// Check once, print what was found, and exit
    #[arg(long)]
    dry_run: bool,

    /// Print the dry-run result as JSON
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Use a built-in page with one bookable session instead of the network
    #[arg(long)]
    mock: bool,

    /// Run without the terminal UI and log status changes instead
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.url.clone() {
        config.monitor.url = Some(url);
    }

    init_logging(&config, cli.headless || cli.dry_run)?;

    let source = build_source(&cli, &config)?;

    if cli.dry_run {
        return dry_run(source.as_ref(), cli.json).await;
    }

    if cli.headless {
        run_headless(config, source).await
    } else {
        run_tui(config, source).await
    }
}

/// Log file always; stdout too when no TUI owns the terminal
fn init_logging(config: &Config, to_stdout: bool) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
    let stdout_layer = to_stdout.then(|| fmt::layer().with_writer(std::io::stdout));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    info!("Logging to {}", path.display());
    Ok(())
}

fn build_source(cli: &Cli, config: &Config) -> Result<Box<dyn SnapshotSource>> {
    if cli.mock {
        info!("Using the built-in mock page");
        return Ok(Box::new(StaticSnapshotSource::mock()));
    }

    let url = config.monitor.url.as_deref().ok_or(MonitorError::MissingUrl)?;
    Ok(Box::new(HttpSnapshotSource::new(url, config.request_timeout())?))
}

fn build_dispatcher(config: &Config, title: TerminalTitle) -> NotificationDispatcher {
    NotificationDispatcher::new(
        &config.alerts,
        Box::new(RodioToneSynth::new()),
        Box::new(title),
        Box::new(SystemNotifier),
    )
}

/// Without a TUI, stdout carries the log stream, so title escapes stay out
fn headless_config(mut config: Config) -> Config {
    if config.alerts.title_flash {
        info!("Title flashing is disabled in headless mode");
        config.alerts.title_flash = false;
    }
    config
}

async fn dry_run(source: &dyn SnapshotSource, json: bool) -> Result<()> {
    info!("Dry run against {}", source.describe());
    let snapshot = source
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch {}", source.describe()))?;
    let sessions = parse_sessions(&snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        warn!("No session rows found on the page");
    }

    for (i, session) in sessions.iter().enumerate() {
        let marker = if session.is_available() {
            "AVAILABLE"
        } else {
            "SOLD OUT"
        };
        println!(
            "{:03}. [{}] {} | {}",
            i + 1,
            marker,
            session.description,
            session.price_student
        );
        if session.has_last_spots() {
            println!("     ! {}", session.note);
        }
        if let Some(ref url) = session.purchase_url {
            println!("     -> {}", url);
        }
    }

    let available = sessions.iter().filter(|s| s.is_available()).count();
    let sold_out = sessions.iter().filter(|s| s.is_sold_out()).count();
    println!("Available: {} | Sold out: {}", available, sold_out);
    Ok(())
}

async fn run_tui(config: Config, source: Box<dyn SnapshotSource>) -> Result<()> {
    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Initialize terminal
    let mut terminal = ratatui::init();
    execute!(std::io::stdout(), EnableMouseCapture)?;

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        let _ = input_tx.send(Action::KeyPress(key));
                    }
                    Ok(Event::Mouse(mouse)) => {
                        if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                            let _ = input_tx.send(Action::Click {
                                column: mouse.column,
                                row: mouse.row,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
    });

    let overlay = Rc::new(RefCell::new(Overlay::default()));
    let title = TerminalTitle::new(config.alerts.idle_title.clone());
    title.show_idle();
    let dispatcher = build_dispatcher(&config, title);
    let mut controller = PollController::new(
        config,
        source,
        Box::new(overlay.clone()),
        dispatcher,
        tx.clone(),
    );
    let mut app = App::new(overlay);

    controller.start();

    // Main event loop
    let result = loop {
        if let Err(e) = terminal.draw(|f| app.render(f, &controller)) {
            break Err(e.into());
        }

        let Some(action) = rx.recv().await else {
            break Ok(());
        };

        match action {
            Action::Timer(fired) => controller.handle_timer(fired),
            Action::Fetched(done) => controller.handle_fetch(done),
            action => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
        }

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::ForceRefresh => {
                    if !controller.force_refresh() {
                        app.message = Some("Alert active: press R to reload".to_string());
                    }
                }
                Action::Reload => {
                    controller.reload();
                    app.message = Some("Monitor reloaded".to_string());
                }
                Action::CopyPurchaseLink => {
                    app.message = Some(copy_purchase_link(&controller));
                }
                _ => {}
            }
        }
    };

    // Restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    result
}

fn copy_purchase_link(controller: &PollController) -> String {
    let link = controller
        .available()
        .iter()
        .chain(controller.sessions())
        .filter(|s| s.is_available())
        .find_map(|s| s.purchase_url.clone());

    let Some(link) = link else {
        return "No purchase link to copy".to_string();
    };

    match arboard::Clipboard::new() {
        Ok(mut clipboard) => match clipboard.set_text(&link) {
            Ok(()) => format!("Copied {}", link),
            Err(e) => format!("Clipboard error: {}", e),
        },
        Err(e) => format!("Clipboard error: {}", e),
    }
}

async fn run_headless(config: Config, source: Box<dyn SnapshotSource>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    let config = headless_config(config);
    let title = TerminalTitle::new(config.alerts.idle_title.clone());
    let dispatcher = build_dispatcher(&config, title);
    let mut controller = PollController::new(
        config,
        source,
        Box::new(LogSurface::default()),
        dispatcher,
        tx,
    );

    controller.start();

    loop {
        tokio::select! {
            Some(action) = rx.recv() => match action {
                Action::Timer(fired) => controller.handle_timer(fired),
                Action::Fetched(done) => controller.handle_fetch(done),
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "slot-sentry",
            "--url",
            "https://example.org/toeic",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("https://example.org/toeic"));
        assert!(cli.dry_run && cli.json);
        assert!(!cli.mock && !cli.headless);
    }

    #[test]
    fn test_json_requires_dry_run() {
        assert!(Cli::try_parse_from(["slot-sentry", "--json"]).is_err());
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let cli = Cli::try_parse_from(["slot-sentry"]).unwrap();
        let err = build_source(&cli, &Config::default()).err().unwrap();
        assert!(err.downcast_ref::<MonitorError>().is_some());
    }

    #[test]
    fn test_mock_needs_no_url() {
        let cli = Cli::try_parse_from(["slot-sentry", "--mock"]).unwrap();
        let source = build_source(&cli, &Config::default()).unwrap();
        assert!(!source.describe().is_empty());
    }

    #[test]
    fn test_headless_turns_title_flashing_off() {
        let config = headless_config(Config::default());
        assert!(!config.alerts.title_flash);
        assert!(config.alerts.visual && config.alerts.sound);
    }

    #[tokio::test]
    async fn test_dry_run_over_mock_page() {
        let source = StaticSnapshotSource::mock();
        dry_run(&source, false).await.unwrap();
        dry_run(&source, true).await.unwrap();
    }
}
