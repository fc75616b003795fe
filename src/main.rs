mod age;
mod app;
mod config;
mod constants;
mod feed;
mod input;
mod mpv;
mod player;
mod theme;
mod ui;
mod widget;
mod youtube;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use constants::constants;
use mpv::MpvWidgetFactory;
use player::PlaybackController;
use widget::ScriptGate;
use youtube::ResultFetcher;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// ISO-3166 region for the trending chart (e.g. 'US', 'IN'); overrides prefs.toml
  #[arg(short, long)]
  region: Option<String>,

  /// Skip loading the category shelves on start-up
  #[arg(long)]
  no_feed: bool,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

// --- Logging ---

/// Log to a daily rolling file; the terminal belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
  let dir = config::log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "musictube.log"));
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musictube=info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Ok(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "musictube", &mut std::io::stdout());
    return Ok(());
  }

  let _guard = init_logging()?;
  info!(version = env!("CARGO_PKG_VERSION"), "starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args).await;
  ratatui::restore();
  if let Err(ref e) = result {
    let msg = format!("{:#}", e);
    tracing::error!(err = %msg, "exited with error");
  }
  result
}

async fn run(terminal: &mut DefaultTerminal, args: Args) -> Result<()> {
  let config = Config::load();
  let region = config::resolve_region(args.region.as_deref(), &config);
  let api_key = config::api_key();
  if api_key.is_none() {
    warn!(var = %constants().api_key_env, "no API key in environment; every fetch will fail");
  }
  let fetcher = Arc::new(ResultFetcher::new(Client::new(), api_key, region));
  info!(region = %fetcher.region_code(), max_results = fetcher.max_results(), "fetcher configured");

  let mount = std::env::temp_dir().join(format!("musictube-mpv-{}.sock", std::process::id()));
  let mount = mount.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
  let player = PlaybackController::new(MpvWidgetFactory::default(), ScriptGate::global(), mount);

  let mut app = App::new(fetcher, player, config);
  if !args.no_feed {
    app.trigger_feed();
  }

  loop {
    app.check_pending().await;
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key).await;
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.shutdown().await;
  info!("shutdown complete");
  Ok(())
}
