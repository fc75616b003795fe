use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::feed::{Category, CategorySource, FetchOutcome, FetchRequest, ResultSets, SEARCH_KEY, Shelf, run_fetches};
use crate::mpv::MpvWidgetFactory;
use crate::player::{PlaybackController, PlaybackState};
use crate::theme::THEMES;
use crate::youtube::{ResultFetcher, SearchResult};

/// Title shown in the player bar when the selection has none.
pub const FALLBACK_TITLE: &str = "Now Playing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Typing in the search box.
  Input,
  /// Moving between shelves and cards.
  Browse,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub categories: Vec<Category>,
  pub results: ResultSets,
  /// Focused shelf, indexing into `shelves()`.
  pub shelf_index: usize,
  /// Focused card within the focused shelf.
  pub card_index: usize,
  pub player: PlaybackController<MpvWidgetFactory>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  pub should_quit: bool,
  config: Config,
  fetcher: Arc<ResultFetcher>,
  outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
  outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
  /// When the last error was set; used for auto-dismiss.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(fetcher: Arc<ResultFetcher>, player: PlaybackController<MpvWidgetFactory>, config: Config) -> Self {
    let theme_index =
      if let Some(ref name) = config.theme_name { THEMES.iter().position(|t| t.name == name.as_str()).unwrap_or(0) } else { 0 };
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      theme_index,
      categories: constants().categories.clone(),
      results: ResultSets::default(),
      shelf_index: 0,
      card_index: 0,
      player,
      last_error: None,
      status_message: None,
      should_quit: false,
      config,
      fetcher,
      outcome_tx,
      outcome_rx,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static crate::theme::Theme {
    // theme_index stays in range: next_theme() wraps it and new() takes it from position().
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  /// Clear the current error message and its expiry timer.
  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages once they have been up long enough.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_banner_secs)
    {
      self.clear_error();
    }
  }

  // --- Shelves & focus ---

  pub fn shelves(&self) -> Vec<Shelf<'_>> {
    self.results.shelves(&self.categories)
  }

  /// The card under the cursor, if any shelf has arrived.
  pub fn focused(&self) -> Option<&SearchResult> {
    self.shelves().get(self.shelf_index).map(|shelf| shelf.results).and_then(|results| results.get(self.card_index))
  }

  /// Keep the focus inside whatever shelves currently exist.
  pub fn clamp_focus(&mut self) {
    let lens: Vec<usize> = self.shelves().iter().map(|s| s.results.len()).collect();
    if lens.is_empty() {
      self.shelf_index = 0;
      self.card_index = 0;
      return;
    }
    self.shelf_index = self.shelf_index.min(lens.len() - 1);
    self.card_index = self.card_index.min(lens[self.shelf_index].saturating_sub(1));
  }

  pub fn next_card(&mut self) {
    let count = self.shelves().get(self.shelf_index).map_or(0, |s| s.results.len());
    if count > 0 {
      self.card_index = (self.card_index + 1) % count;
    }
  }

  pub fn prev_card(&mut self) {
    let count = self.shelves().get(self.shelf_index).map_or(0, |s| s.results.len());
    if count > 0 {
      self.card_index = if self.card_index == 0 { count - 1 } else { self.card_index - 1 };
    }
  }

  pub fn next_shelf(&mut self) {
    let count = self.shelves().len();
    if count > 0 {
      self.shelf_index = (self.shelf_index + 1) % count;
      self.card_index = 0;
    }
  }

  pub fn prev_shelf(&mut self) {
    let count = self.shelves().len();
    if count > 0 {
      self.shelf_index = if self.shelf_index == 0 { count - 1 } else { self.shelf_index - 1 };
      self.card_index = 0;
    }
  }

  /// Title for the player bar.
  pub fn now_playing_title(&self) -> &str {
    match self.player.selection() {
      Some(sel) if !sel.title.trim().is_empty() => sel.title.as_str(),
      Some(sel) => self.results.find(&sel.external_id).map_or(FALLBACK_TITLE, |r| r.title.as_str()),
      None => FALLBACK_TITLE,
    }
  }

  // --- Fetching ---

  /// Fire one fetch per configured category. Shelves appear as their fetches land.
  pub fn trigger_feed(&mut self) {
    let requests: Vec<FetchRequest> = self
      .categories
      .iter()
      .map(|c| FetchRequest { key: c.key.clone(), generation: self.results.begin(&c.key), source: c.source.clone() })
      .collect();
    if requests.is_empty() {
      return;
    }
    info!(shelves = requests.len(), "feed triggered");
    self.status_message = Some("Loading music…".to_string());
    self.dispatch(requests);
  }

  pub fn trigger_search(&mut self) {
    let query = self.input.trim().to_string();
    if query.is_empty() {
      self.set_error("Enter a search term.".to_string());
      return;
    }
    info!(query = %query, "search triggered");
    self.clear_error();
    self.status_message = Some(format!("Searching '{}'…", query));
    let generation = self.results.begin(SEARCH_KEY);
    self.dispatch(vec![FetchRequest { key: SEARCH_KEY.to_string(), generation, source: CategorySource::Query(query) }]);
  }

  fn dispatch(&self, requests: Vec<FetchRequest>) {
    let fetcher = Arc::clone(&self.fetcher);
    let tx = self.outcome_tx.clone();
    tokio::spawn(async move {
      run_fetches(fetcher, requests, tx).await;
    });
  }

  fn label_for(&self, key: &str) -> String {
    if key == SEARCH_KEY {
      return "search results".to_string();
    }
    self.categories.iter().find(|c| c.key == key).map_or_else(|| key.to_string(), |c| c.label.clone())
  }

  /// Store one fetch outcome. Failures become an empty shelf plus a banner.
  pub fn apply_outcome(&mut self, outcome: FetchOutcome) {
    let FetchOutcome { key, generation, result } = outcome;
    let (results, error) = match result {
      Ok(results) => (results, None),
      Err(e) => (Vec::new(), Some(e)),
    };
    let count = results.len();
    if !self.results.apply(&key, generation, results) {
      debug!(key = %key, generation, "fetch superseded, dropping outcome");
      return;
    }

    match error {
      Some(e) => {
        warn!(key = %key, kind = e.kind(), err = %e, "fetch failed");
        let label = self.label_for(&key);
        self.set_error(format!("Couldn't load {}: {}", label, e));
      }
      None => {
        info!(key = %key, count, "fetch complete");
        if key == SEARCH_KEY {
          if count == 0 {
            self.set_error("No results found.".to_string());
          } else {
            self.shelf_index = self.shelves().iter().position(|s| s.key == SEARCH_KEY).unwrap_or(0);
            self.card_index = 0;
            self.mode = AppMode::Browse;
          }
        }
      }
    }

    if !self.results.any_pending() {
      self.status_message = None;
    }
    self.clamp_focus();
  }

  /// Drain finished fetches and widget events. Called once per UI tick.
  pub async fn check_pending(&mut self) {
    while let Ok(outcome) = self.outcome_rx.try_recv() {
      self.apply_outcome(outcome);
    }

    if self.player.poll_events().await
      && self.player.state() == PlaybackState::Idle
      && let Some(failure) = self.player.last_failure()
    {
      let msg = format!("Playback stopped: {}", failure);
      self.set_error(msg);
    }
  }

  // --- Playback ---

  /// Hand the focused card to the player.
  pub async fn play_focused(&mut self) {
    let Some(card) = self.focused() else { return };
    let (id, title) = (card.external_id.clone(), card.title.clone());
    self.clear_error();
    if let Err(e) = self.player.select(&id, &title).await {
      self.set_error(format!("Playback unavailable: {}", e));
    }
  }

  /// Tear down playback before the terminal is restored.
  pub async fn shutdown(self) {
    self.player.dispose().await;
  }

  pub async fn toggle_playback(&mut self) {
    if let Err(e) = self.player.toggle_playback().await {
      self.set_error(format!("Pause error: {}", e));
    }
  }
}
