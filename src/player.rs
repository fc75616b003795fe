use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::widget::{MediaState, PlayerWidget, ScriptGate, VideoWidgetFactory, WidgetError, WidgetEvent, WidgetSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
  /// No widget.
  Idle,
  /// Widget script loading or widget constructed but not ready yet.
  Loading,
  /// Widget accepts play/pause.
  Ready,
}

impl PlaybackState {
  pub fn label(self) -> &'static str {
    match self {
      PlaybackState::Idle => "idle",
      PlaybackState::Loading => "loading",
      PlaybackState::Ready => "ready",
    }
  }
}

/// The item currently chosen for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
  pub external_id: String,
  pub title: String,
}

/// Owns at most one live player widget and the local "is playing" flag.
pub struct PlaybackController<F: VideoWidgetFactory> {
  factory: F,
  gate: ScriptGate,
  mount: String,
  state: PlaybackState,
  selection: Option<Selection>,
  widget: Option<F::Widget>,
  events: Option<mpsc::UnboundedReceiver<WidgetEvent>>,
  playing: bool,
  autoplay: bool,
  last_failure: Option<WidgetError>,
}

impl<F: VideoWidgetFactory> PlaybackController<F> {
  pub fn new(factory: F, gate: ScriptGate, mount: impl Into<String>) -> Self {
    Self {
      factory,
      gate,
      mount: mount.into(),
      state: PlaybackState::Idle,
      selection: None,
      widget: None,
      events: None,
      playing: false,
      autoplay: true,
      last_failure: None,
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn is_playing(&self) -> bool {
    self.playing
  }

  pub fn selection(&self) -> Option<&Selection> {
    self.selection.as_ref()
  }

  pub fn last_failure(&self) -> Option<&WidgetError> {
    self.last_failure.as_ref()
  }

  /// Bind a fresh widget to `external_id`, destroying the current one first.
  ///
  /// Returns once the widget is constructed; it becomes `Ready` when its
  /// ready event is picked up by [`Self::poll_events`].
  pub async fn select(&mut self, external_id: &str, title: &str) -> Result<(), WidgetError> {
    self.teardown().await;
    self.selection = Some(Selection { external_id: external_id.to_string(), title: title.to_string() });
    self.last_failure = None;
    self.state = PlaybackState::Loading;
    info!(video_id = %external_id, script_loaded = self.gate.is_loaded(), "playback: selected");

    if let Err(e) = self.gate.ensure_loaded(&self.factory).await {
      return Err(self.fail(e));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let spec = WidgetSpec {
      mount: self.mount.clone(),
      video_id: external_id.to_string(),
      width: 0,
      height: 0,
      autoplay: self.autoplay,
    };
    match self.factory.construct(spec, tx).await {
      Ok(widget) => {
        self.widget = Some(widget);
        self.events = Some(rx);
        Ok(())
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Pause or resume. Does nothing unless the widget is `Ready`.
  pub async fn toggle_playback(&mut self) -> Result<(), WidgetError> {
    if self.state != PlaybackState::Ready {
      debug!(state = self.state.label(), "playback: toggle ignored");
      return Ok(());
    }
    let Some(widget) = self.widget.as_mut() else {
      return Ok(());
    };
    if self.playing {
      widget.pause().await?;
    } else {
      widget.play().await?;
    }
    self.playing = !self.playing;
    debug!(playing = self.playing, "playback: toggled");
    Ok(())
  }

  /// Skip controls are drawn but there is no queue behind them.
  pub fn skip_back(&self) {
    debug!("playback: skip back has no queue");
  }

  pub fn skip_forward(&self) {
    debug!("playback: skip forward has no queue");
  }

  /// Destroy the widget and clear the selection.
  pub async fn stop(&mut self) {
    if self.selection.is_some() {
      info!("playback: stopped");
    }
    self.teardown().await;
    self.selection = None;
  }

  /// Release the widget for good. Used when the UI shuts down.
  pub async fn dispose(mut self) {
    self.stop().await;
    debug!("playback: controller disposed");
  }

  /// Apply any events the widget has reported. Returns whether anything changed.
  pub async fn poll_events(&mut self) -> bool {
    let mut pending = Vec::new();
    if let Some(rx) = &mut self.events {
      while let Ok(event) = rx.try_recv() {
        pending.push(event);
      }
    }
    let mut changed = false;
    for event in pending {
      changed |= self.handle_event(event).await;
    }
    changed
  }

  async fn handle_event(&mut self, event: WidgetEvent) -> bool {
    match event {
      WidgetEvent::Ready => {
        if self.state != PlaybackState::Loading {
          return false;
        }
        self.state = PlaybackState::Ready;
        self.playing = self.autoplay;
        info!("playback: widget ready");
        true
      }
      WidgetEvent::StateChanged(MediaState::Ended) => {
        if !self.playing {
          return false;
        }
        self.playing = false;
        info!("playback: reached end of media");
        true
      }
      WidgetEvent::StateChanged(MediaState::Playing) => {
        if self.state != PlaybackState::Ready || self.playing {
          return false;
        }
        self.playing = true;
        true
      }
      WidgetEvent::StateChanged(MediaState::Paused) => {
        if self.state != PlaybackState::Ready || !self.playing {
          return false;
        }
        self.playing = false;
        true
      }
      WidgetEvent::StateChanged(MediaState::Buffering) => false,
      WidgetEvent::Failed(reason) => {
        self.teardown().await;
        self.fail(WidgetError::Crashed(reason));
        true
      }
    }
  }

  async fn teardown(&mut self) {
    self.events = None;
    if let Some(widget) = self.widget.take() {
      widget.destroy().await;
      debug!("playback: widget destroyed");
    }
    self.state = PlaybackState::Idle;
    self.playing = false;
  }

  fn fail(&mut self, e: WidgetError) -> WidgetError {
    warn!(err = %e, "playback: widget failure");
    self.state = PlaybackState::Idle;
    self.playing = false;
    self.last_failure = Some(e.clone());
    e
  }
}
