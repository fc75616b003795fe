//! The player widget capability the Playback Controller is built against.
//!
//! A [`VideoWidgetFactory`] loads its backing "script" (for mpv: locating a
//! working binary) and constructs hidden, audio-only widgets bound to a single
//! video id. Widgets report back through an unbounded event channel.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::sync::{OnceCell, mpsc};

/// Everything needed to construct one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSpec {
  /// Where the widget attaches. The mpv backend uses it as its IPC socket path.
  pub mount: String,
  pub video_id: String,
  /// Zero width or height means audio only.
  pub width: u32,
  pub height: u32,
  pub autoplay: bool,
}

/// Media states a widget can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
  Buffering,
  Playing,
  Paused,
  Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
  /// The widget accepts commands.
  Ready,
  StateChanged(MediaState),
  /// The backend died or could not play the media.
  Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WidgetError {
  #[error("widget script failed to load: {0}")]
  ScriptLoad(String),
  #[error("widget construction failed: {0}")]
  Construct(String),
  #[error("widget command failed: {0}")]
  Command(String),
  #[error("widget stopped: {0}")]
  Crashed(String),
}

pub trait PlayerWidget: Send + 'static {
  fn play(&mut self) -> impl Future<Output = Result<(), WidgetError>> + Send;
  fn pause(&mut self) -> impl Future<Output = Result<(), WidgetError>> + Send;
  /// Release the widget and everything it holds.
  fn destroy(self) -> impl Future<Output = ()> + Send;
}

pub trait VideoWidgetFactory: Send + Sync + 'static {
  type Widget: PlayerWidget;

  fn load_script(&self) -> impl Future<Output = Result<(), WidgetError>> + Send;

  fn construct(
    &self,
    spec: WidgetSpec,
    events: mpsc::UnboundedSender<WidgetEvent>,
  ) -> impl Future<Output = Result<Self::Widget, WidgetError>> + Send;
}

static GLOBAL_GATE: LazyLock<ScriptGate> = LazyLock::new(ScriptGate::default);

/// Init-once guard around [`VideoWidgetFactory::load_script`].
///
/// Clones share the same cell, so every controller awaiting a gate waits on the
/// same load. A failed load is not cached; the next caller tries again.
#[derive(Clone, Default)]
pub struct ScriptGate {
  cell: Arc<OnceCell<()>>,
}

impl ScriptGate {
  /// The process-wide gate.
  pub fn global() -> Self {
    GLOBAL_GATE.clone()
  }

  pub async fn ensure_loaded<F: VideoWidgetFactory>(&self, factory: &F) -> Result<(), WidgetError> {
    self.cell.get_or_try_init(|| factory.load_script()).await.map(|_| ())
  }

  pub fn is_loaded(&self) -> bool {
    self.cell.initialized()
  }
}
