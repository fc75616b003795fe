use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::UnixStream,
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
  time::Instant,
};
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::widget::{MediaState, PlayerWidget, VideoWidgetFactory, WidgetError, WidgetEvent, WidgetSpec};

const OBSERVE_EOF: &[u8] = b"{\"command\":[\"observe_property\",1,\"eof-reached\"]}\n";
const OBSERVE_PAUSE: &[u8] = b"{\"command\":[\"observe_property\",2,\"pause\"]}\n";
const CMD_PAUSE: &[u8] = b"{\"command\":[\"set_property\",\"pause\",true]}\n";
const CMD_RESUME: &[u8] = b"{\"command\":[\"set_property\",\"pause\",false]}\n";
const CMD_SEEK_START: &[u8] = b"{\"command\":[\"seek\",0,\"absolute\"]}\n";

/// Builds headless mpv players driven over mpv's JSON IPC socket.
pub struct MpvWidgetFactory {
  binary: String,
  watch_url_base: String,
  ready_timeout: Duration,
}

impl Default for MpvWidgetFactory {
  fn default() -> Self {
    let c = constants();
    Self {
      binary: c.mpv_binary.clone(),
      watch_url_base: c.watch_url_base.clone(),
      ready_timeout: Duration::from_millis(c.widget_ready_timeout_ms),
    }
  }
}

impl MpvWidgetFactory {
  pub fn with_binary(binary: impl Into<String>) -> Self {
    Self { binary: binary.into(), ..Self::default() }
  }
}

/// Command-line arguments for one widget.
fn mpv_args(spec: &WidgetSpec, watch_url_base: &str) -> Vec<String> {
  let mut args = Vec::new();
  if spec.width == 0 || spec.height == 0 {
    args.push("--no-video".to_string());
  } else {
    args.push(format!("--geometry={}x{}", spec.width, spec.height));
  }
  args.extend([
    "--no-terminal".to_string(),
    // Stay alive at end of file so eof-reached is observable and play can restart.
    "--keep-open=yes".to_string(),
    "--idle=no".to_string(),
    format!("--pause={}", if spec.autoplay { "no" } else { "yes" }),
    format!("--input-ipc-server={}", spec.mount),
    "--".to_string(),
    format!("{}{}", watch_url_base, spec.video_id),
  ]);
  args
}

/// Translate one line of mpv IPC output into a widget event.
fn parse_ipc_event(line: &str) -> Option<WidgetEvent> {
  let val: serde_json::Value = serde_json::from_str(line).ok()?;
  match val.get("event")?.as_str()? {
    "property-change" => match (val.get("name")?.as_str()?, val.get("data")?.as_bool()?) {
      ("eof-reached", true) => Some(WidgetEvent::StateChanged(MediaState::Ended)),
      ("pause", true) => Some(WidgetEvent::StateChanged(MediaState::Paused)),
      ("pause", false) => Some(WidgetEvent::StateChanged(MediaState::Playing)),
      _ => None,
    },
    "start-file" => Some(WidgetEvent::StateChanged(MediaState::Buffering)),
    "end-file" if val.get("reason").and_then(|r| r.as_str()) == Some("error") => {
      let detail = val.get("file_error").and_then(|e| e.as_str()).unwrap_or("unknown error");
      Some(WidgetEvent::Failed(format!("mpv could not play the stream: {}", detail)))
    }
    _ => None,
  }
}

/// Wait for the IPC socket, announce readiness, then forward mpv events until it exits.
async fn monitor_ipc(
  socket_path: String,
  ready_timeout: Duration,
  events: mpsc::UnboundedSender<WidgetEvent>,
  ended: Arc<AtomicBool>,
) {
  let deadline = Instant::now() + ready_timeout;
  let stream = loop {
    match UnixStream::connect(&socket_path).await {
      Ok(stream) => break stream,
      Err(_) if Instant::now() < deadline => tokio::time::sleep(Duration::from_millis(100)).await,
      Err(e) => {
        let _ = events.send(WidgetEvent::Failed(format!("mpv IPC socket did not come up: {}", e)));
        return;
      }
    }
  };

  let (reader, mut writer) = stream.into_split();
  for cmd in [OBSERVE_EOF, OBSERVE_PAUSE] {
    if let Err(e) = writer.write_all(cmd).await {
      let _ = events.send(WidgetEvent::Failed(format!("failed to subscribe to mpv events: {}", e)));
      return;
    }
  }
  if events.send(WidgetEvent::Ready).is_err() {
    return;
  }

  let mut lines = TokioBufReader::new(reader).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    let Some(event) = parse_ipc_event(&line) else { continue };
    if event == WidgetEvent::StateChanged(MediaState::Ended) {
      ended.store(true, Ordering::SeqCst);
    }
    if events.send(event).is_err() {
      return;
    }
  }
  // The socket only closes underneath us when mpv itself went away.
  let _ = events.send(WidgetEvent::Failed("mpv exited".to_string()));
}

impl VideoWidgetFactory for MpvWidgetFactory {
  type Widget = MpvWidget;

  async fn load_script(&self) -> Result<(), WidgetError> {
    let output = Command::new(&self.binary)
      .arg("--version")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .output()
      .await
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          WidgetError::ScriptLoad(
            "mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)".to_string(),
          )
        } else {
          WidgetError::ScriptLoad(format!("failed to run {}: {}", self.binary, e))
        }
      })?;

    if !output.status.success() {
      return Err(WidgetError::ScriptLoad(format!("{} --version exited with {}", self.binary, output.status)));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = stdout.lines().next().unwrap_or("unknown version").trim();
    info!(version = %version, "widget: mpv available");
    Ok(())
  }

  async fn construct(
    &self,
    spec: WidgetSpec,
    events: mpsc::UnboundedSender<WidgetEvent>,
  ) -> Result<MpvWidget, WidgetError> {
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&spec.mount);

    let mut cmd = Command::new(&self.binary);
    cmd.args(mpv_args(&spec, &self.watch_url_base));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    // Not piped: an undrained pipe fills up and blocks mpv.
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| WidgetError::Construct(format!("failed to spawn mpv: {}", e)))?;
    debug!(video_id = %spec.video_id, socket = %spec.mount, "widget: mpv spawned");

    let ended = Arc::new(AtomicBool::new(false));
    let monitor = tokio::spawn(monitor_ipc(spec.mount.clone(), self.ready_timeout, events, Arc::clone(&ended)));

    Ok(MpvWidget { child: Some(child), socket_path: spec.mount, monitor: Some(monitor), ended })
  }
}

/// One running mpv process bound to a single video.
pub struct MpvWidget {
  child: Option<TokioChild>,
  socket_path: String,
  monitor: Option<JoinHandle<()>>,
  ended: Arc<AtomicBool>,
}

impl MpvWidget {
  async fn send_command(&self, cmd: &[u8]) -> Result<(), WidgetError> {
    let mut stream = UnixStream::connect(&self.socket_path)
      .await
      .map_err(|e| WidgetError::Command(format!("failed to connect to mpv IPC socket: {}", e)))?;
    stream.write_all(cmd).await.map_err(|e| WidgetError::Command(format!("failed to send mpv command: {}", e)))?;
    Ok(())
  }
}

impl PlayerWidget for MpvWidget {
  async fn play(&mut self) -> Result<(), WidgetError> {
    if self.ended.swap(false, Ordering::SeqCst) {
      self.send_command(CMD_SEEK_START).await?;
    }
    self.send_command(CMD_RESUME).await
  }

  async fn pause(&mut self) -> Result<(), WidgetError> {
    self.send_command(CMD_PAUSE).await
  }

  async fn destroy(mut self) {
    if let Some(handle) = self.monitor.take() {
      handle.abort();
      let _ = handle.await;
    }
    if let Some(mut child) = self.child.take() {
      if let Err(e) = child.kill().await {
        warn!(err = %e, "widget: failed to kill mpv");
      }
      let _ = child.wait().await;
    }
    let _ = std::fs::remove_file(&self.socket_path);
  }
}

impl Drop for MpvWidget {
  fn drop(&mut self) {
    // Covers widgets dropped without `destroy`; the child is reaped by kill_on_drop.
    if let Some(handle) = self.monitor.take() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::AsyncReadExt;
  use tokio::net::UnixListener;

  fn socket_path(name: &str) -> String {
    let path = std::env::temp_dir().join(format!("musictube-{}-{}.sock", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path.to_string_lossy().into_owned()
  }

  async fn next_event(rx: &mut mpsc::UnboundedReceiver<WidgetEvent>) -> WidgetEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
  }

  fn spec() -> WidgetSpec {
    WidgetSpec {
      mount: "/tmp/musictube-test.sock".to_string(),
      video_id: "abc123".to_string(),
      width: 0,
      height: 0,
      autoplay: true,
    }
  }

  // --- mpv_args ---

  #[test]
  fn zero_size_spec_is_audio_only() {
    let args = mpv_args(&spec(), "https://www.youtube.com/watch?v=");
    assert_eq!(args[0], "--no-video");
    assert!(args.contains(&"--pause=no".to_string()));
    assert!(args.contains(&"--input-ipc-server=/tmp/musictube-test.sock".to_string()));
    assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc123");
  }

  #[test]
  fn sized_spec_without_autoplay() {
    let spec = WidgetSpec { width: 320, height: 180, autoplay: false, ..spec() };
    let args = mpv_args(&spec, "https://youtu.be/");
    assert_eq!(args[0], "--geometry=320x180");
    assert!(!args.contains(&"--no-video".to_string()));
    assert!(args.contains(&"--pause=yes".to_string()));
  }

  // --- parse_ipc_event ---

  #[test]
  fn eof_reached_is_end_of_media() {
    let line = r#"{"event":"property-change","id":1,"name":"eof-reached","data":true}"#;
    assert_eq!(parse_ipc_event(line), Some(WidgetEvent::StateChanged(MediaState::Ended)));
    let line = r#"{"event":"property-change","id":1,"name":"eof-reached","data":false}"#;
    assert_eq!(parse_ipc_event(line), None);
  }

  #[test]
  fn pause_property_maps_to_playing_and_paused() {
    let paused = r#"{"event":"property-change","id":2,"name":"pause","data":true}"#;
    let playing = r#"{"event":"property-change","id":2,"name":"pause","data":false}"#;
    assert_eq!(parse_ipc_event(paused), Some(WidgetEvent::StateChanged(MediaState::Paused)));
    assert_eq!(parse_ipc_event(playing), Some(WidgetEvent::StateChanged(MediaState::Playing)));
  }

  #[test]
  fn end_file_error_is_failure() {
    let line = r#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#;
    assert_eq!(
      parse_ipc_event(line),
      Some(WidgetEvent::Failed("mpv could not play the stream: loading failed".to_string()))
    );
    assert_eq!(parse_ipc_event(r#"{"event":"end-file","reason":"stop"}"#), None);
  }

  #[test]
  fn unrelated_lines_are_ignored() {
    assert_eq!(parse_ipc_event(r#"{"data":null,"request_id":0,"error":"success"}"#), None);
    assert_eq!(parse_ipc_event(r#"{"event":"property-change","id":1,"name":"eof-reached"}"#), None);
    assert_eq!(parse_ipc_event("not json"), None);
    assert_eq!(parse_ipc_event(r#"{"event":"start-file"}"#), Some(WidgetEvent::StateChanged(MediaState::Buffering)));
  }

  // --- load_script ---

  #[tokio::test]
  async fn missing_binary_is_script_load_failure() {
    let factory = MpvWidgetFactory::with_binary("musictube-no-such-mpv-binary");
    let err = factory.load_script().await.unwrap_err();
    assert!(matches!(err, WidgetError::ScriptLoad(ref msg) if msg.contains("mpv not found")));
  }

  // --- monitor_ipc ---

  #[tokio::test]
  async fn monitor_reports_ready_end_of_media_and_exit() {
    let path = socket_path("monitor");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ended = Arc::new(AtomicBool::new(false));
    let monitor = tokio::spawn(monitor_ipc(path.clone(), Duration::from_secs(5), tx, Arc::clone(&ended)));

    // The monitor is already polling before the socket exists.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let listener = UnixListener::bind(&path).unwrap();
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = TokioBufReader::new(reader).lines();

    assert_eq!(lines.next_line().await.unwrap().unwrap().as_bytes(), &OBSERVE_EOF[..OBSERVE_EOF.len() - 1]);
    assert_eq!(lines.next_line().await.unwrap().unwrap().as_bytes(), &OBSERVE_PAUSE[..OBSERVE_PAUSE.len() - 1]);
    assert_eq!(next_event(&mut rx).await, WidgetEvent::Ready);

    writer.write_all(b"{\"event\":\"property-change\",\"id\":1,\"name\":\"eof-reached\",\"data\":true}\n").await.unwrap();
    assert_eq!(next_event(&mut rx).await, WidgetEvent::StateChanged(MediaState::Ended));
    assert!(ended.load(Ordering::SeqCst));

    drop(writer);
    drop(lines);
    assert_eq!(next_event(&mut rx).await, WidgetEvent::Failed("mpv exited".to_string()));
    monitor.await.unwrap();
    let _ = std::fs::remove_file(&path);
  }

  #[tokio::test]
  async fn monitor_fails_when_socket_never_appears() {
    let path = socket_path("absent");
    let (tx, mut rx) = mpsc::unbounded_channel();
    monitor_ipc(path, Duration::from_millis(200), tx, Arc::new(AtomicBool::new(false))).await;
    assert!(matches!(next_event(&mut rx).await, WidgetEvent::Failed(ref msg) if msg.contains("did not come up")));
  }

  // --- MpvWidget commands ---

  /// Accept `n` one-shot command connections and return what each one sent.
  async fn collect_commands(listener: &UnixListener, n: usize) -> Vec<String> {
    let mut sent = Vec::new();
    for _ in 0..n {
      let (mut stream, _) = listener.accept().await.unwrap();
      let mut buf = String::new();
      stream.read_to_string(&mut buf).await.unwrap();
      sent.push(buf);
    }
    sent
  }

  fn widget(path: &str, ended: bool) -> MpvWidget {
    MpvWidget { child: None, socket_path: path.to_string(), monitor: None, ended: Arc::new(AtomicBool::new(ended)) }
  }

  #[tokio::test]
  async fn play_after_end_of_media_seeks_to_start() {
    let path = socket_path("replay");
    let listener = UnixListener::bind(&path).unwrap();
    let mut widget = widget(&path, true);

    let (played, sent) = tokio::join!(widget.play(), collect_commands(&listener, 2));
    played.unwrap();
    assert_eq!(sent[0].as_bytes(), CMD_SEEK_START);
    assert_eq!(sent[1].as_bytes(), CMD_RESUME);
    assert!(!widget.ended.load(Ordering::SeqCst));

    let (played, sent) = tokio::join!(widget.play(), collect_commands(&listener, 1));
    played.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].as_bytes(), CMD_RESUME);
    let _ = std::fs::remove_file(&path);
  }

  #[tokio::test]
  async fn pause_sends_set_property() {
    let path = socket_path("pause");
    let listener = UnixListener::bind(&path).unwrap();
    let mut widget = widget(&path, false);

    let (paused, sent) = tokio::join!(widget.pause(), collect_commands(&listener, 1));
    paused.unwrap();
    assert_eq!(sent[0].as_bytes(), CMD_PAUSE);
    let _ = std::fs::remove_file(&path);
  }

  #[tokio::test]
  async fn command_without_socket_is_command_error() {
    let path = socket_path("gone");
    let mut widget = widget(&path, false);
    assert!(matches!(widget.pause().await, Err(WidgetError::Command(_))));
  }
}
