use chrono::Utc;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, ListState, Padding, Paragraph, Tabs},
};

use crate::age::format_age;
use crate::app::{App, AppMode};
use crate::player::PlaybackState;
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// The rightmost `width` columns of `area`, clipped to the area itself.
fn right_aligned(area: Rect, width: usize) -> Rect {
  let width = (width as u16).min(area.width);
  Rect { x: area.x + area.width - width, width, ..area }
}

fn rounded_block<'a>(theme: &Theme) -> Block<'a> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, input_area, status_area, main_area, player_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
    Constraint::Min(5),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, theme, header_area);
  render_input(frame, app, input_area);
  render_status(frame, app, status_area);
  render_main(frame, app, main_area);
  render_player(frame, app, player_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left =
    Line::from(Span::styled(" ▶ MusicTube ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  frame.render_widget(right, right_aligned(area, version.len()));
}

fn render_main(frame: &mut Frame, app: &App, area: Rect) {
  if app.shelves().is_empty() {
    render_welcome(frame, app, area);
  } else {
    render_shelves(frame, app, area);
  }
}

fn render_welcome(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let hint = if app.results.any_pending() {
    "Loading music…"
  } else {
    "Type a query above and press Enter."
  };
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  Welcome to MusicTube", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Browse music videos. Play the audio. In the terminal.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled(hint, Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded_block(theme));
  frame.render_widget(paragraph, area);
}

fn render_shelves(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let shelves = app.shelves();
  let browsing = app.mode == AppMode::Browse;

  let [tabs_area, list_area] = Layout::vertical([Constraint::Length(1), Constraint::Min(3)]).areas(area);

  let titles: Vec<Line> = shelves.iter().map(|s| Line::from(format!(" {} ", s.label))).collect();
  let tabs = Tabs::new(titles)
    .select(app.shelf_index)
    .style(Style::default().fg(theme.muted))
    .highlight_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .divider(Span::styled("│", Style::default().fg(theme.border)));
  frame.render_widget(tabs, tabs_area);

  let Some(shelf) = shelves.get(app.shelf_index) else { return };
  let now = Utc::now();
  let playing_id = app.player.selection().map(|s| s.external_id.as_str());

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = list_area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = shelf
    .results
    .iter()
    .enumerate()
    .map(|(i, result)| {
      let is_selected = browsing && i == app.card_index;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let marker = if playing_id == Some(result.external_id.as_str()) { "♪ " } else { "" };
      let right = format!("{}  {}", result.channel_name, format_age(result.published_at, now));
      let right_w = right.chars().count();
      let title_max = inner_w.saturating_sub(right_w + 2 + marker.chars().count());
      let title = format!("{}{}", marker, truncate_str(&result.title, title_max));
      let gap = inner_w.saturating_sub(title.chars().count() + right_w);

      let line = Line::from(vec![
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(if is_selected { theme.highlight_fg } else { theme.muted })),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let border_color = if browsing { theme.accent } else { theme.border };
  let list = List::new(items)
    .block(
      rounded_block(theme)
        .title(format!(" {} · {} ", shelf.label, shelf.results.len()))
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(border_color)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  let mut state = ListState::default().with_selected(browsing.then_some(app.card_index));
  frame.render_stateful_widget(list, list_area, &mut state);
}

fn render_player(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let block = rounded_block(theme)
    .title(Span::styled(" Now Playing ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)))
    .padding(Padding::horizontal(1));

  let line = if app.player.selection().is_none() {
    Line::from(Span::styled("Nothing playing. Pick a card and press Enter.", Style::default().fg(theme.muted)))
  } else {
    let state = app.player.state();
    let toggle = match state {
      PlaybackState::Ready if app.player.is_playing() => "⏸",
      PlaybackState::Ready => "▶",
      PlaybackState::Loading => "…",
      PlaybackState::Idle => "⚠",
    };
    let status = match (state, app.player.last_failure()) {
      (PlaybackState::Idle, Some(_)) => "unavailable",
      (PlaybackState::Ready, _) if !app.player.is_playing() => "paused",
      (PlaybackState::Ready, _) => "playing",
      (s, _) => s.label(),
    };
    let inner_w = area.width.saturating_sub(4) as usize;
    let controls_w = 12 + status.chars().count() + 3;
    let status_color = if state == PlaybackState::Idle { theme.error } else { theme.status };
    Line::from(vec![
      Span::styled("⏮ ", Style::default().fg(theme.muted)),
      Span::styled(format!(" {} ", toggle), Style::default().fg(theme.key_fg).bg(theme.accent)),
      Span::styled(" ⏭", Style::default().fg(theme.muted)),
      Span::raw("   "),
      Span::styled(
        truncate_str(app.now_playing_title(), inner_w.saturating_sub(controls_w)),
        Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
      ),
      Span::raw("  "),
      Span::styled(format!("[{}]", status), Style::default().fg(status_color)),
    ])
  };

  frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Input { theme.accent } else { theme.border };
  let input_block = Block::bordered()
    .title(" Search music ")
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  if inner_w == 0 {
    // No room for text or a cursor.
    frame.render_widget(input_block, area);
    return;
  }
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    let cursor_x = area.x + 2 + cursor_col.saturating_sub(app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let has_shelves = !app.shelves().is_empty();
  let has_selection = app.player.selection().is_some();
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Input => {
      let mut k = vec![("Enter", "Search"), ("^t", "Theme")];
      if has_selection {
        k.push(("^s", "Stop"));
      }
      if has_shelves {
        k.push(("Tab", "Browse"));
      } else {
        k.push(("Esc", "Quit"));
      }
      k
    }
    AppMode::Browse => {
      let mut k = vec![("Enter", "Play"), ("j/k", "Card"), ("h/l", "Shelf")];
      if app.player.state() == PlaybackState::Ready {
        let pause_label = if app.player.is_playing() { "Pause" } else { "Resume" };
        k.push(("Space", pause_label));
      }
      if has_selection {
        k.push(("^s", "Stop"));
      }
      k.push(("r", "Refresh"));
      k.push(("Esc", "Search"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  frame.render_widget(right, right_aligned(area, theme_label.chars().count()));
}
