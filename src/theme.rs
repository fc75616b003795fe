use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "Tube Night",
    bg: Color::Rgb(15, 15, 15),
    fg: Color::Rgb(235, 235, 235),
    accent: Color::Rgb(29, 185, 84),
    muted: Color::Rgb(136, 136, 136),
    border: Color::Rgb(48, 48, 48),
    highlight_fg: Color::Rgb(15, 15, 15),
    highlight_bg: Color::Rgb(29, 185, 84),
    stripe_bg: Color::Rgb(24, 24, 24),
    status: Color::Rgb(120, 200, 255),
    error: Color::Rgb(255, 95, 95),
    key_fg: Color::Rgb(15, 15, 15),
    key_bg: Color::Rgb(136, 136, 136),
  },
  Theme {
    name: "Paper",
    bg: Color::Rgb(250, 248, 240),
    fg: Color::Rgb(40, 40, 40),
    accent: Color::Rgb(200, 60, 40),
    muted: Color::Rgb(130, 125, 115),
    border: Color::Rgb(210, 205, 190),
    highlight_fg: Color::Rgb(250, 248, 240),
    highlight_bg: Color::Rgb(200, 60, 40),
    stripe_bg: Color::Rgb(242, 238, 226),
    status: Color::Rgb(40, 110, 170),
    error: Color::Rgb(190, 30, 30),
    key_fg: Color::Rgb(250, 248, 240),
    key_bg: Color::Rgb(130, 125, 115),
  },
  Theme {
    name: "Terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Green,
    muted: Color::DarkGray,
    border: Color::DarkGray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Green,
    stripe_bg: Color::Reset,
    status: Color::Cyan,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
];
