use std::fs;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Theme {
    pub sidebar_bg: Color,
    pub slide_bg: Color,
    pub input_bg: Color,
    pub focused_input_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub active_fg: Color,
    pub answered_fg: Color,
    pub warning_fg: Color,
    pub critical_fg: Color,
    pub error_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            sidebar_bg: Color::Rgb(44, 44, 44),
            slide_bg: Color::Rgb(54, 54, 54),
            input_bg: Color::Rgb(62, 62, 62),
            focused_input_bg: Color::Rgb(78, 78, 96),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(185, 185, 185),
            active_fg: Color::Rgb(255, 255, 255),
            answered_fg: Color::Rgb(120, 200, 120),
            warning_fg: Color::Rgb(230, 180, 80),
            critical_fg: Color::Rgb(235, 90, 80),
            error_fg: Color::Rgb(235, 110, 110),
        }
    }
}

impl Theme {
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    warn!(path = %path_ref.display(), error = %err, "failed to parse theme file; using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let defaults = Self::default();
        let pick = |value: Option<RgbToml>, fallback: Color| value.map_or(fallback, |rgb| rgb.to_color());
        let colors = cfg.colors;
        Ok(Self {
            sidebar_bg: pick(colors.sidebar_bg, defaults.sidebar_bg),
            slide_bg: pick(colors.slide_bg, defaults.slide_bg),
            input_bg: pick(colors.input_bg, defaults.input_bg),
            focused_input_bg: pick(colors.focused_input_bg, defaults.focused_input_bg),
            status_bg: pick(colors.status_bg, defaults.status_bg),
            text_fg: pick(colors.text_fg, defaults.text_fg),
            muted_fg: pick(colors.muted_fg, defaults.muted_fg),
            active_fg: pick(colors.active_fg, defaults.active_fg),
            answered_fg: pick(colors.answered_fg, defaults.answered_fg),
            warning_fg: pick(colors.warning_fg, defaults.warning_fg),
            critical_fg: pick(colors.critical_fg, defaults.critical_fg),
            error_fg: pick(colors.error_fg, defaults.error_fg),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    colors: ThemeColorsToml,
}

#[derive(Debug, Deserialize)]
struct ThemeColorsToml {
    sidebar_bg: Option<RgbToml>,
    slide_bg: Option<RgbToml>,
    input_bg: Option<RgbToml>,
    focused_input_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    active_fg: Option<RgbToml>,
    answered_fg: Option<RgbToml>,
    warning_fg: Option<RgbToml>,
    critical_fg: Option<RgbToml>,
    error_fg: Option<RgbToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
