//! Theme colors, with optional `#RRGGBB` overrides from the `[theme]` config table

use ratatui::style::Color;
use std::collections::HashMap;

use crate::archive::DocumentStatus;

/// Theme colors for the UI
#[derive(Debug, Clone)]
pub struct Theme {
    pub accent: Color,       // Active borders, key hints
    pub button: Color,       // "Add Documents" button fill
    pub button_text: Color,
    pub heading: Color,
    pub text: Color,
    pub text_dim: Color,
    pub bg_selected: Color,
    pub inactive: Color,
    pub queued: Color,
    pub processing: Color,
    pub ready: Color,
    pub error: Color,
    pub duplicate: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Rgb(96, 165, 250),
            button: Color::Rgb(37, 99, 235),
            button_text: Color::Rgb(255, 255, 255),
            heading: Color::Rgb(229, 231, 235),
            text: Color::Rgb(209, 213, 219),
            text_dim: Color::Rgb(107, 114, 128),
            bg_selected: Color::Rgb(55, 65, 81),
            inactive: Color::Rgb(75, 85, 99),
            queued: Color::Rgb(250, 204, 21),
            processing: Color::Rgb(96, 165, 250),
            ready: Color::Rgb(74, 222, 128),
            error: Color::Rgb(248, 113, 113),
            duplicate: Color::Rgb(156, 163, 175),
        }
    }
}

impl Theme {
    /// Defaults with any valid overrides applied. Unknown names and bad
    /// colors are logged and ignored.
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut theme = Self::default();

        for (name, value) in overrides {
            let Some(color) = Self::parse_hex_color(value) else {
                tracing::warn!("Ignoring theme.{}: '{}' is not a hex color", name, value);
                continue;
            };

            let slot = match name.as_str() {
                "accent" => &mut theme.accent,
                "button" => &mut theme.button,
                "button_text" => &mut theme.button_text,
                "heading" => &mut theme.heading,
                "text" => &mut theme.text,
                "text_dim" => &mut theme.text_dim,
                "bg_selected" => &mut theme.bg_selected,
                "inactive" => &mut theme.inactive,
                "queued" => &mut theme.queued,
                "processing" => &mut theme.processing,
                "ready" => &mut theme.ready,
                "error" => &mut theme.error,
                "duplicate" => &mut theme.duplicate,
                _ => {
                    tracing::warn!("Unknown theme color '{}'", name);
                    continue;
                }
            };
            *slot = color;
        }

        theme
    }

    pub fn status(&self, status: DocumentStatus) -> Color {
        match status {
            DocumentStatus::Queued => self.queued,
            DocumentStatus::Processing => self.processing,
            DocumentStatus::Ready => self.ready,
            DocumentStatus::Error => self.error,
            DocumentStatus::Duplicate => self.duplicate,
        }
    }

    /// Parse a hex color string (#RRGGBB or #RGB)
    fn parse_hex_color(s: &str) -> Option<Color> {
        let s = s.trim().trim_start_matches('#');
        if !s.is_ascii() {
            return None;
        }

        if s.len() == 6 {
            let r = u8::from_str_radix(&s[0..2], 16).ok()?;
            let g = u8::from_str_radix(&s[2..4], 16).ok()?;
            let b = u8::from_str_radix(&s[4..6], 16).ok()?;
            Some(Color::Rgb(r, g, b))
        } else if s.len() == 3 {
            let r = u8::from_str_radix(&s[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&s[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&s[2..3], 16).ok()? * 17;
            Some(Color::Rgb(r, g, b))
        } else {
            None
        }
    }
}
