use iced::{Color, Theme};
use serde::{Deserialize, Serialize};

// ─── THEME CHOICES ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeChoice {
    Light,
    Mid,
    Dark,
}

impl ThemeChoice {
    pub const ALL: &[ThemeChoice] = &[ThemeChoice::Light, ThemeChoice::Mid, ThemeChoice::Dark];

    pub fn name(&self) -> &'static str {
        match self {
            ThemeChoice::Light => "light",
            ThemeChoice::Mid => "mid",
            ThemeChoice::Dark => "dark",
        }
    }

    /// The theme after this one in [`ThemeChoice::ALL`], wrapping around.
    pub fn next(&self) -> ThemeChoice {
        let idx = Self::ALL.iter().position(|t| t == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn is_light(&self) -> bool {
        matches!(self, ThemeChoice::Light)
    }

    /// Built-in iced theme the widgets fall back to.
    pub fn iced_theme(&self) -> Theme {
        if self.is_light() { Theme::Light } else { Theme::Dark }
    }
}

// ─── PALETTE ────────────────────────────────────────────────────

/// All semantic colors the app uses.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg: Color,
    pub panel_bg: Color,
    pub header_bg: Color,
    pub border: Color,
    pub label: Color,
    pub text: Color,
    pub accent: Color,
    pub selected: Color,
    // Semantic
    pub green: Color,
    pub red: Color,
    pub yellow: Color,
}

pub fn build_palette(theme: ThemeChoice) -> Palette {
    match theme {
        ThemeChoice::Light => Palette {
            bg:        hex(0xef, 0xf1, 0xf5),
            panel_bg:  hex(0xe6, 0xe9, 0xef),
            header_bg: hex(0xdc, 0xe0, 0xe8),
            border:    hex(0xcc, 0xd0, 0xda),
            label:     hex(0x6c, 0x6f, 0x85),
            text:      hex(0x4c, 0x4f, 0x69),
            accent:    hex(0x1e, 0x66, 0xf5),
            selected:  Color::from_rgba(0.12, 0.40, 0.96, 0.15),
            green:     hex(0x40, 0xa0, 0x2b),
            red:       hex(0xd2, 0x0f, 0x39),
            yellow:    hex(0xdf, 0x8e, 0x1d),
        },
        ThemeChoice::Mid => Palette {
            bg:        hex(0x30, 0x34, 0x46),
            panel_bg:  hex(0x29, 0x2c, 0x3c),
            header_bg: hex(0x23, 0x26, 0x34),
            border:    hex(0x41, 0x45, 0x59),
            label:     hex(0xa5, 0xad, 0xce),
            text:      hex(0xc6, 0xd0, 0xf5),
            accent:    hex(0x8c, 0xaa, 0xee),
            selected:  Color::from_rgba(0.55, 0.67, 0.93, 0.18),
            green:     hex(0xa6, 0xd1, 0x89),
            red:       hex(0xe7, 0x82, 0x84),
            yellow:    hex(0xe5, 0xc8, 0x90),
        },
        ThemeChoice::Dark => Palette {
            bg:        hex(0x1e, 0x1e, 0x2e),
            panel_bg:  hex(0x18, 0x18, 0x25),
            header_bg: hex(0x11, 0x11, 0x1b),
            border:    hex(0x31, 0x32, 0x44),
            label:     hex(0xa6, 0xad, 0xc8),
            text:      hex(0xcd, 0xd6, 0xf4),
            accent:    hex(0x89, 0xb4, 0xfa),
            selected:  Color::from_rgba(0.54, 0.71, 0.98, 0.15),
            green:     hex(0xa6, 0xe3, 0xa1),
            red:       hex(0xf3, 0x8b, 0xa8),
            yellow:    hex(0xf9, 0xe2, 0xaf),
        },
    }
}

const fn hex(r: u8, g: u8, b: u8) -> Color {
    Color::from_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}
