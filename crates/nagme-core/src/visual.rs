//! Bar colors for list rows.
//!
//! Pre-due rows ramp from white towards yellow as the due gets close,
//! overdue rows towards red. Weight scales how strong the tint is: below 50
//! the yellow fades, above 50 the red deepens.

use serde::Serialize;
use std::fmt;

use crate::classify::{DisplayState, progress_fraction};
use crate::model::{DAY_MS, Nag};
use crate::schedule::DueWindow;

/// Rows due further out than this stay uncolored.
pub const PRE_DUE_COLOR_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const WHITE: Rgb = Rgb::new(255, 255, 255);

impl Rgb {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the `#` is optional). Anything else is white.
    #[must_use]
    pub fn from_hex(hex: &str) -> Self {
        let value = hex.trim().trim_start_matches('#');
        if value.len() != 6 || !value.is_ascii() {
            return WHITE;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&value[range], 16).ok();
        match (channel(0..2), channel(2..4), channel(4..6)) {
            (Some(r), Some(g), Some(b)) => Self::new(r, g, b),
            _ => WHITE,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Linear blend from `start` to `end`; `amount` is clamped to `[0, 1]`.
#[must_use]
pub fn lerp_color(start: Rgb, end: Rgb, amount: f64) -> Rgb {
    let t = amount.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| channel((f64::from(b) - f64::from(a)).mul_add(t, f64::from(a)));
    Rgb::new(mix(start.r, end.r), mix(start.g, end.g), mix(start.b, end.b))
}

/// `rgb` composited at opacity `alpha` over white.
#[must_use]
pub fn alpha_over_white(rgb: Rgb, alpha: f64) -> Rgb {
    let a = alpha.clamp(0.0, 1.0);
    let over = |c: u8| channel(255.0f64.mul_add(1.0 - a, f64::from(c) * a));
    Rgb::new(over(rgb.r), over(rgb.g), over(rgb.b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTheme {
    pub pre_due_base: Rgb,
    pub pre_due_progress: Rgb,
    pub overdue_base: Rgb,
    pub overdue_progress: Rgb,
    pub far_future_base: Rgb,
    pub far_future_progress: Rgb,
    pub idle_progress: Rgb,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            pre_due_base: Rgb::from_hex("#FFF9C4"),
            pre_due_progress: Rgb::from_hex("#FBC02D"),
            overdue_base: Rgb::from_hex("#FFCDD2"),
            overdue_progress: Rgb::from_hex("#FF0000"),
            far_future_base: Rgb::from_hex("#FFFFFF"),
            far_future_progress: Rgb::from_hex("#D5D5D5"),
            idle_progress: Rgb::from_hex("#EDEDED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineVisual {
    pub base: Rgb,
    pub progress: Rgb,
    /// Filled share of the bar, `[0, 1]`.
    pub fraction: f64,
    /// Draw text in white (heaviest overdue rows only).
    pub light_text: bool,
}

/// Colors for one row.
#[must_use]
pub fn line_visual(
    nag: &Nag,
    state: DisplayState,
    window: Option<&DueWindow>,
    now_ms: i64,
    theme: &ColorTheme,
) -> LineVisual {
    let Some(window) = window else {
        return LineVisual {
            base: WHITE,
            progress: theme.idle_progress,
            fraction: 0.0,
            light_text: false,
        };
    };
    if state == DisplayState::Completed {
        return LineVisual {
            base: theme.far_future_base,
            progress: alpha_over_white(theme.far_future_progress, 0.18),
            fraction: 1.0,
            light_text: false,
        };
    }

    let due = window.due_ms;
    let weight = f64::from(nag.weight);
    let light_text = now_ms > due && nag.weight >= 100;

    if now_ms <= due {
        let fraction = progress_fraction(now_ms, window.start_ms, due);
        if due - now_ms > PRE_DUE_COLOR_WINDOW_DAYS * DAY_MS {
            return LineVisual {
                base: theme.far_future_base,
                progress: alpha_over_white(theme.far_future_progress, 0.18),
                fraction,
                light_text,
            };
        }
        let strength = (weight / 50.0).clamp(0.0, 1.0);
        let base = lerp_color(WHITE, theme.pre_due_base, strength);
        let progress = lerp_color(theme.pre_due_base, theme.pre_due_progress, strength);
        return LineVisual {
            base: alpha_over_white(base, 0.60f64.mul_add(strength, 0.18)),
            progress: alpha_over_white(progress, 0.55f64.mul_add(strength, 0.30)),
            fraction,
            light_text,
        };
    }

    let strength = ((weight.clamp(50.0, 100.0) - 50.0) / 50.0).clamp(0.0, 1.0);
    let base = lerp_color(WHITE, theme.overdue_base, strength);
    let progress = lerp_color(theme.overdue_base, theme.overdue_progress, strength);
    let ramp_end = due.saturating_add(i64::from(nag.lateness_days.max(1)) * DAY_MS);
    LineVisual {
        base: alpha_over_white(base, 0.45f64.mul_add(strength, 0.28)),
        progress: alpha_over_white(progress, 0.35f64.mul_add(strength, 0.60)),
        fraction: progress_fraction(now_ms, due, ramp_end),
        light_text,
    }
}
