//! Formatting of progress lines.
//!
//! A [`Palette`] is plain data handed to the display, so tests can render
//! without escape codes and nothing depends on process-wide color state.

use std::time::Duration;

use console::Style;
use serde::{Deserialize, Serialize};

const PASS_GLYPH: &str = "⚓";
const FAIL_GLYPH: &str = "❌";
const SPINNER: [char; 4] = ['-', '\\', '|', '/'];

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when stdout is a terminal that supports it.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct Palette {
    banner: Style,
    app: Style,
    pending: Style,
    success: Style,
    failure: Style,
}

impl Palette {
    pub fn colored() -> Self {
        Self {
            banner: Style::new().blue().bright().underlined().on_black(),
            app: Style::new().cyan().on_black(),
            pending: Style::new().yellow().bright().bold().on_black(),
            success: Style::new().green().bright().bold().on_black(),
            failure: Style::new().red().bright().italic().on_black(),
        }
        .forced(true)
    }

    pub fn plain() -> Self {
        Self {
            banner: Style::new(),
            app: Style::new(),
            pending: Style::new(),
            success: Style::new(),
            failure: Style::new(),
        }
        .forced(false)
    }

    pub fn for_mode(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Always => Self::colored(),
            ColorMode::Never => Self::plain(),
            ColorMode::Auto if console::colors_enabled() => Self::colored(),
            ColorMode::Auto => Self::plain(),
        }
    }

    fn forced(self, on: bool) -> Self {
        Self {
            banner: self.banner.force_styling(on),
            app: self.app.force_styling(on),
            pending: self.pending.force_styling(on),
            success: self.success.force_styling(on),
            failure: self.failure.force_styling(on),
        }
    }

    /// Heading printed once when a display starts.
    pub fn banner(&self, app: &str) -> String {
        format!(
            "{}: '{}'\n",
            self.banner.apply_to("Skiff Up Started"),
            self.app.apply_to(app)
        )
    }

    /// Redraw of a stage that is still running. `tick` selects the spinner
    /// frame.
    pub fn pending(&self, app: &str, stage: &str, tick: usize) -> String {
        format!(
            "\r{}: {} {}",
            self.app.apply_to(app),
            self.pending.apply_to(stage),
            SPINNER[tick % SPINNER.len()]
        )
    }

    /// Final line of a stage; elapsed seconds with four decimals.
    pub fn finished(&self, app: &str, stage: &str, succeeded: bool, elapsed: Duration) -> String {
        let (style, glyph) = if succeeded {
            (&self.success, PASS_GLYPH)
        } else {
            (&self.failure, FAIL_GLYPH)
        };
        format!(
            "\r{}: {}: {}  ({:.4}s)\n",
            self.app.apply_to(app),
            style.apply_to(stage),
            glyph,
            elapsed.as_secs_f64()
        )
    }

    pub fn pass_glyph(&self) -> &'static str {
        PASS_GLYPH
    }

    pub fn fail_glyph(&self) -> &'static str {
        FAIL_GLYPH
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_mode(ColorMode::Auto)
    }
}
