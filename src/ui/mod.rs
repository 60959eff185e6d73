//! # UI Collaborator Interfaces
//!
//! The core does not render anything itself. It talks to the display and
//! the status LED through two narrow sinks:
//!
//! - [`TextSink`]: "write text to row R"
//! - [`StatusIndicator`]: "set status color at a brightness"
//!
//! Modes that need an on-screen aid (e.g. the expo curve while tuning)
//! install an [`Overlay`] in an [`OverlaySlot`] on entry and clear it on exit.
//!
//! [`LogDisplay`] and [`LogIndicator`] implement the sinks on top of
//! `tracing` for headless hosts.

use std::fmt;

use serde::Deserialize;
use tracing::{debug, info};

use crate::joystick::AxisCurve;

/// Brightness of the link indicator in percent.
pub const INDICATOR_BRIGHTNESS_PCT: u8 = 15;

/// Text rows on the display.
pub const DISPLAY_ROWS: usize = 8;

/// Screen shown after boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StartScreen {
    #[default]
    DefaultSplash,
    DirectMain,
    DirectSetExpo,
    DirectCalibJoy,
    DirectDeadzone,
    DirectKeysThr,
}

impl StartScreen {
    /// True if boot goes straight into joystick calibration.
    #[must_use]
    pub fn starts_calibration(self) -> bool {
        self == StartScreen::DirectCalibJoy
    }
}

/// RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Indicator color for a telemetry value: blue at 0 fading to cyan at 100.
///
/// # Examples
///
/// ```
/// use rc_link::ui::{link_indicator_color, Color};
///
/// assert_eq!(link_indicator_color(0), Color::new(0, 0, 255));
/// assert_eq!(link_indicator_color(100), Color::new(0, 255, 255));
/// ```
#[must_use]
pub fn link_indicator_color(aux: u8) -> Color {
    let aux = u16::from(aux.min(100));
    Color::new(0, (aux * 255 / 100) as u8, 255)
}

/// Row-addressed text output.
pub trait TextSink {
    fn write_row(&mut self, row: u8, text: &str);

    fn clear(&mut self);
}

/// Status LED.
pub trait StatusIndicator {
    fn set_color(&mut self, color: Color, brightness_pct: u8);
}

/// On-screen aid drawn on top of the current page.
pub trait Overlay {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn render(&self, sink: &mut dyn TextSink);
}

/// Holds at most one active overlay.
#[derive(Default)]
pub struct OverlaySlot {
    active: Option<Box<dyn Overlay>>,
}

impl fmt::Debug for OverlaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlaySlot")
            .field("active", &self.active.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

impl OverlaySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `overlay`, replacing any active one.
    pub fn set(&mut self, overlay: Box<dyn Overlay>) {
        debug!("Overlay set: {}", overlay.name());
        self.active = Some(overlay);
    }

    pub fn clear(&mut self) {
        if let Some(overlay) = self.active.take() {
            debug!("Overlay cleared: {}", overlay.name());
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Renders the active overlay, if any. Returns whether one was drawn.
    pub fn render(&self, sink: &mut dyn TextSink) -> bool {
        match &self.active {
            Some(overlay) => {
                overlay.render(sink);
                true
            }
            None => false,
        }
    }
}

/// Expo curve preview for one axis, as used on the tuning page.
///
/// Shows output percent at 25 %, 50 %, 75 % and 100 % deflection, computed
/// with the same curve as live transmission.
#[derive(Debug, Clone)]
pub struct CurvePreview {
    label: String,
    curve: AxisCurve,
}

impl CurvePreview {
    /// Deflection points shown, as fractions of the span.
    pub const POINTS: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

    #[must_use]
    pub fn new(label: &str, curve: AxisCurve) -> Self {
        Self {
            label: label.to_string(),
            curve,
        }
    }

    /// Preview lines without rendering.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} EXPO {:.1} DZ {}",
            self.label,
            self.curve.expo(),
            self.curve.deadzone()
        )];
        lines.extend(Self::POINTS.iter().map(|&point| {
            format!(
                "{:>3}% -> {:>5.1}%",
                (point * 100.0).round() as u32,
                self.curve.preview_pct(point)
            )
        }));
        lines
    }
}

impl Overlay for CurvePreview {
    fn name(&self) -> &str {
        "curve-preview"
    }

    fn render(&self, sink: &mut dyn TextSink) {
        for (row, line) in self.lines().iter().enumerate() {
            sink.write_row(row as u8, line);
        }
    }
}

/// Fixed lines of text, e.g. instructions for the current mode.
#[derive(Debug, Clone)]
pub struct MessageOverlay {
    name: String,
    lines: Vec<String>,
}

impl MessageOverlay {
    #[must_use]
    pub fn new(name: &str, lines: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            lines: lines.iter().map(|line| (*line).to_string()).collect(),
        }
    }
}

impl Overlay for MessageOverlay {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, sink: &mut dyn TextSink) {
        for (row, line) in self.lines.iter().enumerate() {
            sink.write_row(row as u8, line);
        }
    }
}

/// Text sink that logs changed rows.
#[derive(Debug, Default)]
pub struct LogDisplay {
    rows: [String; DISPLAY_ROWS],
}

impl LogDisplay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text of `row`.
    #[must_use]
    pub fn row(&self, row: u8) -> &str {
        self.rows.get(usize::from(row)).map_or("", String::as_str)
    }
}

impl TextSink for LogDisplay {
    fn write_row(&mut self, row: u8, text: &str) {
        let Some(slot) = self.rows.get_mut(usize::from(row)) else {
            return;
        };
        if slot.as_str() != text {
            info!("[DISPLAY {}] {}", row, text);
            *slot = text.to_string();
        }
    }

    fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }
}

/// Status indicator that logs color changes.
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Option<(Color, u8)>,
}

impl LogIndicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<(Color, u8)> {
        self.current
    }
}

impl StatusIndicator for LogIndicator {
    fn set_color(&mut self, color: Color, brightness_pct: u8) {
        if self.current != Some((color, brightness_pct)) {
            debug!(
                "[LED] rgb=({}, {}, {}) brightness={}%",
                color.r, color.g, color.b, brightness_pct
            );
            self.current = Some((color, brightness_pct));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joystick::AxisRange;

    #[derive(Default)]
    struct Rows(Vec<(u8, String)>);

    impl TextSink for Rows {
        fn write_row(&mut self, row: u8, text: &str) {
            self.0.push((row, text.to_string()));
        }

        fn clear(&mut self) {
            self.0.clear();
        }
    }

    // ==================== Indicator Tests ====================

    #[test]
    fn test_link_indicator_color_scale() {
        assert_eq!(link_indicator_color(50), Color::new(0, 127, 255));
        assert_eq!(link_indicator_color(200), Color::new(0, 255, 255));
    }

    #[test]
    fn test_log_indicator_tracks_current() {
        let mut led = LogIndicator::new();
        assert_eq!(led.current(), None);
        led.set_color(Color::new(0, 10, 255), INDICATOR_BRIGHTNESS_PCT);
        assert_eq!(led.current(), Some((Color::new(0, 10, 255), 15)));
    }

    // ==================== Overlay Tests ====================

    #[test]
    fn test_overlay_slot_set_and_clear() {
        let mut slot = OverlaySlot::new();
        let mut rows = Rows::default();
        assert!(!slot.render(&mut rows));

        slot.set(Box::new(CurvePreview::new("LX", AxisCurve::linear())));
        assert!(slot.is_active());
        assert!(slot.render(&mut rows));
        assert_eq!(rows.0.len(), 5);

        slot.clear();
        assert!(!slot.is_active());
    }

    #[test]
    fn test_message_overlay_rows() {
        let overlay = MessageOverlay::new("calibration", &["MOVE STICKS", "CENTER: SAVE"]);
        let mut rows = Rows::default();
        overlay.render(&mut rows);
        assert_eq!(overlay.name(), "calibration");
        assert_eq!(rows.0, vec![(0, "MOVE STICKS".to_string()), (1, "CENTER: SAVE".to_string())]);
    }

    #[test]
    fn test_curve_preview_linear() {
        let preview = CurvePreview::new("RY", AxisCurve::new(AxisRange::full(), 0, 0.0));
        let lines = preview.lines();
        assert_eq!(lines[0], "RY EXPO 0.0 DZ 0");
        assert_eq!(lines[2], " 50% ->  50.0%");
        assert_eq!(lines[4], "100% -> 100.0%");
    }

    #[test]
    fn test_curve_preview_expo_below_linear() {
        let preview = CurvePreview::new("LX", AxisCurve::new(AxisRange::full(), 0, 1.0));
        // 0.5^2 = 25 %
        assert_eq!(preview.lines()[2], " 50% ->  25.0%");
    }

    // ==================== Display Tests ====================

    #[test]
    fn test_log_display_rows() {
        let mut display = LogDisplay::new();
        display.write_row(1, "LINK OK");
        assert_eq!(display.row(1), "LINK OK");
        display.write_row(200, "ignored");
        assert_eq!(display.row(200), "");
        display.clear();
        assert_eq!(display.row(1), "");
    }

    #[test]
    fn test_start_screen_default() {
        assert_eq!(StartScreen::default(), StartScreen::DefaultSplash);
        assert!(StartScreen::DirectCalibJoy.starts_calibration());
        assert!(!StartScreen::DirectMain.starts_calibration());
    }
}
