//! Diagnostic overlay shown while the supervisor is in the error state

use crate::dispatch::EntryPoint;
use crate::error::Error;
use std::fmt;
use std::path::PathBuf;

/// What failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A module failed to load during a swap
    Load,
    /// A protected entry point raised
    Dispatch,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Load => write!(f, "load error"),
            FailureKind::Dispatch => write!(f, "runtime error"),
        }
    }
}

/// A failure as presented to the developer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: FailureKind,
    /// First line of the error
    pub message: String,
    /// Source context and stack frames, one per line
    pub trace: Vec<String>,
    /// Module file that failed to load
    pub file: Option<PathBuf>,
    /// Entry point that raised
    pub entry: Option<EntryPoint>,
}

impl ErrorReport {
    fn from_error(kind: FailureKind, error: &Error) -> Self {
        let text = error.to_string();
        let mut lines = text.lines();
        let message = lines.next().unwrap_or_default().to_string();
        let mut trace: Vec<String> = lines
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect();
        if let Some(stack) = error.stack_trace() {
            trace.extend(stack.frames().iter().map(|f| f.to_string()));
        }
        Self {
            kind,
            message,
            trace,
            file: None,
            entry: None,
        }
    }

    pub fn load(file: impl Into<PathBuf>, error: &Error) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::from_error(FailureKind::Load, error)
        }
    }

    pub fn dispatch(entry: EntryPoint, error: &Error) -> Self {
        Self {
            entry: Some(entry),
            ..Self::from_error(FailureKind::Dispatch, error)
        }
    }

    /// Heading such as `load error in game/b.mod`
    pub fn title(&self) -> String {
        match (&self.file, self.entry) {
            (Some(file), _) => format!("{} in {}", self.kind, file.display()),
            (None, Some(entry)) => format!("{} in {}", self.kind, entry),
            (None, None) => self.kind.to_string(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title())?;
        write!(f, "{}", self.message)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

/// RGBA color, components in 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const BACKGROUND: Color = Color::rgb(0.35, 0.62, 0.86);
    pub const TEXT: Color = Color::rgb(1.0, 1.0, 1.0);
}

/// Minimal drawing surface for the overlay
pub trait Canvas {
    /// Width and height in pixels
    fn size(&self) -> (f32, f32);
    fn set_color(&mut self, color: Color);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32);
    fn print(&mut self, text: &str, x: f32, y: f32);
}

/// Canvas that keeps printed text, for terminals and tests
#[derive(Debug, Clone)]
pub struct TextCanvas {
    width: f32,
    height: f32,
    lines: Vec<String>,
    rects: usize,
}

impl TextCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            lines: Vec::new(),
            rects: 0,
        }
    }

    /// Everything printed since the last clear, one call per line
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of filled rectangles
    pub fn rects(&self) -> usize {
        self.rects
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.rects = 0;
    }
}

impl Default for TextCanvas {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

impl Canvas for TextCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn set_color(&mut self, _color: Color) {}

    fn fill_rect(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {
        self.rects += 1;
    }

    fn print(&mut self, text: &str, _x: f32, _y: f32) {
        self.lines.push(text.to_string());
    }
}

const MARGIN: f32 = 70.0;
const LINE_HEIGHT: f32 = 16.0;
const BLINK_PERIOD: f64 = 1.0;

/// Renders the current [`ErrorReport`]
#[derive(Debug, Clone)]
pub struct ErrorOverlay {
    report: Option<ErrorReport>,
    quit_key: String,
    elapsed: f64,
}

impl ErrorOverlay {
    pub fn new(quit_key: impl Into<String>) -> Self {
        Self {
            report: None,
            quit_key: quit_key.into(),
            elapsed: 0.0,
        }
    }

    pub fn show(&mut self, report: ErrorReport) {
        self.report = Some(report);
        self.elapsed = 0.0;
    }

    pub fn clear(&mut self) {
        self.report = None;
    }

    pub fn report(&self) -> Option<&ErrorReport> {
        self.report.as_ref()
    }

    /// Advance the blink timer
    pub fn update(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
    }

    /// Whether the resume indicator is lit this frame
    pub fn indicator_visible(&self) -> bool {
        self.elapsed % BLINK_PERIOD < BLINK_PERIOD / 2.0
    }

    /// Overlay text, one entry per printed line
    pub fn lines(&self) -> Vec<String> {
        let Some(report) = &self.report else {
            return Vec::new();
        };
        let mut lines = vec![report.title(), String::new(), report.message.clone()];
        if !report.trace.is_empty() {
            lines.push(String::new());
            lines.push("Traceback".to_string());
            lines.push(String::new());
            lines.extend(report.trace.iter().cloned());
        }
        lines.push(String::new());
        lines.push("Save a fix to resume".to_string());
        lines.push(format!("Press {} to quit", self.quit_key));
        lines
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        if self.report.is_none() {
            return;
        }
        let (width, height) = canvas.size();
        canvas.set_color(Color::BACKGROUND);
        canvas.fill_rect(0.0, 0.0, width, height);

        canvas.set_color(Color::TEXT);
        let lines = self.lines();
        for (i, line) in lines.iter().enumerate() {
            canvas.print(line, MARGIN, MARGIN + i as f32 * LINE_HEIGHT);
        }
        if self.indicator_visible() {
            let y = MARGIN + lines.len() as f32 * LINE_HEIGHT;
            canvas.fill_rect(MARGIN, y, LINE_HEIGHT / 2.0, LINE_HEIGHT / 4.0);
        }
    }

    /// Plain-text rendering for terminals
    pub fn render_text(&self) -> String {
        self.lines().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackFrame;
    use pretty_assertions::assert_eq;

    fn sample_report() -> ErrorReport {
        let err = Error::type_error("'x' is not a function")
            .with_frame(StackFrame::new("step", 3, 9).with_file("game/b.mod"));
        ErrorReport::load("game/b.mod", &err)
    }

    #[test]
    fn test_report_splits_message_and_trace() {
        let report = sample_report();
        assert_eq!(report.kind, FailureKind::Load);
        assert_eq!(report.message, "TypeError: 'x' is not a function");
        assert_eq!(report.trace, vec!["    at step (game/b.mod:3:9)".to_string()]);
        assert_eq!(report.title(), "load error in game/b.mod");
    }

    #[test]
    fn test_syntax_context_goes_into_trace() {
        let err = crate::parser::parse("a = 1\nb = )").unwrap_err();
        let report = ErrorReport::load("m.mod", &err);
        assert!(report.message.starts_with("SyntaxError"));
        assert!(report.trace.iter().any(|l| l.contains("b = )")));
    }

    #[test]
    fn test_overlay_draws_report() {
        let mut overlay = ErrorOverlay::new("escape");
        let mut canvas = TextCanvas::default();
        overlay.draw(&mut canvas);
        assert!(canvas.lines().is_empty());

        overlay.show(sample_report());
        overlay.draw(&mut canvas);
        let text = canvas.text();
        assert!(text.contains("TypeError: 'x' is not a function"));
        assert!(text.contains("Traceback"));
        assert!(text.ends_with("Press escape to quit"));
        assert_eq!(canvas.rects(), 2);
    }

    #[test]
    fn test_indicator_blinks() {
        let mut overlay = ErrorOverlay::new("escape");
        overlay.show(sample_report());
        assert!(overlay.indicator_visible());
        overlay.update(0.75);
        assert!(!overlay.indicator_visible());
        overlay.update(0.5);
        assert!(overlay.indicator_visible());
        overlay.update(f64::NAN);
        assert!(overlay.indicator_visible());
    }
}
