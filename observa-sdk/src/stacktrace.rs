//! Stack trace text parsing
//!
//! Turns the display form of [`std::backtrace::Backtrace`] into the frame
//! list carried on exceptions. The capture layer treats this as an opaque
//! collaborator; alternative formats plug in through [`StackParser`].

use crate::types::{Frame, Stacktrace};

/// Parses captured stack trace text into frames.
pub trait StackParser: Send + Sync {
    /// Returns `None` when the text contains no recognizable frames.
    fn parse(&self, raw: &str) -> Option<Stacktrace>;
}

/// Parser for the standard library backtrace format:
///
/// ```text
///    3: myapp::handler::process
///              at ./src/handler.rs:42:17
/// ```
#[derive(Debug, Default)]
pub struct BacktraceParser;

impl StackParser for BacktraceParser {
    fn parse(&self, raw: &str) -> Option<Stacktrace> {
        let mut frames: Vec<Frame> = Vec::new();

        for line in raw.lines() {
            let trimmed = line.trim();
            if let Some(location) = trimmed.strip_prefix("at ") {
                if let Some(frame) = frames.last_mut() {
                    apply_location(frame, location);
                }
            } else if let Some(function) = frame_symbol(trimmed) {
                frames.push(Frame {
                    function: Some(function.to_string()),
                    ..Default::default()
                });
            }
        }

        if frames.is_empty() {
            return None;
        }
        // Innermost frame last, matching the wire convention.
        frames.reverse();
        Some(Stacktrace { frames })
    }
}

/// Extracts the symbol from a `NN: symbol` frame header line.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, rest) = line.split_once(": ")?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let symbol = rest.trim();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

/// Fills filename/lineno/colno from a `path:line:col` location.
fn apply_location(frame: &mut Frame, location: &str) {
    let mut parts = location.rsplitn(3, ':');
    let colno = parts.next().and_then(|s| s.parse::<u32>().ok());
    let lineno = parts.next().and_then(|s| s.parse::<u32>().ok());
    let filename = parts.next().map(str::to_string);

    match (filename, lineno) {
        (Some(filename), Some(lineno)) => {
            frame.filename = Some(filename);
            frame.lineno = Some(lineno);
            frame.colno = colno;
        }
        // No line/column suffix; treat the whole location as a path.
        _ => frame.filename = Some(location.to_string()),
    }
}
