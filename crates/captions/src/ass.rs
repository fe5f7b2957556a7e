//! ASS cue scripts.
//!
//! The burned-in caption artifact. A script declares the canvas size and
//! the style table, then lists one `Dialogue` line per cue. Entrance
//! animations are inline override tags at the start of the cue text so
//! each cue picks its effect independently of its base style.

use reelsmith_common::timecode::{format_ass_timestamp, parse_ass_timestamp};
use reelsmith_timeline_model::cue::{CueAnimation, CueStyle, SubtitleCue};

use crate::styles::StyleSheet;
use crate::CaptionError;

/// Field order of `Style:` lines.
pub const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

/// Field order of `Dialogue:` lines.
pub const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

const FADE_IN_MS: u32 = 200;
const FADE_OUT_MS: u32 = 150;
const SLIDE_MS: u32 = 150;
const SLIDE_DISTANCE: u32 = 80;
const SLIDE_BOTTOM_OFFSET: u32 = 200;

/// Render a complete script for a `width`x`height` canvas.
pub fn write_ass(cues: &[SubtitleCue], width: u32, height: u32, styles: &StyleSheet) -> String {
    let mut output = String::new();

    output.push_str("[Script Info]\n");
    output.push_str("Title: Reelsmith captions\n");
    output.push_str("ScriptType: v4.00+\n");
    output.push_str("WrapStyle: 0\n");
    output.push_str("ScaledBorderAndShadow: yes\n");
    output.push_str("YCbCr Matrix: TV.709\n");
    output.push_str(&format!("PlayResX: {width}\n"));
    output.push_str(&format!("PlayResY: {height}\n\n"));

    output.push_str("[V4+ Styles]\n");
    output.push_str(STYLE_FORMAT);
    output.push('\n');
    for style in styles.iter() {
        output.push_str(&style.to_ass_line());
        output.push('\n');
    }

    output.push_str("\n[Events]\n");
    output.push_str(EVENT_FORMAT);
    output.push('\n');
    for cue in cues {
        output.push_str(&dialogue_line(cue, width, height, styles));
        output.push('\n');
    }

    output
}

fn dialogue_line(cue: &SubtitleCue, width: u32, height: u32, styles: &StyleSheet) -> String {
    let tag = cue
        .animation
        .map(|a| animation_tag(a, cue.duration(), width, height))
        .unwrap_or_default();
    format!(
        "Dialogue: 0,{},{},{},,0,0,0,,{}{}",
        format_ass_timestamp(cue.start),
        format_ass_timestamp(cue.end),
        styles.get(cue.style).name,
        tag,
        escape_text(&cue.text)
    )
}

/// Inline override block for an entrance animation.
///
/// Fade times shrink proportionally on cues too short to hold them.
pub fn animation_tag(animation: CueAnimation, duration: f64, width: u32, height: u32) -> String {
    match animation {
        CueAnimation::Fade => {
            let available = (duration.max(0.0) * 1000.0).round() as u32;
            let wanted = FADE_IN_MS + FADE_OUT_MS;
            let (fade_in, fade_out) = if available >= wanted {
                (FADE_IN_MS, FADE_OUT_MS)
            } else {
                (
                    FADE_IN_MS * available / wanted,
                    FADE_OUT_MS * available / wanted,
                )
            };
            format!("{{\\fad({fade_in},{fade_out})}}")
        }
        CueAnimation::Pop => {
            "{\\t(0,100,\\fscx110\\fscy110)\\t(100,200,\\fscx100\\fscy100)}".to_string()
        }
        CueAnimation::Slide => {
            let x = width / 2;
            let y_end = height.saturating_sub(SLIDE_BOTTOM_OFFSET);
            let y_start = y_end + SLIDE_DISTANCE;
            format!("{{\\move({x},{y_start},{x},{y_end},0,{SLIDE_MS})}}")
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\\N")
}

fn unescape_text(text: &str) -> String {
    text.replace("\\N", "\n").replace("\\n", "\n")
}

/// Parse the `[Events]` section of a script into cues.
///
/// A leading override block written by [`animation_tag`] is turned back
/// into the cue's animation; other leading blocks are dropped.
pub fn parse_ass(content: &str) -> Result<Vec<SubtitleCue>, CaptionError> {
    let mut cues = Vec::new();
    let mut in_events = false;
    let mut fields = EventFields::default();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_start_matches('\u{feff}').trim_end();
        let trimmed = line.trim_start();

        if trimmed.starts_with('[') {
            in_events = trimmed.eq_ignore_ascii_case("[events]");
            continue;
        }
        if !in_events {
            continue;
        }
        if let Some(format) = trimmed.strip_prefix("Format:") {
            fields = EventFields::from_format(format, line_no)?;
            continue;
        }
        let Some(body) = trimmed.strip_prefix("Dialogue:") else {
            continue;
        };

        let parts: Vec<&str> = body.trim_start().splitn(fields.count, ',').collect();
        if parts.len() != fields.count {
            return Err(CaptionError::ParseError {
                line: line_no,
                message: format!("expected {} fields, found {}", fields.count, parts.len()),
            });
        }

        let start = parse_time(parts[fields.start], line_no)?;
        let end = parse_time(parts[fields.end], line_no)?;
        let style = CueStyle::from_name(parts[fields.style]).unwrap_or_default();
        let (animation, text) = split_leading_tags(parts[fields.text]);

        cues.push(
            SubtitleCue::new(start, end, unescape_text(text))
                .with_style(style)
                .with_animation(animation),
        );
    }

    Ok(cues)
}

fn parse_time(value: &str, line: usize) -> Result<f64, CaptionError> {
    parse_ass_timestamp(value).ok_or_else(|| CaptionError::ParseError {
        line,
        message: format!("invalid timestamp '{}'", value.trim()),
    })
}

/// Positions of the fields this parser reads within a `Dialogue` line.
#[derive(Debug, Clone, Copy)]
struct EventFields {
    count: usize,
    start: usize,
    end: usize,
    style: usize,
    text: usize,
}

impl Default for EventFields {
    fn default() -> Self {
        Self {
            count: 10,
            start: 1,
            end: 2,
            style: 3,
            text: 9,
        }
    }
}

impl EventFields {
    fn from_format(format: &str, line: usize) -> Result<Self, CaptionError> {
        let names: Vec<String> = format
            .split(',')
            .map(|n| n.trim().to_ascii_lowercase())
            .collect();
        let position = |name: &str| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| CaptionError::ParseError {
                    line,
                    message: format!("event format lacks '{name}'"),
                })
        };
        let fields = Self {
            count: names.len(),
            start: position("start")?,
            end: position("end")?,
            style: position("style")?,
            text: position("text")?,
        };
        if fields.text + 1 != fields.count {
            return Err(CaptionError::ParseError {
                line,
                message: "'Text' must be the last event field".to_string(),
            });
        }
        Ok(fields)
    }
}

/// Split leading `{...}` override blocks from the text and recognise the
/// entrance animation they encode.
fn split_leading_tags(text: &str) -> (Option<CueAnimation>, &str) {
    let mut rest = text;
    let mut animation = None;
    while rest.starts_with("{\\") {
        let Some(close) = rest.find('}') else {
            break;
        };
        let block = &rest[..=close];
        animation = animation.or_else(|| recognise_animation(block));
        rest = &rest[close + 1..];
    }
    (animation, rest)
}

fn recognise_animation(block: &str) -> Option<CueAnimation> {
    if block.contains("\\fad(") {
        Some(CueAnimation::Fade)
    } else if block.contains("\\move(") {
        Some(CueAnimation::Slide)
    } else if block.contains("\\t(") && block.contains("\\fscx") {
        Some(CueAnimation::Pop)
    } else {
        None
    }
}
