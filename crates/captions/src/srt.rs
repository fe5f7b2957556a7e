//! SubRip (`.srt`) cue files.

use reelsmith_common::timecode::{format_srt_timestamp, parse_srt_timestamp};
use reelsmith_timeline_model::cue::SubtitleCue;

use crate::CaptionError;

/// Serialize cues as numbered SubRip blocks. Style and animation are not
/// representable and are dropped.
pub fn write_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();
    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end),
            cue.text
        ));
    }
    output
}

/// Parse SubRip content. Block numbers are not checked; blocks are
/// separated by blank lines and start at their timing line.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleCue>, CaptionError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();
    let mut lines = content.lines().map(|l| l.trim_end_matches('\r')).enumerate();

    while let Some((index, line)) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Either the counter line or the timing line itself.
        let (timing_no, timing) = if line.contains("-->") {
            (index + 1, line.to_string())
        } else {
            match lines.next() {
                Some((next_index, next)) => (next_index + 1, next.trim().to_string()),
                None => {
                    return Err(CaptionError::ParseError {
                        line: index + 1,
                        message: "block has no timing line".to_string(),
                    })
                }
            }
        };

        let (start, end) = parse_timing(&timing, timing_no)?;

        let mut text_lines = Vec::new();
        for (_, text) in lines.by_ref() {
            if text.trim().is_empty() {
                break;
            }
            text_lines.push(text);
        }

        cues.push(SubtitleCue::new(start, end, text_lines.join("\n")));
    }

    Ok(cues)
}

fn parse_timing(line: &str, line_no: usize) -> Result<(f64, f64), CaptionError> {
    let error = |message: String| CaptionError::ParseError {
        line: line_no,
        message,
    };
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| error(format!("expected timing line, found '{line}'")))?;
    // Position hints such as `X1:...` may follow the end time.
    let end = rest.split_whitespace().next().unwrap_or_default();

    let start = parse_srt_timestamp(start)
        .ok_or_else(|| error(format!("invalid start time '{}'", start.trim())))?;
    let end = parse_srt_timestamp(end).ok_or_else(|| error(format!("invalid end time '{end}'")))?;
    if end < start {
        return Err(error(format!("cue ends before it starts ({start} > {end})")));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_numbers_blocks() {
        let cues = vec![
            SubtitleCue::new(0.0, 1.5, "one"),
            SubtitleCue::new(61.25, 3725.004, "two\nlines"),
        ];
        assert_eq!(
            write_srt(&cues),
            "1\n00:00:00,000 --> 00:00:01,500\none\n\n2\n00:01:01,250 --> 01:02:05,004\ntwo\nlines\n\n"
        );
    }

    #[test]
    fn test_parse_handles_bom_and_crlf() {
        let content = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,500\r\nHello\r\nthere\r\n\r\n2\r\n00:00:03.000 --> 00:00:04.000 X1:10 X2:20\r\nBye\r\n";
        let cues = parse_srt(content).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.0);
        assert_eq!(cues[0].end, 2.5);
        assert_eq!(cues[0].text, "Hello\nthere");
        assert_eq!(cues[1].start, 3.0);
        assert_eq!(cues[1].text, "Bye");
    }

    #[test]
    fn test_parse_tolerates_missing_counter_and_extra_blank_lines() {
        let content = "\n\n00:00:00,500 --> 00:00:01,000\nfirst\n\n\n\n3\n00:00:02,000 --> 00:00:03,000\nsecond\n";
        let cues = parse_srt(content).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "first");
        assert_eq!(cues[1].start, 2.0);
    }

    #[test]
    fn test_parse_rejects_bad_timing() {
        let err = parse_srt("1\n00:00:05,000 --> 00:00:01,000\nbackwards\n").unwrap_err();
        match err {
            CaptionError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse_srt("1\nnot a timing line\ntext\n").is_err());
    }

    #[test]
    fn test_written_srt_parses_back() {
        let cues = vec![
            SubtitleCue::new(0.25, 1.75, "alpha"),
            SubtitleCue::new(2.0, 4.5, "beta"),
        ];
        let parsed = parse_srt(&write_srt(&cues)).unwrap();
        assert_eq!(parsed, cues);
    }
}
