//! Reading of SubRip (.srt) subtitle files.

use anyhow::{anyhow, bail};
use std::fs;
use std::path::Path;

/// Maximum size of a subtitle file.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    pub id: u32,
    /// Start time in milliseconds.
    pub start_time: i64,
    /// End time in milliseconds.
    pub end_time: i64,
    pub text: String,
}

/// Reads a subtitle file.
pub fn read(path: &Path) -> anyhow::Result<Vec<Subtitle>> {
    log::debug!("Reading subtitle file '{}'...", path.display());

    let result = (|| -> anyhow::Result<Vec<Subtitle>> {
        let metadata = fs::metadata(path)?;
        if metadata.len() >= MAX_FILE_SIZE {
            bail!("Too big file size. May be it is not a subtitle file?");
        }

        parse(&decode(&fs::read(path)?))
    })();

    result.map_err(|e| anyhow!("Error while reading subtitle file '{}': {}", path.display(), e))
}

/// Decodes subtitle file contents: UTF-8 when valid, with a Latin-1 fallback
/// for legacy single-byte encodings.
fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(content) => content.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

enum ParseState {
    Id,
    Timings { id: u32 },
    Text { id: u32, start_time: i64, end_time: i64, text: String },
}

pub fn parse(content: &str) -> anyhow::Result<Vec<Subtitle>> {
    // A UTF-8 byte order mark would otherwise glue itself to the first id.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut subtitles = Vec::new();
    let mut state = ParseState::Id;

    for (line_num, line) in content.lines().map(str::trim).enumerate() {
        let line_num = line_num + 1;

        state = match state {
            ParseState::Id => {
                if line.is_empty() {
                    ParseState::Id
                } else {
                    let id = line
                        .parse()
                        .map_err(|_| anyhow!("Invalid subtitle id '{}' at line {}.", line, line_num))?;
                    ParseState::Timings { id }
                }
            }
            ParseState::Timings { id } => {
                let (start_time, end_time) = parse_timings(line)
                    .ok_or_else(|| anyhow!("Invalid subtitle timings '{}' at line {}.", line, line_num))?;
                ParseState::Text { id, start_time, end_time, text: String::new() }
            }
            ParseState::Text { id, start_time, end_time, mut text } => {
                if line.is_empty() {
                    if text.is_empty() {
                        bail!("Missing subtitle text for subtitle {} at line {}.", id, line_num);
                    }
                    subtitles.push(Subtitle { id, start_time, end_time, text });
                    ParseState::Id
                } else {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(line);
                    ParseState::Text { id, start_time, end_time, text }
                }
            }
        };
    }

    match state {
        ParseState::Id => {}
        ParseState::Timings { .. } => bail!("Unexpected end of file."),
        ParseState::Text { id, start_time, end_time, text } => {
            if text.is_empty() {
                bail!("Unexpected end of file.");
            }
            subtitles.push(Subtitle { id, start_time, end_time, text });
        }
    }

    if subtitles.is_empty() {
        bail!("File is empty.");
    }

    Ok(subtitles)
}

fn parse_timings(line: &str) -> Option<(i64, i64)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

/// Parses a `HH:MM:SS,mmm` timestamp into milliseconds.
fn parse_timestamp(timestamp: &str) -> Option<i64> {
    let (time, millis) = timestamp.trim().split_once(',')?;

    let mut parts = time.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let millis: i64 = millis.parse().ok()?;
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1
00:00:01,500 --> 00:00:03,000
First line.

2
00:01:00,000 --> 00:01:02,250
Second subtitle,
spanning two lines.
";

    #[test]
    fn test_parse_sample_file() {
        let subtitles = parse(SAMPLE).unwrap();

        assert_eq!(subtitles.len(), 2);
        assert_eq!(subtitles[0].id, 1);
        assert_eq!(subtitles[0].start_time, 1500);
        assert_eq!(subtitles[0].end_time, 3000);
        assert_eq!(subtitles[0].text, "First line.");

        assert_eq!(subtitles[1].start_time, 60000);
        assert_eq!(subtitles[1].end_time, 62250);
        assert_eq!(subtitles[1].text, "Second subtitle,\nspanning two lines.");
    }

    #[test]
    fn test_parse_tolerates_bom_and_crlf() {
        let content = format!("\u{feff}{}", SAMPLE.replace('\n', "\r\n"));
        let subtitles = parse(&content).unwrap();
        assert_eq!(subtitles.len(), 2);
    }

    #[test]
    fn test_parse_rejects_invalid_id() {
        let content = "one\n00:00:01,000 --> 00:00:02,000\nText\n";
        let error = parse(content).unwrap_err().to_string();
        assert!(error.contains("Invalid subtitle id"), "{}", error);
    }

    #[test]
    fn test_parse_rejects_invalid_timings() {
        let content = "1\n00:00:01,000 -> 00:00:02,000\nText\n";
        let error = parse(content).unwrap_err().to_string();
        assert!(error.contains("Invalid subtitle timings"), "{}", error);
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\n\n";
        let error = parse(content).unwrap_err().to_string();
        assert!(error.contains("Missing subtitle text"), "{}", error);
    }

    #[test]
    fn test_parse_rejects_truncated_file() {
        let content = "1\n";
        let error = parse(content).unwrap_err().to_string();
        assert!(error.contains("Unexpected end of file"), "{}", error);
    }

    #[test]
    fn test_parse_rejects_empty_file() {
        let error = parse("\n\n").unwrap_err().to_string();
        assert!(error.contains("File is empty"), "{}", error);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("01:02:03,400"), Some(3723400));
        assert_eq!(parse_timestamp(" 00:00:00,1 "), Some(1));
        assert_eq!(parse_timestamp("00:00:01"), None);
        assert_eq!(parse_timestamp("00:01,000"), None);
    }
}
