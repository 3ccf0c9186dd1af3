//! LRC parsing and lyric/playback synchronisation.
//!
//! Gateway lyrics may carry a translation block after a marker line
//! (`[翻译]`, `[翻譯]` or `[translation]`). Translations are attached to
//! the closest main line within [`TRANSLATION_TOLERANCE_SECS`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Maximum time gap for a translation to be paired with a lyric line.
pub const TRANSLATION_TOLERANCE_SECS: f64 = 0.5;

static TIME_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{1,2}):(\d{1,2})(?:\.(\d{1,3}))?\]").expect("valid LRC time regex"));

const TRANSLATION_MARKERS: [&str; 3] = ["[翻译]", "[翻譯]", "[translation]"];
const PLACEHOLDERS: [&str; 3] = ["/", "//", "///"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Seconds from the start of the track.
    pub time: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct TimedText {
    time: f64,
    text: String,
}

fn is_translation_marker(line: &str) -> bool {
    let trimmed = line.trim();
    TRANSLATION_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

/// Splits the leading time tags off a line.
///
/// `[00:12.30][01:40.00]text` yields both times and `text`.
fn split_tags(line: &str) -> (Vec<f64>, &str) {
    let mut rest = line.trim_start();
    let mut times = Vec::new();

    while let Some(caps) = TIME_TAG.captures(rest) {
        let minutes: f64 = caps[1].parse().unwrap_or(0.0);
        let seconds: f64 = caps[2].parse().unwrap_or(0.0);
        let millis: f64 = caps
            .get(3)
            .map(|m| format!("{:0<3}", m.as_str()))
            .and_then(|padded| padded.parse().ok())
            .unwrap_or(0.0);
        times.push(minutes * 60.0 + seconds + millis / 1000.0);
        rest = &rest[caps[0].len()..];
    }

    (times, rest.trim())
}

fn collect_timed<'a>(lines: impl Iterator<Item = &'a str>, skip: &[&str]) -> Vec<TimedText> {
    let mut out = Vec::new();
    for line in lines {
        let (times, text) = split_tags(line);
        if text.is_empty() || skip.contains(&text) {
            continue;
        }
        out.extend(times.into_iter().map(|time| TimedText {
            time,
            text: text.to_string(),
        }));
    }
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}

/// Parses LRC text into time-ordered lines with optional translations.
pub fn parse_lyrics(lrc: &str) -> Vec<LyricLine> {
    let lines: Vec<&str> = lrc.lines().collect();
    let (main, translated) = match lines.iter().position(|line| is_translation_marker(line)) {
        Some(marker) => (&lines[..marker], &lines[marker + 1..]),
        None => (&lines[..], &lines[..0]),
    };

    let main = collect_timed(main.iter().copied(), &[]);
    let translations = collect_timed(translated.iter().copied(), &PLACEHOLDERS);

    main.into_iter()
        .map(|TimedText { time, text }| {
            let mut best: Option<(&str, f64)> = None;
            for candidate in &translations {
                let diff = (candidate.time - time).abs();
                if diff <= TRANSLATION_TOLERANCE_SECS && best.map_or(true, |(_, d)| diff < d) {
                    best = Some((&candidate.text, diff));
                }
                if candidate.time > time + TRANSLATION_TOLERANCE_SECS {
                    break;
                }
            }
            LyricLine {
                time,
                text,
                translation: best.map(|(text, _)| text.to_string()),
            }
        })
        .collect()
}

/// Index of the line being sung at `progress_secs`, if any.
pub fn active_line_index(lines: &[LyricLine], progress_secs: f64) -> Option<usize> {
    lines
        .partition_point(|line| line.time <= progress_secs)
        .checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_timestamps_and_drops_untimed_lines() {
        let lines = parse_lyrics("[ti:晴天]\n[00:05.5]故事的小黄花\n[01:02.05]从出生那年就飘着\n[00:10]\nplain text\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].time, 5.5);
        assert_eq!(lines[0].text, "故事的小黄花");
        assert!((lines[1].time - 62.05).abs() < 1e-9);
        assert_eq!(lines[1].translation, None);
    }

    #[test]
    fn repeated_tags_expand_and_sort() {
        let lines = parse_lyrics("[00:30.00][00:10.00]chorus\r\n[00:20.00]verse");
        let times: Vec<f64> = lines.iter().map(|l| l.time).collect();
        assert_eq!(times, vec![10.0, 20.0, 30.0]);
        assert_eq!(lines[2].text, "chorus");
    }

    #[test]
    fn translations_align_within_tolerance() {
        let lrc = "\
[00:01.00]first
[00:05.00]second
[00:09.00]third
[Translation]
[00:01.30]第一
[00:05.60]太远
[00:09.00]//
[00:08.80]第三";
        let lines = parse_lyrics(lrc);

        assert_eq!(lines[0].translation.as_deref(), Some("第一"));
        assert_eq!(lines[1].translation, None);
        assert_eq!(lines[2].translation.as_deref(), Some("第三"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn closest_translation_wins() {
        let lines = parse_lyrics("[00:02.00]line\n[翻译]\n[00:01.60]far\n[00:02.10]near\n");
        assert_eq!(lines[0].translation.as_deref(), Some("near"));
    }

    #[test]
    fn active_line_tracks_progress() {
        let lines = parse_lyrics("[00:01.00]a\n[00:03.00]b\n[00:05.00]c");
        assert_eq!(active_line_index(&lines, 0.5), None);
        assert_eq!(active_line_index(&lines, 1.0), Some(0));
        assert_eq!(active_line_index(&lines, 4.9), Some(1));
        assert_eq!(active_line_index(&lines, 300.0), Some(2));
        assert_eq!(active_line_index(&[], 3.0), None);
    }
}
