//! Incremental parser for ffmpeg output.
//!
//! ffmpeg reports progress in two shapes: the `-progress` key/value block
//! (`out_time_us=...`) and the human-readable stats line
//! (`frame=... time=00:00:04.00 ...`). The input duration shows up once in
//! the banner (`Duration: 00:01:23.45, start: ...`). [`ProgressParser`]
//! folds all of them into [`ProgressEvent`]s.

/// Structured event extracted from encoder output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Total media duration, in seconds.
    DurationDiscovered(f64),
    /// Media time processed so far, in seconds.
    PositionAdvanced(f64),
    /// The encoder exited (`None` when killed by a signal).
    ProcessExited { code: Option<i32> },
}

/// Parse `HH:MM:SS.ss`, `MM:SS.ss` or `SS.ss` into seconds.
///
/// Returns `None` for malformed input and for values that are not strictly
/// positive, so `00:00:00.00` is rejected.
pub fn parse_time_string(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let nums = parts
        .iter()
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f64>>>()?;

    let seconds = match nums.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        [s] => *s,
        _ => return None,
    };

    (seconds > 0.0).then_some(seconds)
}

/// Stateful line parser for one encoder run.
#[derive(Debug, Default)]
pub struct ProgressParser {
    total_secs: Option<f64>,
    partial: Vec<u8>,
}

impl ProgressParser {
    /// Create a parser with no known duration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one complete line.
    pub fn feed_line(&mut self, line: &str) -> Vec<ProgressEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        if let Some(total) = parse_duration_line(line) {
            self.total_secs = Some(total);
            return vec![ProgressEvent::DurationDiscovered(total)];
        }

        if let Some(value) = line.strip_prefix("out_time_us=") {
            return match value.trim().parse::<i64>() {
                Ok(us) if us >= 0 => vec![self.position(us as f64 / 1_000_000.0)],
                _ => Vec::new(),
            };
        }

        // The other `out_time*` keys duplicate `out_time_us`.
        if line.starts_with("out_time") {
            return Vec::new();
        }

        match parse_stats_time(line) {
            Some(secs) => vec![self.position(secs)],
            None => Vec::new(),
        }
    }

    /// Parse a raw byte chunk, keeping any trailing partial line for the
    /// next call. Both `\n` and `\r` terminate a line since ffmpeg redraws
    /// its stats line with carriage returns.
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        for line in split_lines(&mut self.partial, chunk) {
            events.extend(self.feed_line(&line));
        }
        events
    }

    /// Flush any buffered partial line and report process exit.
    pub fn finish(&mut self, code: Option<i32>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        if !self.partial.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.partial)).into_owned();
            events.extend(self.feed_line(&rest));
        }
        events.push(ProgressEvent::ProcessExited { code });
        events
    }

    fn position(&self, secs: f64) -> ProgressEvent {
        let clamped = match self.total_secs {
            Some(total) if total > 0.0 => secs.min(total),
            _ => secs,
        };
        ProgressEvent::PositionAdvanced(clamped)
    }
}

/// Split `chunk` into complete lines, carrying the unterminated remainder in
/// `partial`. Empty lines (e.g. the `\n` of a `\r\n` pair) are dropped.
pub fn split_lines(partial: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for &byte in chunk {
        if byte == b'\n' || byte == b'\r' {
            if !partial.is_empty() {
                lines.push(String::from_utf8_lossy(partial).into_owned());
                partial.clear();
            }
        } else {
            partial.push(byte);
        }
    }
    lines
}

fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.split_once("Duration:")?.1;
    let value = rest.split(',').next()?.trim();
    if value == "N/A" {
        return None;
    }
    parse_time_string(value)
}

fn parse_stats_time(line: &str) -> Option<f64> {
    let rest = line.split_once("time=")?.1;
    let value = rest.split_whitespace().next()?;
    parse_time_string(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_string_formats() {
        assert_eq!(parse_time_string("01:02:03.50"), Some(3723.5));
        assert_eq!(parse_time_string("02:03.50"), Some(123.5));
        assert_eq!(parse_time_string("3.5"), Some(3.5));
    }

    #[test]
    fn time_string_rejects_zero() {
        assert_eq!(parse_time_string("00:00:00"), None);
        assert_eq!(parse_time_string("00:00:00.00"), None);
        assert_eq!(parse_time_string("0"), None);
    }

    #[test]
    fn time_string_rejects_garbage() {
        assert_eq!(parse_time_string("N/A"), None);
        assert_eq!(parse_time_string(""), None);
        assert_eq!(parse_time_string("1:2:3:4"), None);
        assert_eq!(parse_time_string("aa:10"), None);
        assert_eq!(parse_time_string("-5"), None);
    }

    #[test]
    fn duration_banner_line() {
        let mut parser = ProgressParser::new();
        let events =
            parser.feed_line("  Duration: 00:01:23.50, start: 0.000000, bitrate: 1205 kb/s");
        assert_eq!(events, vec![ProgressEvent::DurationDiscovered(83.5)]);
        // Later positions are clamped to the discovered duration.
        assert_eq!(
            parser.feed_line("out_time_us=90000000"),
            vec![ProgressEvent::PositionAdvanced(83.5)]
        );
    }

    #[test]
    fn duration_not_available_is_ignored() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_line("  Duration: N/A, bitrate: N/A").is_empty());
        assert_eq!(
            parser.feed_line("out_time_us=90000000"),
            vec![ProgressEvent::PositionAdvanced(90.0)]
        );
    }

    #[test]
    fn out_time_us_converts_microseconds() {
        let mut parser = ProgressParser::new();
        assert_eq!(
            parser.feed_line("out_time_us=4500000"),
            vec![ProgressEvent::PositionAdvanced(4.5)]
        );
        assert_eq!(
            parser.feed_line("out_time_us=0"),
            vec![ProgressEvent::PositionAdvanced(0.0)]
        );
    }

    #[test]
    fn out_time_us_ignores_invalid() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_line("out_time_us=N/A").is_empty());
        assert!(parser.feed_line("out_time_us=-9223372036854775807").is_empty());
    }

    #[test]
    fn other_progress_keys_are_ignored() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_line("out_time=00:00:04.500000").is_empty());
        assert!(parser.feed_line("out_time_ms=4500000").is_empty());
        assert!(parser.feed_line("frame=120").is_empty());
        assert!(parser.feed_line("progress=continue").is_empty());
    }

    #[test]
    fn stats_line_fallback() {
        let mut parser = ProgressParser::new();
        let events = parser.feed_line(
            "frame=  240 fps= 60 q=28.0 size=     512kB time=00:00:08.00 bitrate= 524.3kbits/s speed=2.01x",
        );
        assert_eq!(events, vec![ProgressEvent::PositionAdvanced(8.0)]);
        assert!(parser.feed_line("frame=    0 fps=0.0 time=N/A bitrate=N/A").is_empty());
    }

    #[test]
    fn positions_clamp_to_duration() {
        let mut parser = ProgressParser::new();
        parser.feed_line("Duration: 00:00:10.00, start: 0.0");
        assert_eq!(
            parser.feed_line("out_time_us=12000000"),
            vec![ProgressEvent::PositionAdvanced(10.0)]
        );
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mov':").is_empty());
        assert!(parser.feed_line("   Stream #0:0: Video: h264").is_empty());
        assert!(parser.feed_line("").is_empty());
    }

    #[test]
    fn chunks_split_mid_line() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_chunk(b"  Durat").is_empty());
        assert_eq!(
            parser.feed_chunk(b"ion: 00:00:20.00, start: 0\nout_time_us=5"),
            vec![ProgressEvent::DurationDiscovered(20.0)]
        );
        assert_eq!(
            parser.feed_chunk(b"000000\r\n"),
            vec![ProgressEvent::PositionAdvanced(5.0)]
        );
    }

    #[test]
    fn carriage_return_stats_lines() {
        let mut parser = ProgressParser::new();
        let events = parser.feed_chunk(b"frame=1 time=00:00:01.00 bitrate=1\rframe=2 time=00:00:02.00 bitrate=1\r");
        assert_eq!(
            events,
            vec![
                ProgressEvent::PositionAdvanced(1.0),
                ProgressEvent::PositionAdvanced(2.0)
            ]
        );
    }

    #[test]
    fn finish_flushes_partial_line() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed_chunk(b"out_time_us=3000000").is_empty());
        assert_eq!(
            parser.finish(Some(0)),
            vec![
                ProgressEvent::PositionAdvanced(3.0),
                ProgressEvent::ProcessExited { code: Some(0) }
            ]
        );
    }
}
