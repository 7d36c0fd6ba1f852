//! Parser for ffmpeg's `-progress` key=value stream.

use regex_lite::Regex;

/// One completed progress block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub percent: u8,
    pub out_time_secs: f64,
    pub speed: Option<String>,
    /// The engine reported `progress=end`.
    pub finished: bool,
}

/// Accumulates key=value lines and emits a sample at the end of each block.
pub struct ProgressParser {
    duration_secs: Option<f64>,
    out_time_secs: f64,
    speed: Option<String>,
    last_percent: u8,
    time_regex: Option<Regex>,
    speed_regex: Option<Regex>,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            out_time_secs: 0.0,
            speed: None,
            last_percent: 0,
            // out_time_ms is microseconds too
            time_regex: Regex::new(r"^out_time_(?:us|ms)=(\d+)$").ok(),
            speed_regex: Regex::new(r"^speed=\s*(\d+\.?\d*)x$").ok(),
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<ProgressSample> {
        let line = line.trim();

        if let Some(state) = line.strip_prefix("progress=") {
            let finished = state == "end";
            let percent = if finished {
                100
            } else {
                // 100 is reserved for a finished encode
                self.computed_percent().min(99)
            };
            self.last_percent = self.last_percent.max(percent);

            return Some(ProgressSample {
                percent: self.last_percent,
                out_time_secs: self.out_time_secs,
                speed: self.speed.clone(),
                finished,
            });
        }

        if let Some(caps) = self.time_regex.as_ref().and_then(|re| re.captures(line)) {
            if let Some(micros) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                self.out_time_secs = micros / 1_000_000.0;
            }
        } else if let Some(caps) = self.speed_regex.as_ref().and_then(|re| re.captures(line)) {
            if let Some(speed) = caps.get(1) {
                self.speed = Some(format!("{}x", speed.as_str()));
            }
        }

        None
    }

    fn computed_percent(&self) -> u8 {
        match self.duration_secs {
            Some(duration) => (self.out_time_secs / duration * 100.0).clamp(0.0, 100.0) as u8,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_block(parser: &mut ProgressParser, lines: &[&str]) -> Option<ProgressSample> {
        let mut sample = None;
        for line in lines {
            if let Some(s) = parser.feed(line) {
                sample = Some(s);
            }
        }
        sample
    }

    #[test]
    fn test_block_yields_sample() {
        let mut parser = ProgressParser::new(Some(20.0));
        let sample = feed_block(
            &mut parser,
            &[
                "frame=120",
                "out_time_us=5000000",
                "out_time_ms=5000000",
                "out_time=00:00:05.000000",
                "speed=2.01x",
                "progress=continue",
            ],
        )
        .unwrap();

        assert_eq!(sample.percent, 25);
        assert!((sample.out_time_secs - 5.0).abs() < f64::EPSILON);
        assert_eq!(sample.speed.as_deref(), Some("2.01x"));
        assert!(!sample.finished);
    }

    #[test]
    fn test_percent_never_decreases_and_caps_before_end() {
        let mut parser = ProgressParser::new(Some(10.0));
        let first = feed_block(&mut parser, &["out_time_us=8000000", "progress=continue"]);
        assert_eq!(first.unwrap().percent, 80);

        // Negative timestamps show up at the start of some streams
        let second = feed_block(&mut parser, &["out_time_us=1000000", "progress=continue"]);
        assert_eq!(second.unwrap().percent, 80);

        let third = feed_block(&mut parser, &["out_time_us=12000000", "progress=continue"]);
        assert_eq!(third.unwrap().percent, 99);

        let end = feed_block(&mut parser, &["progress=end"]).unwrap();
        assert_eq!(end.percent, 100);
        assert!(end.finished);
    }

    #[test]
    fn test_unknown_duration_reports_zero_until_end() {
        let mut parser = ProgressParser::new(None);
        let sample = feed_block(&mut parser, &["out_time_us=5000000", "progress=continue"]);
        assert_eq!(sample.unwrap().percent, 0);
        assert!(parser.feed("speed=N/A").is_none());
    }
}
