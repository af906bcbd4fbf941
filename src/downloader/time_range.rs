// Validated trim bounds and time text helpers

use serde::{Deserialize, Serialize};

use super::errors::PipelineError;

/// Start/end offsets into a media item, in seconds. Always `end > start >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Result<Self, PipelineError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(PipelineError::InvalidTimeRange(
                "start and end must be finite".to_string(),
            ));
        }
        if start < 0.0 || end < 0.0 {
            return Err(PipelineError::InvalidTimeRange(
                "start or end time cannot be negative".to_string(),
            ));
        }
        if end <= start {
            return Err(PipelineError::InvalidTimeRange(format!(
                "end time ({}) must be greater than start time ({})",
                format_hms(end),
                format_hms(start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from text such as "1:30" and "2:00"
    pub fn parse(start: &str, end: &str) -> Result<Self, PipelineError> {
        Self::new(parse_time_text(start)?, parse_time_text(end)?)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Fit the range into an item of known length.
    ///
    /// `duration_seconds == 0` means unknown and leaves the range as is.
    pub fn clamp_to(self, duration_seconds: u64) -> Result<Self, PipelineError> {
        if duration_seconds == 0 {
            return Ok(self);
        }
        let total = duration_seconds as f64;
        if self.start >= total {
            return Err(PipelineError::InvalidTimeRange(format!(
                "start time {} is past the end of the media ({})",
                format_hms(self.start),
                format_hms(total)
            )));
        }
        Self::new(self.start, self.end.min(total))
    }
}

/// Either a real range or the "no trim" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TrimRequest {
    #[default]
    NoTrim,
    Range(TimeRange),
}

impl TrimRequest {
    pub fn range(&self) -> Option<TimeRange> {
        match self {
            Self::NoTrim => None,
            Self::Range(range) => Some(*range),
        }
    }

    /// Build from optional start/end text; both absent means no trim.
    ///
    /// A missing start defaults to 0; a missing end requires the media length.
    pub fn from_text(
        start: Option<&str>,
        end: Option<&str>,
        duration_seconds: u64,
    ) -> Result<Self, PipelineError> {
        if start.is_none() && end.is_none() {
            return Ok(Self::NoTrim);
        }
        let start = match start {
            Some(text) => parse_time_text(text)?,
            None => 0.0,
        };
        let end = match end {
            Some(text) => parse_time_text(text)?,
            None if duration_seconds > 0 => duration_seconds as f64,
            None => {
                return Err(PipelineError::InvalidTimeRange(
                    "an end time is required when the media length is unknown".to_string(),
                ))
            }
        };
        Ok(Self::Range(TimeRange::new(start, end)?))
    }
}

/// Parse "H:MM:SS", "M:SS" or plain seconds.
pub fn parse_time_text(text: &str) -> Result<f64, PipelineError> {
    let invalid = || {
        PipelineError::InvalidTimeRange(format!(
            "invalid time '{}'. Use HH:MM:SS, MM:SS or seconds",
            text.trim()
        ))
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }

    let last = parts.len() - 1;
    let mut seconds = 0.0;
    for (idx, part) in parts.iter().enumerate() {
        let part = part.trim();
        // Only the seconds component may be fractional
        let value: f64 = if idx == last {
            part.parse().map_err(|_| invalid())?
        } else {
            part.parse::<u64>().map_err(|_| invalid())? as f64
        };
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        seconds = seconds * 60.0 + value;
    }
    Ok(seconds)
}

/// Render seconds as "H:MM:SS", or "M:SS" under an hour
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
