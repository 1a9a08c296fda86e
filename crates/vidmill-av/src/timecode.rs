//! Timestamp parsing and formatting.
//!
//! Accepts the `HH:MM:SS(.fff)`, `MM:SS` and bare-seconds spellings that media
//! tools emit, and renders durations back out for ffmpeg arguments and
//! chapter metadata.

use crate::{Error, Result};
use std::time::Duration;

/// Parse a timestamp string into a [`Duration`].
///
/// Recognized forms: `HH:MM:SS`, `HH:MM:SS.fff`, `MM:SS`, and plain seconds
/// (`90`, `90.5`).
pub fn parse_timecode(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::invalid_parameters("empty timestamp"));
    }

    let parts: Vec<&str> = s.split(':').collect();
    let secs = match parts.as_slice() {
        [ss] => parse_part(ss)?,
        [mm, ss] => parse_part(mm)? * 60.0 + parse_part(ss)?,
        [hh, mm, ss] => parse_part(hh)? * 3600.0 + parse_part(mm)? * 60.0 + parse_part(ss)?,
        _ => {
            return Err(Error::invalid_parameters(format!(
                "unrecognized timestamp: {s}"
            )))
        }
    };

    Ok(Duration::from_secs_f64(secs))
}

fn parse_part(part: &str) -> Result<f64> {
    let value: f64 = part
        .parse()
        .map_err(|_| Error::invalid_parameters(format!("invalid timestamp component: {part}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(Error::invalid_parameters(format!(
            "invalid timestamp component: {part}"
        )));
    }
    Ok(value)
}

/// Format a duration as `HH:MM:SS`, dropping any fractional part.
pub fn format_timecode(d: Duration) -> String {
    let total = d.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60)
}

/// Render a duration as a seconds string for ffmpeg arguments.
///
/// Whole seconds render without a decimal point; fractional durations keep
/// millisecond precision with trailing zeros trimmed, so identical input
/// always yields identical argument text.
pub fn format_seconds(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        return d.as_secs().to_string();
    }
    let s = format!("{:.3}", d.as_secs_f64());
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Serde helpers to (de)serialize `Duration` as seconds (fractional allowed).
pub mod serde_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Like [`serde_secs`] but for `Option<Duration>`.
pub mod serde_secs_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(Duration::from_secs_f64(v))),
            Some(_) => Err(serde::de::Error::custom("duration must be non-negative")),
            None => Ok(None),
        }
    }
}
