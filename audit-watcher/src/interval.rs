//! Sleep interval tokens such as `30s`, `10m`, `8h`, `2d` or `1w`.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::types::{Result, WatcherError};

pub const DEFAULT_SLEEP: Duration = Duration::from_secs(10 * 60);

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^([1-9][0-9]*)([smhdw])$").expect("interval pattern is valid")
    })
}

fn unit_seconds(unit: char) -> u64 {
    match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 60 * 60 * 24,
        _ => 60 * 60 * 24 * 7,
    }
}

fn unit_label(unit: char) -> &'static str {
    match unit {
        's' => "seconds",
        'm' => "minutes",
        'h' => "hours",
        'd' => "days",
        _ => "weeks",
    }
}

fn split(token: &str) -> Option<(u64, char)> {
    let caps = token_pattern().captures(token.trim())?;
    let quantity = caps[1].parse::<u64>().ok()?;
    let unit = caps[2].chars().next()?.to_ascii_lowercase();
    Some((quantity, unit))
}

/// Convert a magnitude+unit token into a duration.
pub fn parse(token: &str) -> Result<Duration> {
    let (quantity, unit) = split(token).ok_or_else(|| {
        WatcherError::Config(format!(
            "sleep time '{token}' is not a positive count followed by one of s, m, h, d, w"
        ))
    })?;
    quantity
        .checked_mul(unit_seconds(unit))
        .map(Duration::from_secs)
        .ok_or_else(|| WatcherError::Config(format!("sleep time '{token}' is too large")))
}

/// Human phrase for a token, e.g. `10m` -> "10 minutes", `1h` -> "1 hour".
pub fn phrase(token: &str) -> String {
    match split(token) {
        Some((quantity, unit)) => labelled(quantity, unit_label(unit)),
        None => format!("{token} milliseconds"),
    }
}

/// Human phrase for a duration, using the largest unit that divides it.
pub fn duration_phrase(duration: Duration) -> String {
    let secs = duration.as_secs();
    for unit in ['w', 'd', 'h', 'm'] {
        let size = unit_seconds(unit);
        if secs >= size && secs % size == 0 {
            return labelled(secs / size, unit_label(unit));
        }
    }
    labelled(secs, unit_label('s'))
}

fn labelled(quantity: u64, label: &str) -> String {
    if quantity == 1 {
        format!("1 {}", &label[..label.len() - 1])
    } else {
        format!("{quantity} {label}")
    }
}
