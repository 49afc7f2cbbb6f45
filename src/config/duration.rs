//! # Duration Parsing
//!
//! Parses the short duration strings used by the e2e configuration.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?P<number>\d+)(?P<unit>ms|[smhd])$"));

/// Parse a Kubernetes style duration string into a [`Duration`]
/// Supports formats: "500ms", "30s", "1m", "5m", "1h", "2h", "1d"
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_regex = DURATION_REGEX
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let lower = duration_trimmed.to_lowercase();
    let captures = duration_regex.captures(&lower).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '10s', '5m', '1h')",
            duration_trimmed
        )
    })?;

    let (Some(number), Some(unit)) = (captures.name("number"), captures.name("unit")) else {
        return Err(anyhow::anyhow!(
            "Failed to extract number and unit from duration '{}'",
            duration_trimmed
        ));
    };

    let number: u64 = number.as_str().parse().map_err(|e| {
        anyhow::anyhow!("Invalid duration number in '{}': {}", duration_trimmed, e)
    })?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "Duration number must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    let seconds_per_unit: u64 = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(number)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{}' in duration '{}'. Expected: ms, s, m, h, or d",
                other,
                duration_trimmed
            ));
        }
    };
    let seconds = number.checked_mul(seconds_per_unit).ok_or_else(|| {
        anyhow::anyhow!("Duration '{}' is too large", duration_trimmed)
    })?;
    let duration = Duration::from_secs(seconds);

    Ok(duration)
}
