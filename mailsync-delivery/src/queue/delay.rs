//! Relative send delays such as `"5 minutes"` or `"+1 hour 30 mins"`

use chrono::{DateTime, Duration, Utc};

/// Delay in seconds used when none is configured or it cannot be understood.
pub const DEFAULT_DELAY_SECS: i64 = 60;

fn unit_seconds(unit: &str) -> Option<i64> {
    Some(match unit {
        "sec" | "secs" | "second" | "seconds" => 1,
        "min" | "mins" | "minute" | "minutes" => 60,
        "hour" | "hours" => 3_600,
        "day" | "days" => 86_400,
        "week" | "weeks" => 604_800,
        _ => return None,
    })
}

/// Parse a relative delay.
///
/// The grammar is an optional leading `+` followed by one or more
/// `<integer> <unit>` pairs. Units are case-insensitive. Returns `None` for
/// anything else, including an empty string.
pub fn parse_delay(input: &str) -> Option<Duration> {
    let input = input.trim();
    let input = input.strip_prefix('+').unwrap_or(input).to_ascii_lowercase();

    let mut tokens = input.split_whitespace().peekable();
    tokens.peek()?;

    let mut total: i64 = 0;
    while let Some(amount) = tokens.next() {
        let amount = i64::from(amount.parse::<u32>().ok()?);
        let unit = unit_seconds(tokens.next()?)?;
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }

    Duration::try_seconds(total)
}

/// When a job queued at `now` with the given delay should run.
pub fn run_at(now: DateTime<Utc>, delay: &str) -> DateTime<Utc> {
    let fallback = Duration::seconds(DEFAULT_DELAY_SECS);
    let delay = parse_delay(delay).unwrap_or(fallback);

    now.checked_add_signed(delay).unwrap_or(now + fallback)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("5 minutes"), Some(Duration::minutes(5)));
        assert_eq!(parse_delay("+1 HOUR"), Some(Duration::hours(1)));
        assert_eq!(
            parse_delay("1 day 2 hours 30 mins"),
            Some(Duration::days(1) + Duration::hours(2) + Duration::minutes(30))
        );
        assert_eq!(parse_delay("2 weeks"), Some(Duration::weeks(2)));
        assert_eq!(parse_delay("90 sec"), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_parse_delay_rejects_garbage() {
        assert_eq!(parse_delay(""), None);
        assert_eq!(parse_delay("banana"), None);
        assert_eq!(parse_delay("5"), None);
        assert_eq!(parse_delay("5 fortnights"), None);
        assert_eq!(parse_delay("minutes 5"), None);
        assert_eq!(parse_delay("-5 minutes"), None);
    }

    #[test]
    fn test_run_at_falls_back_to_one_minute() {
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();

        assert_eq!(run_at(now, ""), now + Duration::minutes(1));
        assert_eq!(run_at(now, "banana"), now + Duration::minutes(1));
        assert_eq!(run_at(now, "10 minutes"), now + Duration::minutes(10));
    }
}
