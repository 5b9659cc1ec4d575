//! Compact "resets in" countdowns for utilization windows.

use chrono::{DateTime, Utc};

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Format the time remaining until `resets_at` relative to `now`.
///
/// Returns `"now"` once the reset has passed, `"?"` when the timestamp does
/// not parse, otherwise the two largest non-zero units out of days, hours
/// and minutes: `"45m"`, `"3h5m"`, `"2d4h"`. Sub-minute remainders are
/// truncated, so anything under a minute renders as `"0m"`.
pub fn format_resets_in(resets_at: &str, now: DateTime<Utc>) -> String {
    let Ok(reset) = DateTime::parse_from_rfc3339(resets_at) else {
        return "?".to_string();
    };

    let remaining = reset.with_timezone(&Utc) - now;
    if remaining.num_milliseconds() <= 0 {
        return "now".to_string();
    }

    let minutes = remaining.num_minutes();
    if minutes < MINUTES_PER_HOUR {
        return format!("{}m", minutes);
    }
    if minutes < MINUTES_PER_DAY {
        let hours = minutes / MINUTES_PER_HOUR;
        let rest = minutes % MINUTES_PER_HOUR;
        return if rest > 0 {
            format!("{}h{}m", hours, rest)
        } else {
            format!("{}h", hours)
        };
    }

    let days = minutes / MINUTES_PER_DAY;
    let hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    if hours > 0 {
        format!("{}d{}h", days, hours)
    } else {
        format!("{}d", days)
    }
}
