use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static REMINDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)remind me (?P<preposition>in|at|on) (?P<time>.+?)(?: every (?P<interval>.+))? to (?P<body>.+)",
    )
    .expect("reminder pattern must compile")
});

// Unit letters are case-sensitive: `m` is months, `M` is minutes.
static DURATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<years>\d+) ?(?:years|year|Y|y) ?)?(?:(?P<months>\d+) ?(?:months|month|m) ?)?(?:(?P<weeks>\d+) ?(?:weeks|week|W|w) ?)?(?:(?P<days>\d+) ?(?:days|day|D|d) ?)?(?:(?P<hours>\d+) ?(?:hours|hour|hrs|hr|H|h) ?)?(?:(?P<minutes>\d+) ?(?:minutes|minute|min|M) ?)?(?:(?P<seconds>\d+) ?(?:seconds|second|secs|sec|S|s))?$",
    )
    .expect("duration pattern must compile")
});

const YEAR_SECONDS: i64 = 365 * 86_400;
const MONTH_SECONDS: i64 = 30 * 86_400;

const UNIT_SECONDS: [(&str, i64); 7] = [
    ("years", YEAR_SECONDS),
    ("months", MONTH_SECONDS),
    ("weeks", 7 * 86_400),
    ("days", 86_400),
    ("hours", 3_600),
    ("minutes", 60),
    ("seconds", 1),
];

/// Shortest allowed recurrence: one day.
pub const MIN_RECURRENCE_SECONDS: i64 = 86_400;
/// Longest allowed recurrence, roughly 68 years.
pub const MAX_RECURRENCE_SECONDS: i64 = 2_147_483_647;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preposition {
    /// A relative duration from now.
    In,
    /// An absolute date/time in the user's timezone.
    At,
    On,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderCommand {
    pub preposition: Preposition,
    pub time: String,
    pub interval: Option<String>,
    pub body: String,
}

/// Extracts a reminder request from free-form message text.
pub fn parse_reminder_command(content: &str) -> Option<ReminderCommand> {
    let caps = REMINDER_PATTERN.captures(content)?;

    let preposition = match caps.name("preposition")?.as_str().to_lowercase().as_str() {
        "in" => Preposition::In,
        "at" => Preposition::At,
        "on" => Preposition::On,
        _ => return None,
    };

    Some(ReminderCommand {
        preposition,
        time: caps.name("time")?.as_str().trim().to_string(),
        interval: caps.name("interval").map(|m| m.as_str().trim().to_string()),
        body: caps.name("body")?.as_str().trim().to_string(),
    })
}

/// Parses a relative duration like "1h30M" or "2 weeks 3 days". Absent units
/// count as zero; an expression with no unit at all is invalid.
pub fn parse_relative_time(text: &str) -> Option<Duration> {
    let caps = DURATION_PATTERN.captures(text.trim())?;

    let mut matched_any = false;
    let mut total: i64 = 0;
    for (name, unit_seconds) in UNIT_SECONDS {
        if let Some(m) = caps.name(name) {
            matched_any = true;
            let value = m.as_str().parse::<i64>().unwrap_or(i64::MAX);
            total = total.saturating_add(value.saturating_mul(unit_seconds));
        }
    }

    if !matched_any {
        return None;
    }

    Some(Duration::seconds(total))
}

/// Parses an absolute date/time expression in the given timezone. Unparsable
/// text and local times made ambiguous by a DST fold or gap yield None.
pub fn parse_absolute_time(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M %p",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return resolve_local(naive, tz);
        }
    }

    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return resolve_local(date.and_hms_opt(0, 0, 0)?, tz);
        }
    }

    const TIME_FORMATS: [&str; 6] = ["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M%p", "%I %p", "%I%p"];
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            let today = Utc::now().with_timezone(&tz).date_naive();
            return resolve_local(NaiveDateTime::new(today, time), tz);
        }
    }

    None
}

fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        // DST folds and gaps have no single answer; refuse rather than guess
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use chrono_tz::Tz;
    use test_case::test_case;

    use super::{
        Preposition, parse_absolute_time, parse_relative_time, parse_reminder_command,
    };

    #[test]
    fn parses_relative_reminder() {
        let command =
            parse_reminder_command("remind me in 10 minutes to check the oven").expect("match");
        assert_eq!(command.preposition, Preposition::In);
        assert_eq!(command.time, "10 minutes");
        assert_eq!(command.interval, None);
        assert_eq!(command.body, "check the oven");
    }

    #[test]
    fn parses_recurring_reminder() {
        let command =
            parse_reminder_command("remind me in 1 hour every 1 day to stand up").expect("match");
        assert_eq!(command.preposition, Preposition::In);
        assert_eq!(command.time, "1 hour");
        assert_eq!(command.interval.as_deref(), Some("1 day"));
        assert_eq!(command.body, "stand up");
    }

    #[test]
    fn parses_absolute_reminder() {
        let command =
            parse_reminder_command("Remind me at 5pm to walk the dog").expect("match");
        assert_eq!(command.preposition, Preposition::At);
        assert_eq!(command.time, "5pm");
        assert_eq!(command.body, "walk the dog");
    }

    #[test]
    fn body_may_contain_the_word_to() {
        let command =
            parse_reminder_command("remind me in 2 days to go to the gym").expect("match");
        assert_eq!(command.time, "2 days");
        assert_eq!(command.body, "go to the gym");
    }

    #[test]
    fn unrelated_messages_do_not_match() {
        assert_eq!(parse_reminder_command("remind me later maybe"), None);
        assert_eq!(parse_reminder_command("nothing to see here"), None);
    }

    #[test_case("10 minutes", 600)]
    #[test_case("1 hour", 3_600)]
    #[test_case("1 day", 86_400)]
    #[test_case("2 weeks", 1_209_600)]
    #[test_case("1h30M", 5_400)]
    #[test_case("1y", 31_536_000)]
    #[test_case("1m", 2_592_000; "lowercase m is months")]
    #[test_case("1M", 60; "uppercase m is minutes")]
    #[test_case("90 seconds", 90)]
    #[test_case("1 week 2 days", 777_600)]
    fn relative_durations_parse(text: &str, expected_seconds: i64) {
        assert_eq!(
            parse_relative_time(text),
            Some(Duration::seconds(expected_seconds))
        );
    }

    #[test_case("")]
    #[test_case("soon")]
    #[test_case("10 fortnights")]
    fn invalid_durations_yield_none(text: &str) {
        assert_eq!(parse_relative_time(text), None);
    }

    #[test]
    fn absolute_datetime_respects_timezone() {
        let tz: Tz = "America/New_York".parse().expect("valid tz");
        let parsed = parse_absolute_time("2030-06-15 12:00", tz).expect("parses");

        // noon EDT is 16:00 UTC
        let expected = Utc.with_ymd_and_hms(2030, 6, 15, 16, 0, 0).single().expect("valid");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn absolute_datetime_defaults_to_utc() {
        let parsed = parse_absolute_time("2030-06-15 12:00", chrono_tz::UTC).expect("parses");
        let expected = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).single().expect("valid");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn dst_gap_is_rejected_as_ambiguous() {
        // 2:30am on 2026-03-08 does not exist in America/New_York
        let tz: Tz = "America/New_York".parse().expect("valid tz");
        assert_eq!(parse_absolute_time("2026-03-08 02:30", tz), None);
    }

    #[test]
    fn dst_fold_is_rejected_as_ambiguous() {
        // 1:30am on 2026-11-01 happens twice in America/New_York
        let tz: Tz = "America/New_York".parse().expect("valid tz");
        assert_eq!(parse_absolute_time("2026-11-01 01:30", tz), None);
    }

    #[test]
    fn unparsable_text_yields_none() {
        assert_eq!(parse_absolute_time("whenever works", chrono_tz::UTC), None);
    }
}
