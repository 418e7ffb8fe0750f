/// Renders an integer with `,` thousands separators, keeping the sign.
pub fn format_thousands(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 { format!("-{grouped}") } else { grouped }
}

/// Truncates message content to `limit` characters, appending an ellipsis
/// when anything was cut off.
pub fn excerpt(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        content.to_string()
    } else {
        let mut truncated: String = content.chars().take(limit).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

/// Capitalizes each hyphen- or space-delimited segment of a display name
/// without touching the rest of the segment.
pub fn title_case_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut start_of_segment = true;
    for c in name.chars() {
        if start_of_segment {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start_of_segment = c == ' ' || c == '-';
    }
    out
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{excerpt, format_thousands, title_case_name};

    #[test_case(0, "0")]
    #[test_case(42, "42")]
    #[test_case(999, "999")]
    #[test_case(1_000, "1,000")]
    #[test_case(1_234_567, "1,234,567")]
    #[test_case(-42, "-42" ; "negative 42")]
    #[test_case(-1_000_000, "-1,000,000" ; "negative one million")]
    #[test_case(i64::MAX, "9,223,372,036,854,775,807")]
    fn format_thousands_groups_digits(amount: i64, expected: &str) {
        assert_eq!(format_thousands(amount), expected);
    }

    #[test]
    fn excerpt_keeps_short_content_untouched() {
        assert_eq!(excerpt("short message", 80), "short message");
    }

    #[test]
    fn excerpt_truncates_long_content_with_ellipsis() {
        let long = "x".repeat(100);
        let result = excerpt(&long, 80);
        assert_eq!(result.chars().count(), 81);
        assert!(result.ends_with('\u{2026}'));
    }

    #[test_case("bob", "Bob")]
    #[test_case("abba-zaba", "Abba-Zaba")]
    #[test_case("name with spaces", "Name With Spaces")]
    #[test_case("mcdonald's", "Mcdonald's")]
    fn title_case_capitalizes_segments(input: &str, expected: &str) {
        assert_eq!(title_case_name(input), expected);
    }
}
