use once_cell::sync::Lazy;
use regex::Regex;

// "<amount> point(s) to|for <recipient>" where the recipient is a mention,
// a quoted phrase, or a bare token. The amount allows a sign and `,`
// thousands grouping.
static POINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<amount>[+-]?\d{1,3}(?:,\d{3})+|[+-]?\d+) ?points? (?:to|for) (?:<@!?(?P<recipient_id>\d+)>|(?P<recipient_name>"[^"\n]+"|\S+))"#,
    )
    .expect("point pattern must compile")
});

// A point phrase with no recipient, only meaningful on a reply. The explicit
// pattern above always wins when both could apply.
static REPLY_POINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<amount>[+-]?\d{1,3}(?:,\d{3})+|[+-]?\d+) ?points?\b")
        .expect("reply point pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientRef {
    /// A bare or quoted display name (quotes already stripped).
    Name(String),
    /// An explicit account mention.
    Snowflake(String),
    /// No recipient in the text; the author of the replied-to message.
    ReplyAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointCommand {
    pub amount: i128,
    pub recipient: RecipientRef,
}

/// Extracts a point command from free-form message text. `is_reply` enables
/// the narrower recipient-less pattern.
pub fn parse_point_command(content: &str, is_reply: bool) -> Option<PointCommand> {
    if let Some(caps) = POINT_PATTERN.captures(content) {
        let amount = parse_point_amount(caps.name("amount")?.as_str());
        let recipient = if let Some(id) = caps.name("recipient_id") {
            RecipientRef::Snowflake(id.as_str().to_string())
        } else {
            let name = caps
                .name("recipient_name")?
                .as_str()
                .trim_matches('"')
                .to_string();
            RecipientRef::Name(name)
        };
        return Some(PointCommand { amount, recipient });
    }

    if is_reply {
        if let Some(caps) = REPLY_POINT_PATTERN.captures(content) {
            let amount = parse_point_amount(caps.name("amount")?.as_str());
            return Some(PointCommand {
                amount,
                recipient: RecipientRef::ReplyAuthor,
            });
        }
    }

    None
}

// The regex guarantees sign + digits, so a parse failure can only be
// overflow; saturate so the range check downstream rejects it.
fn parse_point_amount(token: &str) -> i128 {
    let digits: String = token.chars().filter(|c| *c != ',').collect();
    match digits.parse::<i128>() {
        Ok(value) => value,
        Err(_) if digits.starts_with('-') => i128::MIN,
        Err(_) => i128::MAX,
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{PointCommand, RecipientRef, parse_point_command};

    #[test_case("1 point to recipient", 1, "recipient")]
    #[test_case("1,000 points to Abba-Zaba", 1_000, "Abba-Zaba")]
    #[test_case("-42 points to McDonald's", -42, "McDonald's")]
    #[test_case("0 points to \"name with spaces\"", 0, "name with spaces")]
    #[test_case("+5 points for bob", 5, "bob")]
    #[test_case("9,223,372,036,854,775,807 points to bob", 9_223_372_036_854_775_807, "bob")]
    fn parses_named_recipients(content: &str, amount: i128, name: &str) {
        let command = parse_point_command(content, false).expect("should match");
        assert_eq!(command.amount, amount);
        assert_eq!(command.recipient, RecipientRef::Name(name.to_string()));
    }

    #[test]
    fn parses_mention_recipients() {
        let command =
            parse_point_command("50 points to <@123456789>", false).expect("should match");
        assert_eq!(
            command,
            PointCommand {
                amount: 50,
                recipient: RecipientRef::Snowflake("123456789".to_string()),
            }
        );
    }

    #[test]
    fn parses_nickname_mention_recipients() {
        let command =
            parse_point_command("50 points to <@!123456789>", false).expect("should match");
        assert_eq!(
            command.recipient,
            RecipientRef::Snowflake("123456789".to_string())
        );
    }

    #[test]
    fn phrase_embedded_in_conversation_matches() {
        let command = parse_point_command(
            "that was great, 20 points to bob for the effort",
            false,
        )
        .expect("should match");
        assert_eq!(command.amount, 20);
        assert_eq!(command.recipient, RecipientRef::Name("bob".to_string()));
    }

    #[test]
    fn reply_phrase_matches_only_on_replies() {
        assert_eq!(parse_point_command("10 points", false), None);

        let command = parse_point_command("10 points", true).expect("should match");
        assert_eq!(command.amount, 10);
        assert_eq!(command.recipient, RecipientRef::ReplyAuthor);
    }

    #[test]
    fn explicit_recipient_wins_over_reply_pattern() {
        let command = parse_point_command("10 points to bob", true).expect("should match");
        assert_eq!(command.recipient, RecipientRef::Name("bob".to_string()));
    }

    #[test]
    fn oversized_amount_saturates_instead_of_panicking() {
        let command = parse_point_command(
            "999999999999999999999999999999999999999999 points to bob",
            false,
        )
        .expect("should match");
        assert_eq!(command.amount, i128::MAX);

        let command = parse_point_command(
            "-999999999999999999999999999999999999999999 points to bob",
            false,
        )
        .expect("should match");
        assert_eq!(command.amount, i128::MIN);
    }

    #[test_case("no points here at all")]
    #[test_case("points to bob")]
    #[test_case("five points to bob")]
    fn non_matching_messages_yield_none(content: &str) {
        assert_eq!(parse_point_command(content, false), None);
    }
}
