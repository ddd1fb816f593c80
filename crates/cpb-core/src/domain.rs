use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl From<UserId> for ChatId {
    /// Private chats share the user's id.
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============== Channel Identity ==============

/// Prefix the Bot API puts in front of supergroup/channel ids.
pub const CHANNEL_ID_PREFIX: &str = "-100";

/// Number of trailing digits kept after the prefix.
pub const CHANNEL_ID_SUFFIX_DIGITS: usize = 10;

/// Rebuild a stored channel id into the `-100<suffix>` form the Bot API expects.
///
/// A leading `-100` is stripped, the remaining digits are reduced to the last
/// [`CHANNEL_ID_SUFFIX_DIGITS`], and the prefix is put back. Applying it to its
/// own output is a no-op.
///
/// The fixed prefix and suffix length only fit modern channel/supergroup ids;
/// basic-group ids (`-12345`) come out as a different chat.
pub fn normalize_channel_id(raw: i64) -> ChatId {
    let text = raw.to_string();
    let body = text.strip_prefix(CHANNEL_ID_PREFIX).unwrap_or(&text);
    let digits: Vec<u8> = body
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();
    let suffix = &digits[digits.len().saturating_sub(CHANNEL_ID_SUFFIX_DIGITS)..];

    // -100 followed by `suffix`, leading zeros included.
    let mut value: i64 = 100;
    for d in suffix {
        value = value * 10 + i64::from(*d);
    }
    ChatId(-value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_well_formed_channel_ids() {
        assert_eq!(normalize_channel_id(-1001234567890), ChatId(-1001234567890));
    }

    #[test]
    fn prefixes_bare_channel_suffix() {
        assert_eq!(normalize_channel_id(1234567890), ChatId(-1001234567890));
    }

    #[test]
    fn keeps_only_last_ten_digits() {
        assert_eq!(normalize_channel_id(99_1234567890), ChatId(-1001234567890));
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            -1001234567890,
            1234567890,
            -12345,
            12345,
            -1000012345,
            1001234,
            0,
            -100,
            i64::MAX,
            i64::MIN,
        ] {
            let once = normalize_channel_id(raw);
            let twice = normalize_channel_id(once.0);
            assert_eq!(once, twice, "raw={raw}");
        }
    }

    #[test]
    fn short_group_ids_are_reshaped() {
        // Known limitation of the fixed prefix: legacy group ids change.
        assert_eq!(normalize_channel_id(-12345), ChatId(-10012345));
    }
}
