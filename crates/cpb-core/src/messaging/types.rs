use chrono::{DateTime, Utc};

use crate::{
    content::{PostContent, UrlButton},
    domain::{ChatId, MessageRef, UserId},
};

/// Transport-agnostic incoming message, as far as the bot cares about it.
///
/// Telegram-specific fields should live in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// Recognised post content, `None` for kinds a post cannot carry.
    pub content: Option<PostContent>,
    pub text: Option<String>,
    /// Origin chat when the message was forwarded from a channel/group.
    pub forwarded_from: Option<ChatInfo>,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
    pub message: Option<MessageRef>,
}

/// A chat as resolved by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: Option<String>,
    pub username: Option<String>,
}

/// How to look a chat up: `@username` or numeric id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatLookup {
    Username(String),
    Id(ChatId),
}

impl ChatLookup {
    /// Interpret free text typed by the user.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if let Ok(id) = input.parse::<i64>() {
            return Some(ChatLookup::Id(ChatId(id)));
        }
        let name = input
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("t.me/")
            .trim_start_matches('@');
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(ChatLookup::Username(format!("@{name}")))
    }
}

/// Membership status of a user in a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    /// `Left` and `Banned` users are outside the chat; everyone else is in.
    pub fn is_present(self) -> bool {
        !matches!(self, MemberStatus::Left | MemberStatus::Banned)
    }
}

/// Inline keyboard (rows of buttons) attached to a bot message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// URL buttons under a post, one per row.
    pub fn from_url_buttons(buttons: &[UrlButton]) -> Self {
        Self::one_per_row(
            buttons
                .iter()
                .map(|b| InlineButton::url(b.label.clone(), b.href()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    /// Every callback payload on the keyboard, in order.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|b| match &b.action {
                ButtonAction::Callback(d) => Some(d.as_str()),
                ButtonAction::Url(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_lookup_parses_ids_and_usernames() {
        assert_eq!(
            ChatLookup::parse("-1001234567890"),
            Some(ChatLookup::Id(ChatId(-1001234567890)))
        );
        assert_eq!(
            ChatLookup::parse("@news"),
            Some(ChatLookup::Username("@news".into()))
        );
        assert_eq!(
            ChatLookup::parse("https://t.me/news"),
            Some(ChatLookup::Username("@news".into()))
        );
        assert_eq!(ChatLookup::parse("two words"), None);
        assert_eq!(ChatLookup::parse("   "), None);
    }

    #[test]
    fn url_buttons_render_one_per_row() {
        let kb = InlineKeyboard::from_url_buttons(&[
            UrlButton {
                label: "A".into(),
                url: "t.me/a".into(),
            },
            UrlButton {
                label: "B".into(),
                url: "https://b".into(),
            },
        ]);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[0][0].action, ButtonAction::Url("https://t.me/a".into()));
        assert!(kb.callback_data().is_empty());
    }
}
