//! Post content and URL buttons.

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// A transport-level media reference plus its optional caption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub file_id: String,
    pub caption: Option<String>,
}

impl Media {
    pub fn new(file_id: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            caption: caption.filter(|c| !c.is_empty()),
        }
    }
}

/// Everything a post can carry. One variant per Telegram content kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostContent {
    Text(String),
    Photo(Media),
    Video(Media),
    Document(Media),
    Audio(Media),
    Voice(Media),
    Sticker(String),
    Animation(Media),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Animation,
}

impl PostContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            PostContent::Text(_) => ContentKind::Text,
            PostContent::Photo(_) => ContentKind::Photo,
            PostContent::Video(_) => ContentKind::Video,
            PostContent::Document(_) => ContentKind::Document,
            PostContent::Audio(_) => ContentKind::Audio,
            PostContent::Voice(_) => ContentKind::Voice,
            PostContent::Sticker(_) => ContentKind::Sticker,
            PostContent::Animation(_) => ContentKind::Animation,
        }
    }

    /// Text payloads double as their own caption; stickers never have one.
    pub fn caption(&self) -> Option<&str> {
        match self {
            PostContent::Text(text) => Some(text.as_str()),
            PostContent::Sticker(_) => None,
            PostContent::Photo(m)
            | PostContent::Video(m)
            | PostContent::Document(m)
            | PostContent::Audio(m)
            | PostContent::Voice(m)
            | PostContent::Animation(m) => m.caption.as_deref(),
        }
    }
}

impl ContentKind {
    pub fn label(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::Document => "document",
            ContentKind::Audio => "audio",
            ContentKind::Voice => "voice",
            ContentKind::Sticker => "sticker",
            ContentKind::Animation => "animation",
        }
    }
}

// ============== URL Buttons ==============

pub const ALLOWED_URL_PREFIXES: [&str; 3] = ["http://", "https://", "t.me/"];

/// Reply shown when a button line cannot be parsed.
pub const BUTTON_FORMAT_HINT: &str = "Button Name - https://example.com";

/// A URL button attached under the post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlButton {
    pub label: String,
    pub url: String,
}

impl UrlButton {
    /// Parse `<label> - <url>`: split on the first `-`, trim both halves.
    pub fn parse(input: &str) -> Result<Self> {
        let Some((label, url)) = input.split_once('-') else {
            return Err(Error::Validation("Invalid format".to_string()));
        };
        let label = label.trim();
        let url = url.trim();
        if label.is_empty() || url.is_empty() {
            return Err(Error::Validation("Invalid format".to_string()));
        }
        if !ALLOWED_URL_PREFIXES.iter().any(|p| url.starts_with(p)) {
            return Err(Error::Validation(
                "Invalid URL. URL must start with http://, https://, or t.me/".to_string(),
            ));
        }
        let button = Self {
            label: label.to_string(),
            url: url.to_string(),
        };
        match url::Url::parse(&button.href()) {
            Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(button),
            _ => Err(Error::Validation(format!("Invalid URL: {url}"))),
        }
    }

    /// The link as sent on the wire (`t.me/...` gains an https scheme).
    pub fn href(&self) -> String {
        if self.url.starts_with("t.me/") {
            format!("https://{}", self.url)
        } else {
            self.url.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_and_url() {
        let b = UrlButton::parse("Download - https://example.com").unwrap();
        assert_eq!(b.label, "Download");
        assert_eq!(b.url, "https://example.com");
    }

    #[test]
    fn rejects_missing_separator() {
        let err = UrlButton::parse("Download https://example.com").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_disallowed_scheme() {
        let err = UrlButton::parse("Download - ftp://x").unwrap_err();
        assert!(err.to_string().contains("URL must start with"));
    }

    #[test]
    fn rejects_empty_halves() {
        assert!(UrlButton::parse(" - https://example.com").is_err());
        assert!(UrlButton::parse("Download -   ").is_err());
    }

    #[test]
    fn accepts_telegram_links_and_adds_scheme_on_wire() {
        let b = UrlButton::parse("Join - t.me/somechannel").unwrap();
        assert_eq!(b.url, "t.me/somechannel");
        assert_eq!(b.href(), "https://t.me/somechannel");
    }

    #[test]
    fn rejects_urls_the_transport_cannot_send() {
        for line in [
            "Download - https://",
            "Site - http://exa mple.com",
            "Go - https://:80",
        ] {
            let err = UrlButton::parse(line).unwrap_err();
            assert!(
                matches!(&err, Error::Validation(m) if m.starts_with("Invalid URL")),
                "{line}: {err}"
            );
        }
    }

    #[test]
    fn text_content_is_its_own_caption() {
        let c = PostContent::Text("Hello world".to_string());
        assert_eq!(c.caption(), Some("Hello world"));
        assert_eq!(c.kind(), ContentKind::Text);
        assert_eq!(PostContent::Sticker("s".into()).caption(), None);
    }
}
