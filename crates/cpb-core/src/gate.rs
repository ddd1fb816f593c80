//! Access gate: users must belong to a given channel before using the bot.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::UserId,
    messaging::{
        port::MessagingPort,
        types::{ChatLookup, InlineButton, InlineKeyboard},
    },
};

pub const MUST_JOIN_TEXT: &str = "To use the bot you must be a subscriber of our channel";

#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn is_member(&self, user: UserId) -> bool;

    /// Reply markup shown next to [`MUST_JOIN_TEXT`].
    fn join_keyboard(&self) -> Option<InlineKeyboard> {
        None
    }
}

/// Gate used when no channel is required.
pub struct OpenGate;

#[async_trait]
impl AccessGate for OpenGate {
    async fn is_member(&self, _user: UserId) -> bool {
        true
    }
}

/// Checks the user's membership status in one channel through the transport.
///
/// Lookup failures count as "not a member".
pub struct ChannelMembershipGate {
    messenger: Arc<dyn MessagingPort>,
    channel: ChatLookup,
    join_url: Option<String>,
}

impl ChannelMembershipGate {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        channel: ChatLookup,
        join_url: Option<String>,
    ) -> Self {
        Self {
            messenger,
            channel,
            join_url,
        }
    }
}

#[async_trait]
impl AccessGate for ChannelMembershipGate {
    async fn is_member(&self, user: UserId) -> bool {
        match self.messenger.member_status(&self.channel, user).await {
            Ok(status) => status.is_present(),
            Err(e) => {
                tracing::debug!(user_id = user.0, error = %e, "membership lookup failed");
                false
            }
        }
    }

    fn join_keyboard(&self) -> Option<InlineKeyboard> {
        let url = self.join_url.as_ref()?;
        Some(InlineKeyboard::one_per_row(vec![InlineButton::url(
            "Join Channel",
            url.clone(),
        )]))
    }
}

/// Pick the gate the configuration asks for.
pub fn from_config(cfg: &Config, messenger: Arc<dyn MessagingPort>) -> Arc<dyn AccessGate> {
    let Some(channel) = cfg.required_channel.as_deref().and_then(ChatLookup::parse) else {
        return Arc::new(OpenGate);
    };
    Arc::new(ChannelMembershipGate::new(
        messenger,
        channel,
        cfg.join_channel_url.clone(),
    ))
}
