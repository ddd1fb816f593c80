//! Telegram adapter (teloxide).
//!
//! This crate implements the `cpb-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Recipient,
    },
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use cpb_core::{
    content::{PostContent, UrlButton},
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::{Error, TransportError},
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, ChatInfo, ChatLookup, InlineKeyboard, MemberStatus},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::Transport(classify(&e))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::debug!(wait_secs = d.as_secs(), "telegram asked us to retry");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    fn sent(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

/// Sort a Bot API failure into the buckets the core reports on.
pub fn classify(e: &RequestError) -> TransportError {
    match e {
        RequestError::Api(api) => match api {
            ApiError::ChatNotFound => TransportError::ChatNotFound,
            ApiError::BotKicked => TransportError::NotMember,
            ApiError::NotEnoughRightsToPostMessages => {
                TransportError::MissingRights("send messages".to_string())
            }
            ApiError::MessageCantBeDeleted => {
                TransportError::MissingRights("delete messages".to_string())
            }
            ApiError::Unknown(s) => classify_unknown(s),
            other => classify_unknown(&other.to_string()),
        },
        other => TransportError::Other(other.to_string()),
    }
}

fn classify_unknown(description: &str) -> TransportError {
    let lower = description.to_lowercase();
    if lower.contains("username_invalid") || lower.contains("username invalid") {
        TransportError::InvalidUsername
    } else if lower.contains("username_not_occupied") || lower.contains("chat not found") {
        TransportError::ChatNotFound
    } else if lower.contains("chat_admin_required") || lower.contains("not enough rights") {
        TransportError::MissingRights("administrator".to_string())
    } else if lower.contains("not a member")
        || lower.contains("participant")
        || lower.contains("user not found")
        || lower.contains("bot was kicked")
    {
        TransportError::NotMember
    } else {
        TransportError::Other(description.to_string())
    }
}

fn member_status(status: ChatMemberStatus) -> MemberStatus {
    match status {
        ChatMemberStatus::Owner => MemberStatus::Owner,
        ChatMemberStatus::Administrator => MemberStatus::Administrator,
        ChatMemberStatus::Member => MemberStatus::Member,
        ChatMemberStatus::Restricted => MemberStatus::Restricted,
        ChatMemberStatus::Left => MemberStatus::Left,
        ChatMemberStatus::Banned => MemberStatus::Banned,
    }
}

fn recipient(lookup: &ChatLookup) -> Recipient {
    match lookup {
        ChatLookup::Username(name) => Recipient::ChannelUsername(name.clone()),
        ChatLookup::Id(id) => Recipient::Id(TelegramMessenger::tg_chat(*id)),
    }
}

/// Convert a core keyboard into Telegram markup.
pub fn to_markup(keyboard: &InlineKeyboard) -> Result<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in &keyboard.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for b in row {
            let button = match &b.action {
                ButtonAction::Callback(data) => {
                    InlineKeyboardButton::callback(b.label.clone(), data.clone())
                }
                ButtonAction::Url(url) => {
                    let url = reqwest::Url::parse(url)
                        .map_err(|e| Error::Validation(format!("Invalid URL {url}: {e}")))?;
                    InlineKeyboardButton::url(b.label.clone(), url)
                }
            };
            buttons.push(button);
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

fn post_markup(buttons: &[UrlButton]) -> Result<Option<InlineKeyboardMarkup>> {
    if buttons.is_empty() {
        return Ok(None);
    }
    to_markup(&InlineKeyboard::from_url_buttons(buttons)).map(Some)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = to_markup(&keyboard)?;
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_post(
        &self,
        chat_id: ChatId,
        content: &PostContent,
        buttons: &[UrlButton],
    ) -> Result<MessageRef> {
        let markup = post_markup(buttons)?;
        let chat = Self::tg_chat(chat_id);

        let msg = match content {
            PostContent::Text(text) => {
                self.with_retry(|| {
                    let mut req = self.bot.send_message(chat, text.clone());
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Photo(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_photo(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Video(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_video(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Document(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_document(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Audio(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_audio(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Voice(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_voice(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Sticker(file_id) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_sticker(chat, InputFile::file_id(file_id.clone()));
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
            PostContent::Animation(media) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_animation(chat, InputFile::file_id(media.file_id.clone()));
                    if let Some(c) = &media.caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?
            }
        };
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_text(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.as_ref().map(to_markup).transpose()?;
        self.with_retry(|| {
            let mut req = self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            );
            if let Some(m) = &markup {
                req = req.reply_markup(m.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<ChatInfo> {
        let chat = self
            .with_retry(|| self.bot.get_chat(recipient(lookup)))
            .await?;
        Ok(ChatInfo {
            id: ChatId(chat.id.0),
            title: chat.title().map(str::to_string),
            username: chat.username().map(str::to_string),
        })
    }

    async fn member_status(&self, chat: &ChatLookup, user: UserId) -> Result<MemberStatus> {
        let user_id = teloxide::types::UserId(user.0 as u64);
        let member = self
            .with_retry(|| self.bot.get_chat_member(recipient(chat), user_id))
            .await?;
        Ok(member_status(member.kind.status()))
    }

    async fn bot_user_id(&self) -> Result<UserId> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(UserId(me.user.id.0 as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpb_core::messaging::types::InlineButton;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn api_errors_are_classified() {
        assert_eq!(
            classify(&RequestError::Api(ApiError::ChatNotFound)),
            TransportError::ChatNotFound
        );
        assert_eq!(
            classify(&RequestError::Api(ApiError::BotKicked)),
            TransportError::NotMember
        );
        assert!(matches!(
            classify(&RequestError::Api(ApiError::NotEnoughRightsToPostMessages)),
            TransportError::MissingRights(_)
        ));
        assert_eq!(
            classify(&RequestError::Api(ApiError::Unknown(
                "Bad Request: USERNAME_INVALID".into()
            ))),
            TransportError::InvalidUsername
        );
        assert!(matches!(
            classify(&RequestError::Api(ApiError::Unknown("weird".into()))),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn keyboards_map_to_telegram_markup() {
        let kb = InlineKeyboard::new(vec![
            vec![InlineButton::callback("Yes", "post:confirm")],
            vec![InlineButton::url("Site", "https://example.com/")],
        ]);
        let markup = to_markup(&kb).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Site");
    }

    #[test]
    fn bad_urls_are_rejected_before_sending() {
        let kb = InlineKeyboard::one_per_row(vec![InlineButton::url("x", "not a url")]);
        assert!(matches!(to_markup(&kb), Err(Error::Validation(_))));
    }

    #[test]
    fn post_buttons_use_https_for_short_links() {
        let markup = post_markup(&[UrlButton {
            label: "Join".into(),
            url: "t.me/news".into(),
        }])
        .unwrap()
        .unwrap();
        match &markup.inline_keyboard[0][0].kind {
            InlineKeyboardButtonKind::Url(u) => assert_eq!(u.as_str(), "https://t.me/news"),
            other => panic!("expected a url button, got {other:?}"),
        }
        assert!(post_markup(&[]).unwrap().is_none());
    }
}
