use async_trait::async_trait;

use crate::{
    content::{PostContent, UrlButton},
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{ChatInfo, ChatLookup, InlineKeyboard, MemberStatus},
    Result,
};

/// Delivery transport port.
///
/// Telegram is the only implementation; the core drives everything through this
/// trait so tests can substitute a recording fake.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Render a post by its content kind with URL buttons underneath.
    async fn send_post(
        &self,
        chat_id: ChatId,
        content: &PostContent,
        buttons: &[UrlButton],
    ) -> Result<MessageRef>;

    async fn edit_text(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<ChatInfo>;

    async fn member_status(&self, chat: &ChatLookup, user: UserId) -> Result<MemberStatus>;

    /// The bot's own user id.
    async fn bot_user_id(&self) -> Result<UserId>;
}
