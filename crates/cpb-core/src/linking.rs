//! Linking and unlinking channels: `/connect`, `/disconnect` and `/channels`.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use crate::{
    callbacks::ChannelAction,
    config::Config,
    domain::{ChatId, UserId},
    errors::{Error, TransportError},
    menus,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, ChatInfo, ChatLookup, IncomingMessage, InlineKeyboard},
    },
    registry::{ChannelLink, ChannelRegistry},
    Result,
};

pub const CONNECT_PROMPT: &str = "Please forward a message from the channel/group you want to connect,\n\
or send the channel/group username or ID.";
pub const NOT_FOUND_TEXT: &str =
    "Unable to find this channel/group. Please verify the information and try again.";
pub const INVALID_USERNAME_TEXT: &str = "Invalid username format. Please check and try again.";
pub const ALREADY_CONNECTED_TEXT: &str = "This channel is already connected to the bot!";
pub const BOT_NOT_MEMBER_TEXT: &str =
    "I'm not a member of this channel/group.\nPlease add me as an administrator first!";
pub const NEED_ADMIN_TEXT: &str = "I need admin permissions to function properly.\n\
Please make sure I have the following rights:\n- Send Messages\n- Delete Messages";
pub const NO_ACCESS_TEXT: &str = "I cannot access this channel/group.\nMake sure:\n\
1. The channel/group is public or I'm a member\n2. You have the right to add admins";
pub const PROBE_FAILED_TEXT: &str = "Failed to send/delete test message.\n\
Please make sure I have these permissions:\n- Send Messages\n- Delete Messages";
pub const SAVE_FAILED_TEXT: &str = "Failed to save channel information. Please try again.";
pub const NO_CHANNELS_TEXT: &str = "❌ You haven't connected any channels yet.";
pub const DISCONNECT_LIST_TEXT: &str = "Select a channel to disconnect:";
pub const DISCONNECTED_TEXT: &str = "✅ Channel disconnected successfully!";
pub const DISCONNECT_FAILED_TEXT: &str = "❌ Failed to disconnect channel.";
const PROBE_TEXT: &str = "Testing bot permissions... This message will be deleted.";
const GENERIC_FAILURE_TEXT: &str = "An error occurred. Please try again.";

pub struct ChannelLinker {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    registry: Arc<dyn ChannelRegistry>,
    /// Users whose next message is a channel reference.
    waiting: Mutex<HashSet<UserId>>,
}

impl ChannelLinker {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        registry: Arc<dyn ChannelRegistry>,
    ) -> Self {
        Self {
            cfg,
            messenger,
            registry,
            waiting: Mutex::new(HashSet::new()),
        }
    }

    /// `/connect`: capture the user's next message as a channel reference.
    pub async fn begin_connect(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        self.waiting_set().insert(user);
        self.messenger.send_text(chat_id, CONNECT_PROMPT).await?;
        Ok(())
    }

    pub fn is_waiting(&self, user: UserId) -> bool {
        self.waiting_set().contains(&user)
    }

    /// Close the user's connect window. Returns whether one was open.
    pub fn cancel_pending(&self, user: UserId) -> bool {
        self.waiting_set().remove(&user)
    }

    /// Consume the message if the user has a connect window open.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<bool> {
        if !self.cancel_pending(msg.user_id) {
            return Ok(false);
        }
        let reply = self.connect(msg).await?;
        self.messenger.send_text(msg.chat_id, &reply).await?;
        Ok(true)
    }

    /// Run the whole connect flow and return the reply for the user.
    async fn connect(&self, msg: &IncomingMessage) -> Result<String> {
        let chat = match &msg.forwarded_from {
            Some(origin) => origin.clone(),
            None => match self.resolve(msg.text.as_deref().unwrap_or_default()).await {
                Ok(chat) => chat,
                Err(reply) => return Ok(reply.to_string()),
            },
        };
        let channel_id = chat.id;
        tracing::info!(user_id = msg.user_id.0, channel_id = channel_id.0, "connecting channel");

        if self.registry.find_by_channel(channel_id).await?.is_some() {
            return Ok(ALREADY_CONNECTED_TEXT.to_string());
        }

        if let Err(reply) = self.check_bot_membership(channel_id).await? {
            return Ok(reply.to_string());
        }

        if let Err(e) = self.probe(channel_id).await {
            tracing::warn!(channel_id = channel_id.0, error = %e, "permission probe failed");
            return Ok(PROBE_FAILED_TEXT.to_string());
        }

        let title = chat.title.clone().unwrap_or_else(|| "Unknown".to_string());
        let link = ChannelLink {
            owner: msg.user_id,
            channel_id,
            title: title.clone(),
            username: chat.username.clone(),
            linked_at: msg.date,
        };
        match self.registry.insert(link).await {
            Ok(true) => {
                tracing::info!(user_id = msg.user_id.0, channel_id = channel_id.0, "channel linked");
                Ok(format!("✅ Successfully connected to {title}!"))
            }
            Ok(false) => Ok(ALREADY_CONNECTED_TEXT.to_string()),
            Err(e) if e.is_storage() => {
                tracing::error!(channel_id = channel_id.0, error = %e, "failed to save channel link");
                Ok(SAVE_FAILED_TEXT.to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, input: &str) -> std::result::Result<ChatInfo, &'static str> {
        let lookup = ChatLookup::parse(input).ok_or(INVALID_USERNAME_TEXT)?;
        match self.messenger.resolve_chat(&lookup).await {
            Ok(chat) => Ok(chat),
            Err(Error::Transport(TransportError::InvalidUsername)) => Err(INVALID_USERNAME_TEXT),
            Err(e) => {
                tracing::debug!(input, error = %e, "chat lookup failed");
                Err(NOT_FOUND_TEXT)
            }
        }
    }

    /// Outer `Err` is unexpected; inner `Err` is the diagnostic for the user.
    async fn check_bot_membership(
        &self,
        channel_id: ChatId,
    ) -> Result<std::result::Result<(), &'static str>> {
        let bot = self.messenger.bot_user_id().await?;
        let status = self
            .messenger
            .member_status(&ChatLookup::Id(channel_id), bot)
            .await;
        tracing::debug!(channel_id = channel_id.0, ?status, "bot membership");

        Ok(match status {
            Ok(s) if s.is_present() => Ok(()),
            Ok(_) | Err(Error::Transport(TransportError::NotMember)) => Err(BOT_NOT_MEMBER_TEXT),
            Err(Error::Transport(TransportError::MissingRights(_))) => Err(NEED_ADMIN_TEXT),
            Err(Error::Transport(_)) => Err(NO_ACCESS_TEXT),
            Err(e) => return Err(e),
        })
    }

    /// Post a throwaway message and delete it again.
    async fn probe(&self, channel_id: ChatId) -> Result<()> {
        let msg = self.messenger.send_text(channel_id, PROBE_TEXT).await?;
        tokio::time::sleep(self.cfg.link_probe_delay).await;
        self.messenger.delete_message(msg).await
    }

    /// `/disconnect`: first page of the user's channels.
    pub async fn show_disconnect(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        let links = self.registry.find_by_user(user).await?;
        if links.is_empty() {
            self.messenger.send_text(chat_id, NO_CHANNELS_TEXT).await?;
            return Ok(());
        }
        let keyboard = menus::disconnect_menu(&links, 1, self.cfg.channel_page_size);
        self.messenger
            .send_keyboard(chat_id, DISCONNECT_LIST_TEXT, keyboard)
            .await?;
        Ok(())
    }

    /// Handle one disconnect callback and answer it exactly once.
    pub async fn handle_callback(&self, cb: &CallbackQuery, action: ChannelAction) -> Result<()> {
        let toast = match self.on_callback(cb, action).await {
            Ok(toast) => toast,
            Err(e) => {
                tracing::error!(user_id = cb.user_id.0, data = %cb.data, error = %e, "channel callback failed");
                Some(GENERIC_FAILURE_TEXT)
            }
        };
        self.messenger.answer_callback(&cb.callback_id, toast).await
    }

    async fn on_callback(&self, cb: &CallbackQuery, action: ChannelAction) -> Result<Option<&'static str>> {
        let user = cb.user_id;
        match action {
            ChannelAction::Ask { channel_id, page } => {
                let link = self
                    .registry
                    .find_by_channel(channel_id)
                    .await?
                    .filter(|l| l.owner == user);
                let Some(link) = link else {
                    return Ok(Some("Channel not found."));
                };
                let text = format!("Are you sure you want to disconnect {}?", link.title);
                self.show(cb, &text, Some(menus::disconnect_confirm(&link, page)))
                    .await?;
                Ok(None)
            }
            ChannelAction::Abort { page } | ChannelAction::Page(page) => {
                let links = self.registry.find_by_user(user).await?;
                if links.is_empty() {
                    self.show(cb, NO_CHANNELS_TEXT, None).await?;
                } else {
                    let keyboard = menus::disconnect_menu(&links, page, self.cfg.channel_page_size);
                    self.show(cb, DISCONNECT_LIST_TEXT, Some(keyboard)).await?;
                }
                Ok(None)
            }
            ChannelAction::Confirm { channel_id, page } => {
                let outcome = match self.registry.delete(user, channel_id).await {
                    Ok(n) if n > 0 => {
                        tracing::info!(user_id = user.0, channel_id = channel_id.0, "channel unlinked");
                        DISCONNECTED_TEXT
                    }
                    Ok(_) => DISCONNECT_FAILED_TEXT,
                    Err(e) if e.is_storage() => {
                        tracing::error!(channel_id = channel_id.0, error = %e, "failed to remove channel link");
                        DISCONNECT_FAILED_TEXT
                    }
                    Err(e) => return Err(e),
                };

                let links = self.registry.find_by_user(user).await?;
                if links.is_empty() {
                    let text = format!("{outcome}\n\nNo more channels connected.");
                    self.show(cb, &text, None).await?;
                } else {
                    let text = format!("{outcome}\n\nSelect another channel to disconnect:");
                    let keyboard = menus::disconnect_menu(&links, page, self.cfg.channel_page_size);
                    self.show(cb, &text, Some(keyboard)).await?;
                }
                Ok(None)
            }
        }
    }

    /// `/channels`: numbered list of the user's linked channels.
    pub async fn list_channels(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        let links = match self.registry.find_by_user(user).await {
            Ok(links) => links,
            Err(e) if e.is_storage() => {
                tracing::error!(user_id = user.0, error = %e, "failed to read channel links");
                self.messenger
                    .send_text(chat_id, "❌ Failed to fetch channels list.\nPlease try again later.")
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let text = if links.is_empty() {
            format!("{NO_CHANNELS_TEXT}\nUse /connect to add a channel.")
        } else {
            format_channel_list(&links)
        };
        self.messenger.send_text(chat_id, &text).await?;
        Ok(())
    }

    async fn show(&self, cb: &CallbackQuery, text: &str, keyboard: Option<InlineKeyboard>) -> Result<()> {
        match cb.message {
            Some(msg) => self.messenger.edit_text(msg, text, keyboard).await,
            None => {
                match keyboard {
                    Some(kb) => self.messenger.send_keyboard(cb.chat_id, text, kb).await?,
                    None => self.messenger.send_text(cb.chat_id, text).await?,
                };
                Ok(())
            }
        }
    }

    fn waiting_set(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn format_channel_list(links: &[ChannelLink]) -> String {
    let mut out = String::from("🔗 Your Connected Channels:\n\n");
    for (idx, link) in links.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, link.title));
        if let Some(username) = &link.username {
            out.push_str(&format!("    @{}\n", username.trim_start_matches('@')));
        }
        out.push('\n');
    }
    out.push_str("\nUse /connect to add more channels.");
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        messaging::types::MemberStatus,
        registry::ChannelStore,
        testing::{FakeMessenger, Sent},
    };

    const USER: UserId = UserId(7);
    const CHANNEL: ChatId = ChatId(-1001111111111);

    fn setup_with(registry: ChannelStore) -> (Arc<FakeMessenger>, Arc<ChannelStore>, ChannelLinker) {
        let fake = Arc::new(FakeMessenger::default());
        let registry = Arc::new(registry);
        let mut cfg = Config::with_token("t");
        cfg.link_probe_delay = Duration::ZERO;
        cfg.channel_page_size = 2;
        let linker = ChannelLinker::new(Arc::new(cfg), fake.clone(), registry.clone());
        (fake, registry, linker)
    }

    fn setup() -> (Arc<FakeMessenger>, Arc<ChannelStore>, ChannelLinker) {
        setup_with(ChannelStore::in_memory())
    }

    fn info(id: ChatId, title: &str, username: Option<&str>) -> ChatInfo {
        ChatInfo {
            id,
            title: Some(title.to_string()),
            username: username.map(str::to_string),
        }
    }

    fn text_msg(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId::from(USER),
            user_id: USER,
            username: None,
            content: None,
            text: Some(text.to_string()),
            forwarded_from: None,
            date: Utc::now(),
        }
    }

    fn forwarded(chat: ChatInfo) -> IncomingMessage {
        IncomingMessage {
            forwarded_from: Some(chat),
            text: None,
            ..text_msg("")
        }
    }

    async fn link(registry: &ChannelStore, owner: UserId, id: ChatId, title: &str) {
        registry
            .insert(ChannelLink {
                owner,
                channel_id: id,
                title: title.to_string(),
                username: None,
                linked_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn callback(data: ChannelAction) -> CallbackQuery {
        CallbackQuery {
            chat_id: ChatId::from(USER),
            user_id: USER,
            username: None,
            callback_id: "cb".into(),
            data: data.encode(),
            message: Some(crate::domain::MessageRef {
                chat_id: ChatId::from(USER),
                message_id: crate::domain::MessageId(500),
            }),
        }
    }

    #[tokio::test]
    async fn messages_pass_through_without_connect_window() {
        let (_fake, _reg, linker) = setup();
        assert!(!linker.handle_message(&text_msg("@news")).await.unwrap());
    }

    #[tokio::test]
    async fn forwarded_post_links_channel_after_probe() {
        let (fake, reg, linker) = setup();
        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        assert!(linker.is_waiting(USER));

        let consumed = linker
            .handle_message(&forwarded(info(CHANNEL, "News", Some("news"))))
            .await
            .unwrap();
        assert!(consumed);
        assert!(!linker.is_waiting(USER));

        // Probe went to the channel and was removed again.
        let probe = fake
            .sent()
            .into_iter()
            .find_map(|s| match s {
                Sent::Text { chat_id, text } if chat_id == CHANNEL => Some(text),
                _ => None,
            })
            .unwrap();
        assert!(probe.starts_with("Testing bot permissions"));
        assert_eq!(fake.deletes().len(), 1);
        assert_eq!(fake.deletes()[0].chat_id, CHANNEL);

        assert!(fake.contains_text("✅ Successfully connected to News!"));
        let links = reg.find_by_user(USER).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].username.as_deref(), Some("news"));
    }

    #[tokio::test]
    async fn username_is_resolved_through_transport() {
        let (fake, reg, linker) = setup();
        fake.add_chat("@news", Ok(info(CHANNEL, "News", Some("news"))));
        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();

        linker.handle_message(&text_msg("@news")).await.unwrap();
        assert!(reg.find_by_channel(CHANNEL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resolution_failures_get_diagnostics() {
        let (fake, reg, linker) = setup();
        fake.add_chat("@bad", Err(TransportError::InvalidUsername));

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker.handle_message(&text_msg("@missing")).await.unwrap();
        assert!(fake.contains_text(NOT_FOUND_TEXT));

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker.handle_message(&text_msg("@bad")).await.unwrap();
        assert!(fake.contains_text(INVALID_USERNAME_TEXT));

        assert!(reg.find_by_user(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_linked_by_someone_else_is_refused() {
        let (fake, reg, linker) = setup();
        link(&reg, UserId(8), CHANNEL, "News").await;

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker
            .handle_message(&forwarded(info(CHANNEL, "News", None)))
            .await
            .unwrap();
        assert!(fake.contains_text(ALREADY_CONNECTED_TEXT));
        assert_eq!(reg.find_by_channel(CHANNEL).await.unwrap().unwrap().owner, UserId(8));
    }

    #[tokio::test]
    async fn bot_outside_channel_is_reported() {
        let (fake, reg, linker) = setup();
        fake.set_bot_status(CHANNEL, Ok(MemberStatus::Left));

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker
            .handle_message(&forwarded(info(CHANNEL, "News", None)))
            .await
            .unwrap();
        assert!(fake.contains_text("add me as an administrator"));
        assert!(reg.find_by_user(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_probe_names_missing_rights() {
        let (fake, reg, linker) = setup();
        fake.fail_chat(CHANNEL);

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker
            .handle_message(&forwarded(info(CHANNEL, "News", None)))
            .await
            .unwrap();
        assert!(fake.contains_text("- Send Messages\n- Delete Messages"));
        assert!(reg.find_by_user(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_asks_to_retry() {
        let path = std::env::temp_dir()
            .join(format!("cpb-missing-{}", std::process::id()))
            .join("nested")
            .join("channels.json");
        let (fake, reg, linker) = setup_with(ChannelStore::open(&path).unwrap());

        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        linker
            .handle_message(&forwarded(info(CHANNEL, "News", None)))
            .await
            .unwrap();
        assert!(fake.contains_text(SAVE_FAILED_TEXT));
        assert!(reg.find_by_user(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_pending_closes_window() {
        let (_fake, _reg, linker) = setup();
        linker.begin_connect(USER, ChatId::from(USER)).await.unwrap();
        assert!(linker.cancel_pending(USER));
        assert!(!linker.cancel_pending(USER));
        assert!(!linker.handle_message(&text_msg("@news")).await.unwrap());
    }

    #[tokio::test]
    async fn disconnect_flow_confirms_then_refreshes_list() {
        let (fake, reg, linker) = setup();
        link(&reg, USER, ChatId(-1001), "A").await;
        link(&reg, USER, ChatId(-1002), "B").await;
        link(&reg, USER, ChatId(-1003), "C").await;

        linker.show_disconnect(USER, ChatId::from(USER)).await.unwrap();
        let kb = fake.last_keyboard().unwrap();
        assert_eq!(kb.rows.len(), 3);
        assert!(kb.callback_data().contains(&"dc:page:2"));

        let ask = ChannelAction::Ask {
            channel_id: ChatId(-1001),
            page: 1,
        };
        linker.handle_callback(&callback(ask), ask).await.unwrap();
        assert!(fake.contains_text("Are you sure you want to disconnect A?"));

        let yes = ChannelAction::Confirm {
            channel_id: ChatId(-1001),
            page: 1,
        };
        linker.handle_callback(&callback(yes), yes).await.unwrap();
        assert!(fake.contains_text("✅ Channel disconnected successfully!\n\nSelect another channel"));
        assert_eq!(reg.find_by_user(USER).await.unwrap().len(), 2);
        assert_eq!(fake.answers().len(), 2);
    }

    #[tokio::test]
    async fn disconnect_is_scoped_to_owner() {
        let (fake, reg, linker) = setup();
        link(&reg, UserId(8), CHANNEL, "Theirs").await;

        let yes = ChannelAction::Confirm {
            channel_id: CHANNEL,
            page: 1,
        };
        linker.handle_callback(&callback(yes), yes).await.unwrap();
        assert!(fake.contains_text("❌ Failed to disconnect channel.\n\nNo more channels connected."));
        assert!(reg.find_by_channel(CHANNEL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn channels_lists_titles_and_usernames() {
        let (fake, reg, linker) = setup();
        linker.list_channels(USER, ChatId::from(USER)).await.unwrap();
        assert!(fake.contains_text(NO_CHANNELS_TEXT));

        reg.insert(ChannelLink {
            owner: USER,
            channel_id: CHANNEL,
            title: "News".into(),
            username: Some("news".into()),
            linked_at: Utc::now(),
        })
        .await
        .unwrap();
        link(&reg, USER, ChatId(-1002), "Private").await;

        fake.clear();
        linker.list_channels(USER, ChatId::from(USER)).await.unwrap();
        let text = &fake.texts()[0];
        assert!(text.contains("1. News\n    @news\n"));
        assert!(text.contains("2. Private\n"));
    }
}
