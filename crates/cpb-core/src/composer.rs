//! Composition engine: drives a user's draft from `/post` to fan-out.
//!
//! Messages and callbacks for one user arrive here already gated and decoded.
//! Each handler loads the draft, applies one event, renders whatever the user
//! should see next and writes the draft back (last write wins).

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};

use crate::{
    callbacks::PostAction,
    config::Config,
    content::BUTTON_FORMAT_HINT,
    domain::{ChatId, MessageRef, UserId},
    dispatch::{DispatchReport, FanOutDispatcher},
    draft::{minutes_until, DraftEvent, DraftState, PostDraft, SCHEDULE_EXAMPLE, SCHEDULE_LAYOUT},
    errors::Error,
    expiry,
    menus,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, IncomingMessage, InlineKeyboard},
    },
    registry::ChannelRegistry,
    store::DraftStore,
    Result,
};

pub const NO_CHANNELS_TEXT: &str =
    "❌ You don't have any connected channels.\nUse /connect to add a channel first.";
pub const CONTENT_PROMPT: &str = "📝 Send me the content for your post.\n\n\
Supported: text, photo, video, document, audio, voice, sticker or animation.";
pub const ACTION_MENU_TEXT: &str = "👇 Choose an action:";
pub const SESSION_EXPIRED_TEXT: &str = "Post creation session expired. Start again with /post";
pub const CANCELLED_TEXT: &str = "Post creation cancelled.";
pub const CONFIRM_SEND_TEXT: &str = "Are you sure you want to send this post?";
pub const DESTINATION_TEXT: &str = "Select a channel to post to:";
pub const SENT_ONE_TEXT: &str = "✅ Post sent successfully!";
pub const SEND_FAILED_TEXT: &str = "❌ Error sending post. Please try again.";
pub const PREVIEW_FAILED_TEXT: &str = "❌ Error creating preview. Please try again.";
const BUTTON_PROMPT: &str =
    "🔗 Send me the button in format:\nButton Name - URL\n\nExample: Download - https://example.com";
const TIMER_TEXT: &str =
    "⏲️ Self-destruct timer\nThe post will be deleted from the channels once the time is up.";
const UNAVAILABLE_TEXT: &str = "⚠️ That action isn't available right now.";
const GENERIC_FAILURE_TEXT: &str = "❌ Error processing your request. Please try again.";
pub const TIMER_EXPIRED_TEXT: &str =
    "The self-destruct time has already passed. Adjust the timer before sending.";

pub struct Composer {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    registry: Arc<dyn ChannelRegistry>,
    drafts: Arc<dyn DraftStore>,
    dispatcher: FanOutDispatcher,
}

impl Composer {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        registry: Arc<dyn ChannelRegistry>,
        drafts: Arc<dyn DraftStore>,
    ) -> Self {
        let dispatcher = FanOutDispatcher::new(messenger.clone());
        Self {
            cfg,
            messenger,
            registry,
            drafts,
            dispatcher,
        }
    }

    pub fn has_draft(&self, user: UserId) -> bool {
        self.drafts.get(user).is_some()
    }

    /// `/post`: open a fresh draft, replacing any previous one.
    pub async fn start(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        let links = self.registry.find_by_user(user).await?;
        if links.is_empty() {
            self.messenger.send_text(chat_id, NO_CHANNELS_TEXT).await?;
            return Ok(());
        }

        if let Some(old) = self.drafts.get(user) {
            tracing::debug!(user_id = user.0, state = old.state().name(), "discarding previous draft");
        }
        self.drafts.set(user, PostDraft::new(user));
        tracing::info!(user_id = user.0, channels = links.len(), "draft started");

        self.messenger.send_text(chat_id, CONTENT_PROMPT).await?;
        Ok(())
    }

    /// Feed a non-command message into the user's draft.
    ///
    /// Returns `false` when the draft does not want this message (no draft, or
    /// nothing awaited that this message provides).
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<bool> {
        let Some(mut draft) = self.drafts.get(msg.user_id) else {
            return Ok(false);
        };

        match draft.state() {
            DraftState::AwaitingContent => {
                let Some(content) = msg.content.clone() else {
                    return Ok(false);
                };
                tracing::info!(user_id = msg.user_id.0, kind = content.kind().label(), "content captured");
                draft.capture_content(content)?;
                self.refresh_preview(&mut draft).await;
                self.drafts.set(msg.user_id, draft);
                Ok(true)
            }
            DraftState::AwaitingButtonText => {
                let Some(text) = msg.text.as_deref() else {
                    return Ok(false);
                };
                match draft.add_button(text).map(|b| b.label.clone()) {
                    Ok(label) => {
                        let reply = format!("✅ Button '{label}' added!");
                        self.messenger.send_text(msg.chat_id, &reply).await?;
                        self.refresh_preview(&mut draft).await;
                        self.drafts.set(msg.user_id, draft);
                    }
                    Err(Error::Validation(reason)) => {
                        let reply = format!(
                            "❌ Error: {reason}\nPlease try again with the correct format:\n{BUTTON_FORMAT_HINT}"
                        );
                        self.messenger.send_text(msg.chat_id, &reply).await?;
                    }
                    Err(e) => return Err(e),
                }
                Ok(true)
            }
            DraftState::AwaitingScheduleInput => {
                let Some(text) = msg.text.as_deref() else {
                    return Ok(false);
                };
                match draft.set_schedule(text, Utc::now()) {
                    Ok(at) => {
                        self.messenger
                            .send_text(msg.chat_id, &scheduled_text(at))
                            .await?;
                        self.refresh_preview(&mut draft).await;
                        self.drafts.set(msg.user_id, draft);
                    }
                    Err(Error::Validation(reason)) => {
                        let reply = format!(
                            "❌ {reason}\nSend the date and time as YYYY-MM-DD HH:MM\n\nExample: {SCHEDULE_EXAMPLE}"
                        );
                        self.messenger.send_text(msg.chat_id, &reply).await?;
                    }
                    Err(e) => return Err(e),
                }
                Ok(true)
            }
            DraftState::HasContent | DraftState::AwaitingDestination => Ok(false),
        }
    }

    /// Handle one decoded post callback and answer it exactly once.
    ///
    /// Rejected transitions and validation failures become toasts; transport and
    /// storage failures are logged and reported with a short notice.
    pub async fn handle_callback(&self, cb: &CallbackQuery, action: PostAction) -> Result<()> {
        let toast = match self.on_callback(cb, action).await {
            Ok(toast) => toast,
            Err(Error::InvalidTransition { from, event }) => {
                tracing::debug!(user_id = cb.user_id.0, from, event, "callback rejected");
                Some(UNAVAILABLE_TEXT.to_string())
            }
            Err(Error::Validation(reason)) => Some(format!("❌ {reason}")),
            Err(e) => {
                tracing::error!(user_id = cb.user_id.0, data = %cb.data, error = %e, "post callback failed");
                Some(GENERIC_FAILURE_TEXT.to_string())
            }
        };
        self.messenger
            .answer_callback(&cb.callback_id, toast.as_deref())
            .await
    }

    async fn on_callback(&self, cb: &CallbackQuery, action: PostAction) -> Result<Option<String>> {
        let user = cb.user_id;

        let Some(mut draft) = self.drafts.get(user).filter(|_| action.needs_draft()) else {
            if let PostAction::Page(page) = action {
                let links = self.registry.find_by_user(user).await?;
                let keyboard = menus::destination_menu(&links, page, self.cfg.channel_page_size);
                self.show(cb, DESTINATION_TEXT, Some(keyboard)).await?;
                return Ok(None);
            }
            return Ok(Some(SESSION_EXPIRED_TEXT.to_string()));
        };

        match action {
            PostAction::AddButton => {
                draft.apply(DraftEvent::RequestButton)?;
                self.drafts.set(user, draft);
                self.show(cb, BUTTON_PROMPT, Some(menus::back_to_preview()))
                    .await?;
                Ok(None)
            }
            PostAction::Timer => {
                let now = Utc::now();
                let at = draft.activate_timer(now, self.default_timer())?;
                self.drafts.set(user, draft);
                self.show(cb, TIMER_TEXT, Some(menus::timer_menu(minutes_until(Some(at), now))))
                    .await?;
                Ok(None)
            }
            PostAction::TimerStep(step) => {
                let now = Utc::now();
                let moved = draft.step_timer(step, now, self.default_timer())?;
                let minutes = minutes_until(draft.self_destruct_at, now);
                self.drafts.set(user, draft);
                // Telegram rejects edits that change nothing.
                if moved {
                    self.show(cb, TIMER_TEXT, Some(menus::timer_menu(minutes)))
                        .await?;
                }
                Ok(Some(format!("Self-destruct set to: {minutes} minutes")))
            }
            PostAction::TimerInfo => {
                let minutes = minutes_until(draft.self_destruct_at, Utc::now());
                Ok(Some(format!("Self-destruct set to: {minutes} minutes")))
            }
            PostAction::TimerNone => {
                draft.clear_timer()?;
                self.refresh_preview(&mut draft).await;
                self.drafts.set(user, draft);
                Ok(Some("Self-destruct timer removed".to_string()))
            }
            PostAction::Schedule => {
                draft.apply(DraftEvent::RequestSchedule)?;
                self.drafts.set(user, draft);
                let prompt = format!(
                    "📅 Send the date and time for the post in format:\nYYYY-MM-DD HH:MM\n\nExample: {SCHEDULE_EXAMPLE}"
                );
                self.show(cb, &prompt, Some(menus::back_to_preview()))
                    .await?;
                Ok(None)
            }
            PostAction::Preview => {
                draft.apply(DraftEvent::ShowPreview)?;
                self.refresh_preview(&mut draft).await;
                self.drafts.set(user, draft);
                Ok(None)
            }
            PostAction::Send => {
                // Only validates: the state changes on "Yes".
                draft.state().next(DraftEvent::ConfirmSend)?;
                self.show(cb, CONFIRM_SEND_TEXT, Some(menus::confirm_send_menu()))
                    .await?;
                Ok(None)
            }
            PostAction::ConfirmSend => {
                draft.apply(DraftEvent::ConfirmSend)?;
                self.drafts.set(user, draft);
                let links = self.registry.find_by_user(user).await?;
                let keyboard = menus::destination_menu(&links, 1, self.cfg.channel_page_size);
                self.show(cb, DESTINATION_TEXT, Some(keyboard)).await?;
                Ok(None)
            }
            PostAction::SendAll => {
                draft.state().next(DraftEvent::Dispatch)?;
                let links = self.registry.find_by_user(user).await?;
                let destinations: Vec<ChatId> = links.iter().map(|l| l.channel_id).collect();
                let report = self.dispatch(&draft, &destinations).await?;

                self.drafts.delete(user);
                tracing::info!(
                    user_id = user.0,
                    sent = report.success_count(),
                    failed = report.failure_count(),
                    "post sent to all channels"
                );
                let text = format!(
                    "✅ Post sent to {} channels successfully!",
                    report.success_count()
                );
                self.show(cb, &text, None).await?;
                Ok(None)
            }
            PostAction::SendTo(channel_id) => {
                draft.state().next(DraftEvent::Dispatch)?;
                match self.registry.find_by_channel(channel_id).await? {
                    Some(link) if link.owner == user => {}
                    _ => {
                        return Err(Error::Validation(
                            "This channel is not linked to your account.".to_string(),
                        ))
                    }
                }

                let report = self.dispatch(&draft, &[channel_id]).await?;
                if report.success_count() == 0 {
                    self.drafts.set(user, draft);
                    let links = self.registry.find_by_user(user).await?;
                    let keyboard = menus::destination_menu(&links, 1, self.cfg.channel_page_size);
                    self.show(cb, SEND_FAILED_TEXT, Some(keyboard)).await?;
                    return Ok(None);
                }

                self.drafts.delete(user);
                tracing::info!(user_id = user.0, channel_id = channel_id.0, "post sent");
                self.show(cb, SENT_ONE_TEXT, None).await?;
                Ok(None)
            }
            PostAction::Cancel => {
                self.drafts.delete(user);
                tracing::info!(user_id = user.0, "draft cancelled");
                self.show(cb, CANCELLED_TEXT, None).await?;
                Ok(None)
            }
            PostAction::Page(_) => Ok(None),
        }
    }

    async fn dispatch(&self, draft: &PostDraft, destinations: &[ChatId]) -> Result<DispatchReport> {
        let content = draft.content.as_ref().ok_or(Error::InvalidTransition {
            from: draft.state().name(),
            event: DraftEvent::Dispatch.name(),
        })?;
        if draft.self_destruct_at.is_some_and(|at| at <= Utc::now()) {
            return Err(Error::Validation(TIMER_EXPIRED_TEXT.to_string()));
        }
        let report = self
            .dispatcher
            .dispatch(content, &draft.buttons, destinations)
            .await;

        if let Some(at) = draft.self_destruct_at {
            let sent: Vec<MessageRef> = report.sent().collect();
            if !sent.is_empty() {
                expiry::schedule_deletion(self.messenger.clone(), sent, at);
            }
        }
        Ok(report)
    }

    /// Render the preview, replying with a short notice instead of failing the event.
    async fn refresh_preview(&self, draft: &mut PostDraft) {
        if let Err(e) = self.render_preview(draft).await {
            tracing::warn!(user_id = draft.owner.0, error = %e, "preview failed");
            let chat_id = ChatId::from(draft.owner);
            if let Err(e) = self.messenger.send_text(chat_id, PREVIEW_FAILED_TEXT).await {
                tracing::warn!(user_id = draft.owner.0, error = %e, "preview failure notice not delivered");
            }
        }
    }

    async fn render_preview(&self, draft: &mut PostDraft) -> Result<()> {
        let chat_id = ChatId::from(draft.owner);

        if let Some(old) = draft.preview.take() {
            if let Err(e) = self.messenger.delete_message(old).await {
                tracing::debug!(user_id = draft.owner.0, error = %e, "old preview not deleted");
            }
        }

        let content = draft.content.as_ref().ok_or(Error::InvalidTransition {
            from: draft.state().name(),
            event: DraftEvent::ShowPreview.name(),
        })?;
        let preview = self
            .messenger
            .send_post(chat_id, content, &draft.buttons)
            .await?;
        draft.preview = Some(preview);

        if draft.state() != DraftState::AwaitingButtonText {
            self.messenger
                .send_keyboard(chat_id, ACTION_MENU_TEXT, menus::action_menu())
                .await?;
        }
        Ok(())
    }

    /// Replace the callback's message, or send a new one when it is gone.
    async fn show(&self, cb: &CallbackQuery, text: &str, keyboard: Option<InlineKeyboard>) -> Result<()> {
        match (cb.message, keyboard) {
            (Some(msg), keyboard) => self.messenger.edit_text(msg, text, keyboard).await,
            (None, Some(keyboard)) => self
                .messenger
                .send_keyboard(cb.chat_id, text, keyboard)
                .await
                .map(|_| ()),
            (None, None) => self.messenger.send_text(cb.chat_id, text).await.map(|_| ()),
        }
    }

    fn default_timer(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cfg.default_self_destruct)
            .unwrap_or_else(|_| chrono::Duration::minutes(60))
    }
}

fn scheduled_text(at: DateTime<Utc>) -> String {
    format!(
        "📅 Post scheduled for {}.\nScheduled posts are not sent automatically; send it from the menu when the time comes.",
        at.with_timezone(&Local).format(SCHEDULE_LAYOUT)
    )
}
