//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - converts the teloxide update into core types
//! - applies the membership gate to commands
//! - hands the event to the composer or the channel linker
//!
//! Failures are contained here: they are logged and the user gets a short
//! notice, the dispatcher never sees an error.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};

use cpb_core::{
    content::{Media, PostContent},
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{self, ChatInfo, IncomingMessage},
};

use crate::router::AppState;

mod callback;
mod commands;

pub(crate) const GENERIC_FAILURE_TEXT: &str =
    "❌ Something went wrong while processing your request. Please try again later.";

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let incoming = to_incoming(&msg, user);

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(&incoming, text, state).await;
        }
    }

    let result = async {
        if state.linker.handle_message(&incoming).await? {
            return Ok(());
        }
        if !state.composer.handle_message(&incoming).await? {
            tracing::debug!(user_id = incoming.user_id.0, "message not awaited; ignored");
        }
        Ok::<_, cpb_core::Error>(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(user_id = incoming.user_id.0, error = %e, "message handler failed");
        notify_failure(&state, incoming.chat_id).await;
    }
    Ok(())
}

pub(crate) async fn notify_failure(state: &AppState, chat_id: ChatId) {
    if let Err(e) = state
        .messenger
        .send_text(chat_id, GENERIC_FAILURE_TEXT)
        .await
    {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failure notice not delivered");
    }
}

fn user_id(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

fn to_incoming(msg: &Message, user: &User) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: user_id(user),
        username: user.username.clone(),
        content: post_content(msg),
        text: msg.text().map(str::to_string),
        forwarded_from: msg.forward_from_chat().map(|chat| ChatInfo {
            id: ChatId(chat.id.0),
            title: chat.title().map(str::to_string),
            username: chat.username().map(str::to_string),
        }),
        date: msg.date,
    }
}

fn to_callback(q: &CallbackQuery) -> types::CallbackQuery {
    let user_id = user_id(&q.from);
    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    types::CallbackQuery {
        chat_id: message.map(|m| m.chat_id).unwrap_or(ChatId::from(user_id)),
        user_id,
        username: q.from.username.clone(),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message,
    }
}

/// Recognise the content kinds a post can carry.
fn post_content(msg: &Message) -> Option<PostContent> {
    let caption = msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        return Some(PostContent::Text(text.to_string()));
    }
    if let Some(sizes) = msg.photo() {
        let largest = sizes.last()?;
        return Some(PostContent::Photo(Media::new(largest.file.id.clone(), caption)));
    }
    if let Some(v) = msg.video() {
        return Some(PostContent::Video(Media::new(v.file.id.clone(), caption)));
    }
    if let Some(a) = msg.animation() {
        return Some(PostContent::Animation(Media::new(a.file.id.clone(), caption)));
    }
    if let Some(d) = msg.document() {
        return Some(PostContent::Document(Media::new(d.file.id.clone(), caption)));
    }
    if let Some(a) = msg.audio() {
        return Some(PostContent::Audio(Media::new(a.file.id.clone(), caption)));
    }
    if let Some(v) = msg.voice() {
        return Some(PostContent::Voice(Media::new(v.file.id.clone(), caption)));
    }
    if let Some(s) = msg.sticker() {
        return Some(PostContent::Sticker(s.file.id.clone()));
    }
    None
}
