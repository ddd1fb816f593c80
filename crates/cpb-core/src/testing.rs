//! Recording fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    content::{PostContent, UrlButton},
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::{Error, TransportError},
    messaging::{
        port::MessagingPort,
        types::{ChatInfo, ChatLookup, InlineKeyboard, MemberStatus},
    },
    Result,
};

pub const BOT_ID: UserId = UserId(4242);

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Keyboard {
        chat_id: ChatId,
        text: String,
        keyboard: InlineKeyboard,
    },
    Post {
        chat_id: ChatId,
        content: PostContent,
        buttons: Vec<UrlButton>,
    },
    Edit {
        msg: MessageRef,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Delete(MessageRef),
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    log: Mutex<Vec<Sent>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    failing_deletes: Mutex<bool>,
    failing_answers: Mutex<bool>,
    chats: Mutex<HashMap<String, std::result::Result<ChatInfo, TransportError>>>,
    members: Mutex<HashMap<UserId, std::result::Result<MemberStatus, TransportError>>>,
    bot_status: Mutex<HashMap<ChatId, std::result::Result<MemberStatus, TransportError>>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    fn record(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }

    fn check_chat(&self, chat_id: ChatId) -> Result<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(Error::Transport(TransportError::MissingRights(
                "send messages".to_string(),
            )));
        }
        Ok(())
    }

    /// Every send/edit towards `chat_id` fails from now on.
    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_deletes(&self) {
        *self.failing_deletes.lock().unwrap() = true;
    }

    /// Callback answers are still recorded, then reported as failed.
    pub fn fail_answers(&self) {
        *self.failing_answers.lock().unwrap() = true;
    }

    pub fn add_chat(&self, key: &str, result: std::result::Result<ChatInfo, TransportError>) {
        self.chats.lock().unwrap().insert(key.to_string(), result);
    }

    pub fn set_member_status(
        &self,
        user: UserId,
        result: std::result::Result<MemberStatus, TransportError>,
    ) {
        self.members.lock().unwrap().insert(user, result);
    }

    pub fn set_bot_status(
        &self,
        chat_id: ChatId,
        result: std::result::Result<MemberStatus, TransportError>,
    ) {
        self.bot_status.lock().unwrap().insert(chat_id, result);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Texts of plain messages, keyboard messages and edits, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } | Sent::Keyboard { text, .. } | Sent::Edit { text, .. } => {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn posts(&self) -> Vec<(ChatId, PostContent, Vec<UrlButton>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Post {
                    chat_id,
                    content,
                    buttons,
                } => Some((chat_id, content, buttons)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Delete(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<Option<String>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Answer { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_keyboard(&self) -> Option<InlineKeyboard> {
        self.sent().into_iter().rev().find_map(|s| match s {
            Sent::Keyboard { keyboard, .. } => Some(keyboard),
            Sent::Edit {
                keyboard: Some(keyboard),
                ..
            } => Some(keyboard),
            _ => None,
        })
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
            || self.answers().iter().flatten().any(|t| t.contains(needle))
    }
}

fn lookup_key(lookup: &ChatLookup) -> String {
    match lookup {
        ChatLookup::Username(name) => name.clone(),
        ChatLookup::Id(id) => id.0.to_string(),
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.check_chat(chat_id)?;
        self.record(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.alloc(chat_id))
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.check_chat(chat_id)?;
        self.record(Sent::Keyboard {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(self.alloc(chat_id))
    }

    async fn send_post(
        &self,
        chat_id: ChatId,
        content: &PostContent,
        buttons: &[UrlButton],
    ) -> Result<MessageRef> {
        self.check_chat(chat_id)?;
        self.record(Sent::Post {
            chat_id,
            content: content.clone(),
            buttons: buttons.to_vec(),
        });
        Ok(self.alloc(chat_id))
    }

    async fn edit_text(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.check_chat(msg.chat_id)?;
        self.record(Sent::Edit {
            msg,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        if *self.failing_deletes.lock().unwrap() {
            return Err(Error::Transport(TransportError::MissingRights(
                "delete messages".to_string(),
            )));
        }
        self.record(Sent::Delete(msg));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.record(Sent::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        if *self.failing_answers.lock().unwrap() {
            return Err(Error::Transport(TransportError::Other(
                "query is too old".to_string(),
            )));
        }
        Ok(())
    }

    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<ChatInfo> {
        match self.chats.lock().unwrap().get(&lookup_key(lookup)) {
            Some(Ok(info)) => Ok(info.clone()),
            Some(Err(e)) => Err(Error::Transport(e.clone())),
            None => Err(Error::Transport(TransportError::ChatNotFound)),
        }
    }

    async fn member_status(&self, chat: &ChatLookup, user: UserId) -> Result<MemberStatus> {
        let found = if user == BOT_ID {
            let ChatLookup::Id(chat_id) = chat else {
                return Err(Error::Transport(TransportError::ChatNotFound));
            };
            self.bot_status
                .lock()
                .unwrap()
                .get(chat_id)
                .cloned()
                .unwrap_or(Ok(MemberStatus::Administrator))
        } else {
            self.members
                .lock()
                .unwrap()
                .get(&user)
                .cloned()
                .unwrap_or(Ok(MemberStatus::Member))
        };
        found.map_err(Error::Transport)
    }

    async fn bot_user_id(&self) -> Result<UserId> {
        Ok(BOT_ID)
    }
}
