//! Callback payloads carried by inline keyboard buttons.
//!
//! Every button the bot sends encodes one of these; the router decodes the payload
//! and hands the typed action to the composer or the channel manager.

use crate::{domain::ChatId, draft::TimerStep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostAction {
    AddButton,
    Timer,
    Schedule,
    Send,
    ConfirmSend,
    Preview,
    Cancel,
    TimerStep(TimerStep),
    TimerNone,
    TimerInfo,
    Page(usize),
    SendAll,
    SendTo(ChatId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAction {
    /// Ask for confirmation before unlinking.
    Ask { channel_id: ChatId, page: usize },
    Confirm { channel_id: ChatId, page: usize },
    Abort { page: usize },
    Page(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackData {
    Post(PostAction),
    Channel(ChannelAction),
}

impl PostAction {
    /// Page navigation works without a live draft.
    pub fn needs_draft(self) -> bool {
        !matches!(self, PostAction::Page(_))
    }

    pub fn encode(self) -> String {
        CallbackData::Post(self).encode()
    }
}

impl ChannelAction {
    pub fn encode(self) -> String {
        CallbackData::Channel(self).encode()
    }
}

impl CallbackData {
    pub fn encode(self) -> String {
        match self {
            CallbackData::Post(a) => match a {
                PostAction::AddButton => "post:buttons".to_string(),
                PostAction::Timer => "post:timer".to_string(),
                PostAction::Schedule => "post:schedule".to_string(),
                PostAction::Send => "post:send".to_string(),
                PostAction::ConfirmSend => "post:confirm".to_string(),
                PostAction::Preview => "post:preview".to_string(),
                PostAction::Cancel => "post:cancel".to_string(),
                PostAction::TimerStep(TimerStep::Plus(m)) => format!("timer:+{m}"),
                PostAction::TimerStep(TimerStep::Minus(m)) => format!("timer:-{m}"),
                PostAction::TimerNone => "timer:none".to_string(),
                PostAction::TimerInfo => "timer:info".to_string(),
                PostAction::Page(p) => format!("page:{p}"),
                PostAction::SendAll => "send:all".to_string(),
                PostAction::SendTo(id) => format!("send:{}", id.0),
            },
            CallbackData::Channel(a) => match a {
                ChannelAction::Ask { channel_id, page } => format!("dc:ask:{}:{page}", channel_id.0),
                ChannelAction::Confirm { channel_id, page } => {
                    format!("dc:yes:{}:{page}", channel_id.0)
                }
                ChannelAction::Abort { page } => format!("dc:no:{page}"),
                ChannelAction::Page(p) => format!("dc:page:{p}"),
            },
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (scope, rest) = data.split_once(':')?;
        match scope {
            "post" => {
                let action = match rest {
                    "buttons" => PostAction::AddButton,
                    "timer" => PostAction::Timer,
                    "schedule" => PostAction::Schedule,
                    "send" => PostAction::Send,
                    "confirm" => PostAction::ConfirmSend,
                    "preview" => PostAction::Preview,
                    "cancel" => PostAction::Cancel,
                    _ => return None,
                };
                Some(CallbackData::Post(action))
            }
            "timer" => {
                let action = match rest {
                    "none" => PostAction::TimerNone,
                    "info" => PostAction::TimerInfo,
                    _ => {
                        let minutes = |s: &str| s.parse::<i64>().ok().filter(|m| *m > 0);
                        if let Some(m) = rest.strip_prefix('+') {
                            PostAction::TimerStep(TimerStep::Plus(minutes(m)?))
                        } else if let Some(m) = rest.strip_prefix('-') {
                            PostAction::TimerStep(TimerStep::Minus(minutes(m)?))
                        } else {
                            return None;
                        }
                    }
                };
                Some(CallbackData::Post(action))
            }
            "page" => Some(CallbackData::Post(PostAction::Page(parse_page(rest)?))),
            "send" => {
                let action = match rest {
                    "all" => PostAction::SendAll,
                    id => PostAction::SendTo(ChatId(id.parse().ok()?)),
                };
                Some(CallbackData::Post(action))
            }
            "dc" => {
                let mut parts = rest.split(':');
                let action = match (parts.next()?, parts.next(), parts.next()) {
                    ("ask", Some(id), Some(page)) => ChannelAction::Ask {
                        channel_id: ChatId(id.parse().ok()?),
                        page: page.parse().ok()?,
                    },
                    ("yes", Some(id), Some(page)) => ChannelAction::Confirm {
                        channel_id: ChatId(id.parse().ok()?),
                        page: page.parse().ok()?,
                    },
                    ("no", Some(page), None) => ChannelAction::Abort {
                        page: page.parse().ok()?,
                    },
                    ("page", Some(page), None) => ChannelAction::Page(page.parse().ok()?),
                    _ => return None,
                };
                if parts.next().is_some() {
                    return None;
                }
                Some(CallbackData::Channel(action))
            }
            _ => None,
        }
    }
}

/// Pages are 1-based.
fn parse_page(s: &str) -> Option<usize> {
    s.parse::<usize>().ok().filter(|p| *p >= 1)
}
