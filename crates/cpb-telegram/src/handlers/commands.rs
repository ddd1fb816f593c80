use std::sync::Arc;

use teloxide::prelude::*;

use cpb_core::{gate::MUST_JOIN_TEXT, messaging::types::IncomingMessage};

use crate::router::AppState;

use super::notify_failure;

const WELCOME_TEXT: &str = "👋 Hello! Welcome to the bot.\nUse /help to see available commands.";
const HELP_TEXT: &str = "Available Commands:\n\
/start - Start the bot\n\
/help - Show this help message\n\
/connect - Connect a channel to the bot\n\
/disconnect - Disconnect a channel\n\
/channels - List your connected channels\n\
/post - Create a new post";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(
    msg: &IncomingMessage,
    text: &str,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let (cmd, _arg) = parse_command(text);
    let user = msg.user_id;
    let chat_id = msg.chat_id;

    if !state.gate.is_member(user).await {
        tracing::info!(user_id = user.0, cmd = %cmd, "command blocked by membership gate");
        let sent = match state.gate.join_keyboard() {
            Some(kb) => state.messenger.send_keyboard(chat_id, MUST_JOIN_TEXT, kb).await,
            None => state.messenger.send_text(chat_id, MUST_JOIN_TEXT).await,
        };
        if let Err(e) = sent {
            tracing::warn!(user_id = user.0, error = %e, "must-join notice not delivered");
        }
        return Ok(());
    }

    tracing::debug!(user_id = user.0, cmd = %cmd, "command");
    let result = match cmd.as_str() {
        "start" => {
            state.linker.cancel_pending(user);
            state
                .messenger
                .send_text(chat_id, WELCOME_TEXT)
                .await
                .map(|_| ())
        }
        "help" => {
            state.linker.cancel_pending(user);
            state
                .messenger
                .send_text(chat_id, HELP_TEXT)
                .await
                .map(|_| ())
        }
        "connect" => state.linker.begin_connect(user, chat_id).await,
        "disconnect" => state.linker.show_disconnect(user, chat_id).await,
        "channels" => state.linker.list_channels(user, chat_id).await,
        "post" => {
            state.linker.cancel_pending(user);
            state.composer.start(user, chat_id).await
        }
        _ => state
            .messenger
            .send_text(chat_id, "Unknown command. Use /help to see available commands.")
            .await
            .map(|_| ()),
    };

    if let Err(e) = result {
        tracing::error!(user_id = user.0, cmd = %cmd, error = %e, "command failed");
        notify_failure(&state, chat_id).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cpb_core::{
        config::Config,
        domain::{ChatId, UserId},
        messaging::types::{ButtonAction, MemberStatus},
        registry::ChannelStore,
        testing::FakeMessenger,
    };

    fn gated_state(fake: Arc<FakeMessenger>) -> Arc<AppState> {
        let mut cfg = Config::with_token("t");
        cfg.required_channel = Some("@FxLuv".into());
        cfg.join_channel_url = Some("https://t.me/FxLuv".into());
        Arc::new(AppState::new(
            Arc::new(cfg),
            fake,
            Arc::new(ChannelStore::in_memory()),
        ))
    }

    fn command(user: UserId, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId(user.0),
            user_id: user,
            username: None,
            content: None,
            text: Some(text.to_string()),
            forwarded_from: None,
            date: Utc::now(),
        }
    }

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Post@channel_post_bot now"),
            ("post".to_string(), "now".to_string())
        );
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
        assert_eq!(
            parse_command("  /connect   @news  "),
            ("connect".to_string(), "@news".to_string())
        );
    }

    #[test]
    fn help_lists_every_command() {
        for cmd in ["/start", "/help", "/connect", "/disconnect", "/channels", "/post"] {
            assert!(HELP_TEXT.contains(cmd), "{cmd}");
        }
    }

    #[tokio::test]
    async fn non_members_only_get_the_join_notice() {
        let fake = Arc::new(FakeMessenger::default());
        fake.set_member_status(UserId(7), Ok(MemberStatus::Left));
        let state = gated_state(fake.clone());

        handle_command(&command(UserId(7), "/post"), "/post", state.clone())
            .await
            .unwrap();

        assert_eq!(fake.texts(), vec![MUST_JOIN_TEXT.to_string()]);
        let kb = fake.last_keyboard().unwrap();
        assert_eq!(kb.rows[0][0].label, "Join Channel");
        assert_eq!(
            kb.rows[0][0].action,
            ButtonAction::Url("https://t.me/FxLuv".into())
        );
        assert!(!state.composer.has_draft(UserId(7)));
    }

    #[tokio::test]
    async fn members_reach_the_command() {
        let fake = Arc::new(FakeMessenger::default());
        fake.set_member_status(UserId(8), Ok(MemberStatus::Member));
        let state = gated_state(fake.clone());

        handle_command(&command(UserId(8), "/help"), "/help", state)
            .await
            .unwrap();

        assert_eq!(fake.texts(), vec![HELP_TEXT.to_string()]);
    }
}
