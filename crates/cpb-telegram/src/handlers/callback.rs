use std::sync::Arc;

use teloxide::prelude::*;

use cpb_core::{callbacks::CallbackData, messaging::types};

use crate::router::AppState;

use super::to_callback;

const CALLBACK_ERROR_TEXT: &str = "An error occurred. Please try again.";

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    route_callback(&to_callback(&q), &state).await;
    Ok(())
}

async fn route_callback(cb: &types::CallbackQuery, state: &AppState) {
    let result = match CallbackData::parse(&cb.data) {
        Some(CallbackData::Post(action)) => state.composer.handle_callback(cb, action).await,
        Some(CallbackData::Channel(action)) => state.linker.handle_callback(cb, action).await,
        None => {
            tracing::debug!(user_id = cb.user_id.0, data = %cb.data, "unknown callback data");
            // Always answer so the client stops spinning.
            state.messenger.answer_callback(&cb.callback_id, None).await
        }
    };

    if let Err(e) = result {
        tracing::error!(user_id = cb.user_id.0, data = %cb.data, error = %e, "callback failed");
        if let Err(e) = state
            .messenger
            .answer_callback(&cb.callback_id, Some(CALLBACK_ERROR_TEXT))
            .await
        {
            tracing::warn!(user_id = cb.user_id.0, error = %e, "callback error answer not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpb_core::{
        config::Config,
        domain::{ChatId, UserId},
        registry::ChannelStore,
        testing::FakeMessenger,
    };

    fn state(fake: Arc<FakeMessenger>) -> AppState {
        AppState::new(
            Arc::new(Config::with_token("t")),
            fake,
            Arc::new(ChannelStore::in_memory()),
        )
    }

    fn query(data: &str) -> types::CallbackQuery {
        types::CallbackQuery {
            chat_id: ChatId(7),
            user_id: UserId(7),
            username: None,
            callback_id: "cb1".into(),
            data: data.into(),
            message: None,
        }
    }

    #[tokio::test]
    async fn unknown_data_is_answered_once() {
        let fake = Arc::new(FakeMessenger::default());
        route_callback(&query("nonsense"), &state(fake.clone())).await;
        assert_eq!(fake.answers(), vec![None]);
    }

    #[tokio::test]
    async fn failed_answer_is_followed_by_error_answer() {
        let fake = Arc::new(FakeMessenger::default());
        fake.fail_answers();
        route_callback(&query("nonsense"), &state(fake.clone())).await;
        assert_eq!(
            fake.answers(),
            vec![None, Some(CALLBACK_ERROR_TEXT.to_string())]
        );
    }
}
