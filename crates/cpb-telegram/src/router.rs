use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use cpb_core::{
    composer::Composer,
    config::Config,
    gate::{self, AccessGate},
    linking::ChannelLinker,
    messaging::port::MessagingPort,
    registry::ChannelRegistry,
    store::InMemoryDraftStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub composer: Arc<Composer>,
    pub linker: Arc<ChannelLinker>,
    pub gate: Arc<dyn AccessGate>,
}

impl AppState {
    /// Wire the core services around one messenger and registry.
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        registry: Arc<dyn ChannelRegistry>,
    ) -> Self {
        let drafts = Arc::new(InMemoryDraftStore::new());
        let composer = Arc::new(Composer::new(
            cfg.clone(),
            messenger.clone(),
            registry.clone(),
            drafts,
        ));
        let linker = Arc::new(ChannelLinker::new(cfg.clone(), messenger.clone(), registry));
        let gate = gate::from_config(&cfg, messenger.clone());
        Self {
            cfg,
            messenger,
            composer,
            linker,
            gate,
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, registry: Arc<dyn ChannelRegistry>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Basic startup info.
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "channel post bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed; continuing"),
    }
    match &cfg.required_channel {
        Some(channel) => tracing::info!(%channel, "membership gate enabled"),
        None => tracing::info!("membership gate disabled"),
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState::new(cfg, messenger, registry));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
