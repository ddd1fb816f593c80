use std::sync::Arc;

use anyhow::Context;

use cpb_core::{config::Config, registry::ChannelStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cpb_core::logging::init("cpb")?;

    let cfg = Arc::new(Config::load()?);

    let registry = ChannelStore::open(cfg.channels_file.clone()).with_context(|| {
        format!(
            "failed to open channel registry at {}",
            cfg.channels_file.display()
        )
    })?;
    tracing::info!(
        page_size = cfg.channel_page_size,
        self_destruct_mins = cfg.default_self_destruct.as_secs() / 60,
        "configuration loaded"
    );

    cpb_telegram::router::run_polling(cfg, Arc::new(registry))
        .await
        .context("telegram bot failed")?;

    Ok(())
}
