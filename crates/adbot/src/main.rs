use std::sync::Arc;

use adbot_core::{
    config::Config,
    store::{MemoryStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adbot_core::logging::init("adbot");

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        publish_destinations = cfg.publish_chat_ids.len(),
        backup_destinations = cfg.backup_chat_ids.len(),
        "configuration loaded"
    );

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(cfg.bad_words.clone()));

    adbot_telegram::router::run_polling(cfg, store).await
}
