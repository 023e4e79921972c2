use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use adbot_core::{
    autopost::Autoposter,
    config::Config,
    filter::ContentFilter,
    flow::SubmissionFlow,
    messaging::{FileFetcher, MessagingPort},
    moderation::ModerationService,
    store::Store,
    throttle::RateLimiter,
};

use crate::{handlers, TelegramMessenger};

/// Explicit context object shared by every handler: no global bot, no global
/// storage handle. Lives from process start to shutdown.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub flow: SubmissionFlow,
    pub moderation: ModerationService,
    pub filter: ContentFilter,
}

/// Wire everything up and run long polling until the process exits.
pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(username = me.username(), "bot started");
    }

    let telegram = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = telegram.clone();
    let fetcher: Arc<dyn FileFetcher> = telegram;

    let limiter = Arc::new(Mutex::new(RateLimiter::new(
        cfg.rate_limit_enabled,
        cfg.rate_limit_requests,
        cfg.rate_limit_window,
    )));

    let flow = SubmissionFlow::new(
        cfg.clone(),
        store.clone(),
        messenger.clone(),
        fetcher,
        limiter,
    );
    let moderation = ModerationService::new(cfg.clone(), store.clone(), messenger.clone());

    // Background autoposter; cancelled when the dispatcher returns.
    let poster = Autoposter::new(cfg.clone(), store.clone(), messenger);
    let cancel = CancellationToken::new();
    let poster_cancel = cancel.clone();
    let poster_handle = tokio::spawn(async move { poster.run(poster_cancel).await });

    let state = Arc::new(AppState {
        cfg,
        store,
        flow,
        moderation,
        filter: ContentFilter::new(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Err(e) = poster_handle.await {
        error!(error = %e, "autoposter task panicked");
    }

    Ok(())
}
