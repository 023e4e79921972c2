//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it extracts ids/text/files from the
//! update, calls into the core services, and renders the outcome back to the
//! chat. All listing logic lives in `adbot-core`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod commands;
mod photo;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Group chats get only the link guard; the submission dialogue is private.
    if !msg.chat.is_private() {
        return text::guard_group_message(bot, msg, state).await;
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(bot, msg, state).await;
    }

    if msg.photo().is_some() {
        return photo::handle_photo(bot, msg, state).await;
    }

    Ok(())
}
