use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, error};

use adbot_core::{domain::UserId, flow::StepOutcome};

use crate::router::AppState;

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user = UserId(from.id.0 as i64);

    match state.flow.handle_text(user, text).await {
        Ok(StepOutcome::Advanced { text, .. }) | Ok(StepOutcome::Stay { text }) => {
            bot.send_message(msg.chat.id, text).await?;
        }
        Ok(StepOutcome::Submitted {
            moderation_notified,
            ..
        }) => {
            bot.send_message(msg.chat.id, "Your listing was sent for moderation. Thank you!")
                .await?;
            if !moderation_notified {
                bot.send_message(
                    msg.chat.id,
                    "The listing was saved, but we could not reach the moderators. Please contact an operator.",
                )
                .await?;
            }
        }
        // No active draft, or the draft expects button input; stay quiet.
        Ok(StepOutcome::Ignored) => {}
        Err(e) => {
            error!(user = user.0, error = %e, "text step failed");
            bot.send_message(
                msg.chat.id,
                "Something went wrong, please contact an operator.",
            )
            .await?;
        }
    }

    Ok(())
}

/// Group chats: delete link-bearing messages in guarded chats, nothing else.
pub async fn guard_group_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !state.cfg.group_guard_chat_ids.contains(&msg.chat.id.0) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if state.filter.has_link(text) {
        debug!(chat = msg.chat.id.0, "deleting link message in guarded group");
        let _ = bot.delete_message(msg.chat.id, msg.id).await;
    }
    Ok(())
}
