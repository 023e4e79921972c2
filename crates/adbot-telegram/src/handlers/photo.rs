use std::sync::Arc;

use teloxide::prelude::*;
use tracing::error;

use adbot_core::{
    domain::{FileRef, UserId},
    flow::StepOutcome,
};

use crate::router::AppState;

pub async fn handle_photo(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(photos) = msg.photo() else {
        return Ok(());
    };
    // Telegram sends several sizes; the last one is the largest.
    let Some(best) = photos.last() else {
        return Ok(());
    };

    let user = UserId(from.id.0 as i64);
    let file = FileRef(best.file.id.clone());

    match state.flow.handle_photo(user, file).await {
        Ok(StepOutcome::Stay { text }) | Ok(StepOutcome::Advanced { text, .. }) => {
            bot.send_message(msg.chat.id, text).await?;
        }
        Ok(StepOutcome::Ignored) => {}
        Ok(StepOutcome::Submitted { .. }) => {}
        Err(e) => {
            error!(user = user.0, error = %e, "photo step failed");
            bot.send_message(
                msg.chat.id,
                "Something went wrong, please contact an operator.",
            )
            .await?;
        }
    }

    Ok(())
}
