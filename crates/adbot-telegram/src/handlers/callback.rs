use std::sync::Arc;

use teloxide::prelude::*;
use tracing::error;

use adbot_core::{
    domain::{DecisionOutcome, UserId},
    flow::{PromptKind, StepOutcome},
    moderation::parse_decision_callback,
};

use crate::keyboards;
use crate::router::AppState;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user = UserId(q.from.id.0 as i64);
    let chat = q.message.as_ref().map(|m| m.chat.id);
    let data = q.data.clone().unwrap_or_default();

    let Some(chat) = chat else {
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    };

    // rules:agree / rules:decline
    if let Some(answer) = data.strip_prefix("rules:") {
        match answer {
            "agree" => {
                if let Err(e) = state.flow.accept_rules(user).await {
                    error!(user = user.0, error = %e, "accepting rules failed");
                } else {
                    bot.send_message(chat, "Thank you! You can now create a listing: /add")
                        .await?;
                }
            }
            _ => {
                bot.send_message(chat, "Okay, maybe another time.").await?;
            }
        }
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    }

    // cat:<category> / dist:<district>
    if let Some(value) = data.strip_prefix("cat:") {
        let outcome = state.flow.choose_category(user, value).await;
        render_step(&bot, chat, &state, outcome).await?;
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    }
    if let Some(value) = data.strip_prefix("dist:") {
        let outcome = state.flow.choose_district(user, value).await;
        render_step(&bot, chat, &state, outcome).await?;
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    }

    // mod:<decision>:<listing id>
    if let Some((decision, listing)) = parse_decision_callback(&data) {
        if !state.cfg.is_moderator(user.0) {
            bot.answer_callback_query(cb_id).text("Not allowed").await?;
            return Ok(());
        }

        let note = match state.moderation.decide(listing, decision, user, None).await {
            Ok(DecisionOutcome::Approved) => "Approved",
            Ok(DecisionOutcome::Rejected) => "Rejected",
            Ok(DecisionOutcome::Banned) => "Author banned",
            Ok(DecisionOutcome::NotFound) => "Already decided or not found",
            Err(e) => {
                error!(listing = listing.0, error = %e, "moderation decision failed");
                "Something went wrong"
            }
        };
        bot.answer_callback_query(cb_id).text(note).await?;
        return Ok(());
    }

    bot.answer_callback_query(cb_id).await?;
    Ok(())
}

/// Send a flow step outcome back to the chat, attaching the right keyboard.
async fn render_step(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    state: &AppState,
    outcome: adbot_core::Result<StepOutcome>,
) -> ResponseResult<()> {
    match outcome {
        Ok(StepOutcome::Advanced { kind, text }) => {
            let req = bot.send_message(chat, text);
            match kind {
                PromptKind::Categories => {
                    req.reply_markup(keyboards::categories(&state.cfg.categories))
                        .await?;
                }
                PromptKind::Districts => {
                    req.reply_markup(keyboards::districts(&state.cfg.districts))
                        .await?;
                }
                PromptKind::Plain => {
                    req.await?;
                }
            }
        }
        Ok(StepOutcome::Stay { text }) => {
            bot.send_message(chat, text).await?;
        }
        Ok(StepOutcome::Ignored) | Ok(StepOutcome::Submitted { .. }) => {}
        Err(e) => {
            error!(error = %e, "flow step failed");
            bot.send_message(chat, "Something went wrong, please contact an operator.")
                .await?;
        }
    }
    Ok(())
}
