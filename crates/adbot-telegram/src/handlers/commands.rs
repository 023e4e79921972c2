use std::sync::Arc;

use chrono::{Duration, Utc};
use teloxide::{prelude::*, types::ParseMode};
use tracing::error;

use adbot_core::{
    domain::UserId,
    flow::EntryOutcome,
    render::escape_html,
};

use crate::keyboards;
use crate::router::AppState;

const RULES_TEXT: &str = "<b>Listing rules</b>\n\n\
• Stay on topic for this board.\n\
• No links, mentions, or banned words.\n\
• Up to 20 photos; contact information is required.\n\n\
By pressing <i>I agree</i> you confirm you will follow the rules.";

const GENERIC_ERROR: &str = "Something went wrong, please contact an operator.";

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

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let user = UserId(from.id.0 as i64);
    let chat = msg.chat.id;
    let (cmd, _args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" => cmd_start(&bot, chat, user, &state).await,
        "add" => cmd_add(&bot, chat, user, &state).await,
        "cancel" => cmd_cancel(&bot, chat, user, &state).await,
        "rules" => {
            bot.send_message(chat, RULES_TEXT)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
        "faq" => cmd_faq(&bot, chat, &state).await,
        "myposts" => cmd_myposts(&bot, chat, user, &state).await,
        "queue" => cmd_queue(&bot, chat, user, &state).await,
        "stats" => cmd_stats(&bot, chat, user, &state).await,
        _ => Ok(()),
    }
}

async fn cmd_start(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    match state.flow.first_contact(user).await {
        Ok(EntryOutcome::ShowRules) => {
            bot.send_message(chat, RULES_TEXT)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::rules())
                .await?;
        }
        Ok(EntryOutcome::Ready) => {
            bot.send_message(chat, "Welcome back! Use /add to create a listing.")
                .await?;
        }
        Ok(EntryOutcome::Blacklisted) => {
            bot.send_message(chat, "You are blacklisted. Contact the administrators.")
                .await?;
        }
        Ok(EntryOutcome::RateLimited { .. }) => {} // silently drop floods
        Ok(_) => {}
        Err(e) => {
            error!(user = user.0, error = %e, "/start failed");
            bot.send_message(chat, GENERIC_ERROR).await?;
        }
    }
    Ok(())
}

async fn cmd_add(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    match state.flow.begin(user).await {
        Ok(EntryOutcome::Started { text }) => {
            bot.send_message(chat, text)
                .reply_markup(keyboards::categories(&state.cfg.categories))
                .await?;
        }
        Ok(EntryOutcome::RulesNotAccepted) => {
            bot.send_message(chat, "Please accept the rules first: /start")
                .await?;
        }
        Ok(EntryOutcome::Blacklisted) => {
            bot.send_message(chat, "You are blacklisted. Contact the administrators.")
                .await?;
        }
        Ok(EntryOutcome::RateLimited { retry_after }) => {
            bot.send_message(
                chat,
                format!(
                    "Too many requests. Try again in {} seconds.",
                    retry_after.as_secs().max(1)
                ),
            )
            .await?;
        }
        Ok(_) => {}
        Err(e) => {
            error!(user = user.0, error = %e, "/add failed");
            bot.send_message(chat, GENERIC_ERROR).await?;
        }
    }
    Ok(())
}

async fn cmd_cancel(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    let text = if state.flow.cancel(user).await {
        "Draft discarded."
    } else {
        "Nothing to cancel."
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

async fn cmd_faq(bot: &Bot, chat: teloxide::types::ChatId, state: &AppState) -> ResponseResult<()> {
    if state.cfg.faq_items.is_empty() {
        bot.send_message(chat, "The FAQ is empty for now. Use /add to create a listing.")
            .await?;
        return Ok(());
    }

    let body = state
        .cfg
        .faq_items
        .iter()
        .map(|(q, a)| format!("<b>{}</b>\n{}", escape_html(q), escape_html(a)))
        .collect::<Vec<_>>()
        .join("\n\n");
    bot.send_message(chat, body)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn cmd_myposts(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    let listings = match state.store.listings_by_author(user, 10).await {
        Ok(v) => v,
        Err(e) => {
            error!(user = user.0, error = %e, "/myposts failed");
            bot.send_message(chat, GENERIC_ERROR).await?;
            return Ok(());
        }
    };

    if listings.is_empty() {
        bot.send_message(chat, "You have no listings yet. Use /add to create one.")
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = listings
        .iter()
        .map(|l| {
            let title: String = l.title.chars().take(30).collect();
            format!(
                "#{} | {} | {} | {}",
                l.id.0,
                l.status.as_str(),
                l.created_at.format("%Y-%m-%d %H:%M"),
                escape_html(&title),
            )
        })
        .collect();
    bot.send_message(chat, format!("Your recent listings:\n{}", lines.join("\n")))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn cmd_queue(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    if !state.cfg.is_moderator(user.0) {
        return Ok(());
    }

    let entries = match state.moderation.queue_overview(10).await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "/queue failed");
            bot.send_message(chat, GENERIC_ERROR).await?;
            return Ok(());
        }
    };

    if entries.is_empty() {
        bot.send_message(chat, "The moderation queue is empty.").await?;
        return Ok(());
    }

    let ids = entries
        .iter()
        .map(|e| format!("#{}", e.listing.0))
        .collect::<Vec<_>>()
        .join(", ");
    bot.send_message(chat, format!("Next in queue: {ids}")).await?;
    Ok(())
}

async fn cmd_stats(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    if !state.cfg.is_moderator(user.0) {
        return Ok(());
    }

    let now = Utc::now();
    let windows = [
        ("day", now - Duration::days(1)),
        ("week", now - Duration::days(7)),
        ("month", now - Duration::days(30)),
    ];

    let mut lines = vec!["Listing stats:".to_string()];
    for (label, since) in windows {
        match state.moderation.stats_since(since).await {
            Ok(counts) => lines.push(format!(
                "Last {label}: {} created, {} rejected",
                counts.created, counts.rejected
            )),
            Err(e) => {
                error!(error = %e, "/stats failed");
                bot.send_message(chat, GENERIC_ERROR).await?;
                return Ok(());
            }
        }
    }

    bot.send_message(chat, lines.join("\n")).await?;
    Ok(())
}
