//! Telegram adapter (teloxide).
//!
//! Implements the `adbot-core` messaging and file ports over the Telegram Bot
//! API and hosts the update router. Transport errors are mapped into the
//! core's `SendError` taxonomy here; backoff policy belongs to the callers.

use async_trait::async_trait;
use std::io::Cursor;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, InputMedia, InputMediaPhoto, ParseMode},
    ApiError, RequestError,
};

use adbot_core::{
    domain::{DestId, FileRef, MessageId},
    messaging::{Button, FileFetcher, MessagingPort, SendError, SendResult},
};

pub mod handlers;
pub mod keyboards;
pub mod router;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(dest: DestId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(dest.0)
    }

    fn map_err(e: RequestError) -> SendError {
        match e {
            RequestError::RetryAfter(d) => SendError::RetryAfter(d),
            RequestError::Api(api) => match api {
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::ChatNotFound
                | ApiError::UserDeactivated
                | ApiError::NotEnoughRightsToPostMessages => SendError::Forbidden(api.to_string()),
                other => SendError::Other(other.to_string()),
            },
            other => SendError::Other(other.to_string()),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, dest: DestId, html: &str) -> SendResult<MessageId> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(dest), html.to_string())
            .parse_mode(ParseMode::Html)
            .await
            .map_err(Self::map_err)?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_photo(
        &self,
        dest: DestId,
        photo: &FileRef,
        caption_html: &str,
        buttons: &[Button],
    ) -> SendResult<MessageId> {
        let mut req = self
            .bot
            .send_photo(Self::tg_chat(dest), InputFile::file_id(photo.0.clone()))
            .caption(caption_html.to_string())
            .parse_mode(ParseMode::Html);
        if !buttons.is_empty() {
            req = req.reply_markup(keyboards::inline(buttons, 2));
        }

        let msg = req.await.map_err(Self::map_err)?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_media_batch(&self, dest: DestId, photos: &[FileRef]) -> SendResult<()> {
        if photos.is_empty() {
            return Ok(());
        }

        let media: Vec<InputMedia> = photos
            .iter()
            .map(|p| InputMedia::Photo(InputMediaPhoto::new(InputFile::file_id(p.0.clone()))))
            .collect();

        self.bot
            .send_media_group(Self::tg_chat(dest), media)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl FileFetcher for TelegramMessenger {
    async fn fetch_file(&self, file: &FileRef) -> SendResult<Vec<u8>> {
        let meta = self
            .bot
            .get_file(file.0.clone())
            .await
            .map_err(Self::map_err)?;

        let mut buf = Cursor::new(Vec::new());
        self.bot
            .download_file(&meta.path, &mut buf)
            .await
            .map_err(|e| SendError::Other(format!("download failed: {e}")))?;

        Ok(buf.into_inner())
    }
}
