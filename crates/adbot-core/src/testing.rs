//! Test doubles shared by the flow/moderation/autopost test modules.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{DestId, FileRef, MessageId},
    messaging::{Button, FileFetcher, MessagingPort, SendError, SendResult},
};

pub fn test_config() -> Config {
    Config {
        bot_token: "test-token".to_string(),
        moderation_chat_id: -1000,
        audit_log_chat_id: Some(-2000),
        moderator_ids: vec![500],
        publish_chat_ids: vec![-3000],
        backup_chat_ids: vec![-4000],
        default_post_interval_min: 10,
        autopost_poll_interval: Duration::from_secs(30),
        categories: vec!["Lost pet".to_string(), "Found pet".to_string()],
        districts: vec!["Central".to_string(), "Eastern".to_string()],
        bad_words: vec!["spamword".to_string()],
        max_photos_per_listing: 20,
        photos_done_word: "done".to_string(),
        default_reject_reason: "Rule violation or malformed listing.".to_string(),
        rate_limit_enabled: false,
        rate_limit_requests: 20,
        rate_limit_window: Duration::from_secs(60),
        faq_items: vec![],
        group_guard_chat_ids: vec![],
    }
}

// ============== Recording messenger ==============

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Text {
        dest: DestId,
        html: String,
    },
    Photo {
        dest: DestId,
        photo: FileRef,
        caption: String,
        buttons: Vec<Button>,
    },
    Batch {
        dest: DestId,
        photos: Vec<FileRef>,
    },
}

impl Sent {
    pub fn dest(&self) -> DestId {
        match self {
            Sent::Text { dest, .. } | Sent::Photo { dest, .. } | Sent::Batch { dest, .. } => *dest,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum FailMode {
    Forbidden,
    RetryAfter,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<i64, FailMode>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_dest(&self, dest: DestId, mode: FailMode) {
        self.failures.lock().unwrap().insert(dest.0, mode);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, dest: DestId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.dest() == dest)
            .collect()
    }

    fn gate(&self, dest: DestId) -> SendResult<()> {
        match self.failures.lock().unwrap().get(&dest.0) {
            Some(FailMode::Forbidden) => Err(SendError::Forbidden("kicked".to_string())),
            Some(FailMode::RetryAfter) => Err(SendError::RetryAfter(Duration::from_secs(5))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_text(&self, dest: DestId, html: &str) -> SendResult<MessageId> {
        self.gate(dest)?;
        self.sent.lock().unwrap().push(Sent::Text {
            dest,
            html: html.to_string(),
        });
        Ok(MessageId(1))
    }

    async fn send_photo(
        &self,
        dest: DestId,
        photo: &FileRef,
        caption_html: &str,
        buttons: &[Button],
    ) -> SendResult<MessageId> {
        self.gate(dest)?;
        self.sent.lock().unwrap().push(Sent::Photo {
            dest,
            photo: photo.clone(),
            caption: caption_html.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(MessageId(1))
    }

    async fn send_media_batch(&self, dest: DestId, photos: &[FileRef]) -> SendResult<()> {
        self.gate(dest)?;
        self.sent.lock().unwrap().push(Sent::Batch {
            dest,
            photos: photos.to_vec(),
        });
        Ok(())
    }
}

// ============== Fake file fetcher ==============

/// Serves deterministic PNG bytes per file reference. Distinct seeds are
/// guaranteed to produce distinct dHash fingerprints (each seed bit drives one
/// column-to-column brightness step on a 9x8 grid, which is exactly the
/// default hash sampling grid).
#[derive(Default)]
pub struct FakeFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, file: &str, bytes: Vec<u8>) {
        self.images.lock().unwrap().insert(file.to_string(), bytes);
    }

    pub fn put_seeded(&self, file: &str, seed: u8) {
        self.put(file, seeded_png(seed));
    }
}

pub fn seeded_png(seed: u8) -> Vec<u8> {
    let mut cols = [128u8; 9];
    for x in 0..8 {
        let step: i16 = if seed & (1 << x) != 0 { 10 } else { -10 };
        cols[x + 1] = (cols[x] as i16 + step) as u8;
    }

    let img = image::GrayImage::from_fn(9, 8, |x, _| image::Luma([cols[x as usize]]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("png encode");
    buf
}

#[async_trait]
impl FileFetcher for FakeFetcher {
    async fn fetch_file(&self, file: &FileRef) -> SendResult<Vec<u8>> {
        self.images
            .lock()
            .unwrap()
            .get(&file.0)
            .cloned()
            .ok_or_else(|| SendError::Other(format!("no such file: {}", file.0)))
    }
}
