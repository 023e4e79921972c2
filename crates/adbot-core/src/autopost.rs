//! Autoposting scheduler.
//!
//! A single long-lived loop polls for due destination schedules and, per due
//! destination, atomically claims the oldest approved listing, publishes it,
//! mirrors it to the backup destinations, and marks it published. A
//! destination's next run always advances by its interval from "now",
//! whether or not anything was published, so a failed publish simply waits
//! for the next interval instead of retrying within the cycle.
//!
//! The claim (`Approved -> Publishing`) is the only defence against two
//! overlapping ticks publishing the same listing twice; it must stay a single
//! conditional update in the store. A claim whose publish fails is released
//! back to `Approved` so the listing becomes claimable again later.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::{DestId, FileRef, Listing, Schedule},
    messaging::{MessagingPort, SendError, SendResult, MEDIA_BATCH_LIMIT},
    render,
    store::Store,
    Result,
};

pub struct Autoposter {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
}

impl Autoposter {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn Store>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            cfg,
            store,
            messenger,
        }
    }

    /// Run the polling loop until cancelled. Storage failures are logged and
    /// the loop keeps going; the next tick retries from scratch.
    pub async fn run(&self, cancel: CancellationToken) {
        let dests: Vec<DestId> = self.cfg.publish_chat_ids.iter().map(|id| DestId(*id)).collect();
        if let Err(e) = self
            .store
            .ensure_schedules(&dests, self.cfg.default_post_interval_min, Utc::now())
            .await
        {
            error!(error = %e, "failed to seed destination schedules");
        }
        info!(
            destinations = dests.len(),
            poll_secs = self.cfg.autopost_poll_interval.as_secs(),
            "autoposter started"
        );

        let mut tick = tokio::time::interval(self.cfg.autopost_poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("autoposter stopped");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "autopost tick failed");
                    }
                }
            }
        }
    }

    /// One scheduler pass: process every due destination independently.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        let due = self.store.due_schedules(now).await?;
        for schedule in due {
            self.run_destination(&schedule, now).await?;
        }
        Ok(())
    }

    async fn run_destination(&self, schedule: &Schedule, now: DateTime<Utc>) -> Result<()> {
        let attempt = self.publish_next(schedule.dest).await?;

        // Unconditional: an empty queue or a failed send still pushes the
        // next run forward by the full interval.
        self.store.advance_schedule(schedule.dest, now).await?;

        match attempt {
            PublishAttempt::Published(id) => {
                info!(listing = id, dest = schedule.dest.0, "listing published");
            }
            PublishAttempt::QueueEmpty => {
                debug!(dest = schedule.dest.0, "nothing approved to publish");
            }
            PublishAttempt::Failed => {}
        }
        Ok(())
    }

    async fn publish_next(&self, dest: DestId) -> Result<PublishAttempt> {
        let Some(listing) = self.store.claim_oldest_approved().await? else {
            return Ok(PublishAttempt::QueueEmpty);
        };

        let caption = render::listing_caption(&listing);
        match self.send_listing(dest, &listing, &caption).await {
            Ok(()) => {
                // Primary went out; mirror to backups best-effort. A backup
                // failure neither rolls back the publish nor blocks the
                // status transition.
                for backup in &self.cfg.backup_chat_ids {
                    let backup = DestId(*backup);
                    if let Err(e) = self.send_listing(backup, &listing, &caption).await {
                        warn!(
                            listing = listing.id.0,
                            dest = backup.0,
                            error = %e,
                            "backup publish failed"
                        );
                    }
                }

                self.store.mark_published(listing.id).await?;
                Ok(PublishAttempt::Published(listing.id.0))
            }
            Err(e) => {
                // Release the claim so a later tick can retry this listing.
                self.store.release_claim(listing.id).await?;
                match &e {
                    SendError::RetryAfter(d) => warn!(
                        dest = dest.0,
                        retry_after_secs = d.as_secs(),
                        "transport backoff, destination paused until next interval"
                    ),
                    SendError::Forbidden(reason) => error!(
                        dest = dest.0,
                        reason = %reason,
                        "destination refuses delivery (bot removed?)"
                    ),
                    SendError::Other(_) => {
                        warn!(dest = dest.0, error = %e, "publish failed")
                    }
                }
                Ok(PublishAttempt::Failed)
            }
        }
    }

    /// First photo as a captioned message, remaining photos as one capped
    /// gallery. Photos beyond the batch cap stay in storage but are omitted
    /// from the publish output.
    async fn send_listing(&self, dest: DestId, listing: &Listing, caption: &str) -> SendResult<()> {
        match listing.photos.first() {
            Some(first) => {
                self.messenger
                    .send_photo(dest, &first.file, caption, &[])
                    .await?;
                if listing.photos.len() > 1 {
                    let gallery: Vec<FileRef> = listing.photos[1..]
                        .iter()
                        .take(MEDIA_BATCH_LIMIT)
                        .map(|p| p.file.clone())
                        .collect();
                    self.messenger.send_media_batch(dest, &gallery).await?;
                }
            }
            None => {
                self.messenger.send_text(dest, caption).await?;
            }
        }
        Ok(())
    }
}

enum PublishAttempt {
    Published(i64),
    QueueEmpty,
    Failed,
}
