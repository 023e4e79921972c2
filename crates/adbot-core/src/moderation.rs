//! Moderation queue service: approve / reject / ban.
//!
//! Decisions are idempotent against listings that are unknown or already
//! decided: they return [`DecisionOutcome::NotFound`] without side effects.
//! Banning is deliberately orthogonal: it blacklists the author but leaves
//! the triggering listing's status and queue entry untouched.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::Config,
    domain::{Decision, DecisionOutcome, DestId, ListingId, QueueEntry, StatCounts, UserId},
    messaging::{Button, MessagingPort},
    render::escape_html,
    store::Store,
    Result,
};

/// Decision buttons attached to a moderation card.
pub fn decision_buttons(id: ListingId) -> Vec<Button> {
    vec![
        Button::new("✅ Approve", format!("mod:approve:{}", id.0)),
        Button::new("❌ Reject", format!("mod:reject:{}", id.0)),
        Button::new("⛔ Ban author", format!("mod:ban:{}", id.0)),
    ]
}

/// Parse `mod:<decision>:<listing id>` callback data.
pub fn parse_decision_callback(data: &str) -> Option<(Decision, ListingId)> {
    let rest = data.strip_prefix("mod:")?;
    let (action, id) = rest.split_once(':')?;
    let id = ListingId(id.parse().ok()?);
    let decision = match action {
        "approve" => Decision::Approve,
        "reject" => Decision::Reject,
        "ban" => Decision::Ban,
        _ => return None,
    };
    Some((decision, id))
}

pub struct ModerationService {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
}

impl ModerationService {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn Store>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            cfg,
            store,
            messenger,
        }
    }

    /// Idempotent enqueue; listings are normally queued by `persist_listing`
    /// already, so this is a repair path.
    pub async fn enqueue(&self, id: ListingId) -> Result<bool> {
        self.store.enqueue_listing(id).await
    }

    /// Oldest queue entries, FIFO by enqueue time.
    pub async fn queue_overview(&self, n: usize) -> Result<Vec<QueueEntry>> {
        self.store.queue_oldest(n).await
    }

    pub async fn stats_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<StatCounts> {
        self.store.stats_since(since).await
    }

    /// Apply a moderator decision to a queued listing.
    pub async fn decide(
        &self,
        id: ListingId,
        decision: Decision,
        actor: UserId,
        reason: Option<&str>,
    ) -> Result<DecisionOutcome> {
        let Some(listing) = self.store.get_listing(id).await? else {
            return Ok(DecisionOutcome::NotFound);
        };
        let author = listing.author;

        match decision {
            Decision::Approve => {
                if !self.store.take_queue_entry(id).await? {
                    return Ok(DecisionOutcome::NotFound);
                }
                self.store
                    .set_status(id, crate::domain::ListingStatus::Approved, None)
                    .await?;

                self.notify_author(
                    author,
                    &format!(
                        "Your listing #{} was approved and will be published on schedule.",
                        id.0
                    ),
                )
                .await;
                self.audit(actor, &format!("approve listing {}", id.0), Some(id))
                    .await;
                info!(listing = id.0, admin = actor.0, "listing approved");
                Ok(DecisionOutcome::Approved)
            }

            Decision::Reject => {
                if !self.store.take_queue_entry(id).await? {
                    return Ok(DecisionOutcome::NotFound);
                }
                let reason = reason.unwrap_or(&self.cfg.default_reject_reason);
                self.store
                    .set_status(id, crate::domain::ListingStatus::Rejected, Some(reason))
                    .await?;

                self.notify_author(
                    author,
                    &format!(
                        "Your listing #{} was rejected. Reason: {}",
                        id.0,
                        escape_html(reason)
                    ),
                )
                .await;
                self.audit(actor, &format!("reject listing {}", id.0), Some(id))
                    .await;
                info!(listing = id.0, admin = actor.0, reason, "listing rejected");
                Ok(DecisionOutcome::Rejected)
            }

            Decision::Ban => {
                // The listing stays as-is: banning blocks future submissions,
                // it does not decide this one.
                let ban_reason = format!("Banned via listing #{}", id.0);
                self.store.add_to_blacklist(author, &ban_reason).await?;

                self.notify_author(author, "You have been banned from the listings service.")
                    .await;
                self.audit(
                    actor,
                    &format!("ban user {} via listing {}", author.0, id.0),
                    Some(id),
                )
                .await;
                info!(listing = id.0, admin = actor.0, user = author.0, "author banned");
                Ok(DecisionOutcome::Banned)
            }
        }
    }

    async fn notify_author(&self, author: UserId, text: &str) {
        // Private chat id equals the user id. Best-effort: the author may have
        // blocked the bot.
        if let Err(e) = self.messenger.send_text(DestId(author.0), text).await {
            warn!(user = author.0, error = %e, "author notification failed");
        }
    }

    /// Append to the persistent admin log and mirror to the audit channel.
    async fn audit(&self, actor: UserId, action: &str, listing: Option<ListingId>) {
        if let Err(e) = self.store.log_admin_action(actor, action, listing).await {
            warn!(admin = actor.0, error = %e, "admin log write failed");
        }

        if let Some(chat) = self.cfg.audit_log_chat_id {
            let line = format!("Admin {}: {}", actor.0, escape_html(action));
            if let Err(e) = self.messenger.send_text(DestId(chat), &line).await {
                warn!(error = %e, "audit channel notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileRef, ListingStatus, NewListing, PhotoRef};
    use crate::phash::Fingerprint;
    use crate::store::MemoryStore;
    use crate::testing::{test_config, RecordingMessenger, Sent};

    struct Fixture {
        service: ModerationService,
        store: Arc<MemoryStore>,
        messenger: Arc<RecordingMessenger>,
    }

    fn fixture() -> Fixture {
        let cfg = Arc::new(test_config());
        let store = Arc::new(MemoryStore::new(vec![]));
        let messenger = Arc::new(RecordingMessenger::new());
        let service = ModerationService::new(cfg, store.clone(), messenger.clone());
        Fixture {
            service,
            store,
            messenger,
        }
    }

    async fn queued_listing(fx: &Fixture, author: i64) -> ListingId {
        fx.store
            .persist_listing(NewListing {
                author: UserId(author),
                category: "Lost pet".to_string(),
                district: "Central".to_string(),
                title: "Orange cat missing".to_string(),
                description: "Seen near the park".to_string(),
                contacts: "+1-555-0100".to_string(),
                photos: vec![PhotoRef {
                    file: FileRef("photo-1".to_string()),
                    fingerprint: Fingerprint::from_hex("00ff00ff00ff00ff"),
                }],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn approve_flips_status_and_drains_queue() {
        let fx = fixture();
        let id = queued_listing(&fx, 10).await;

        let out = fx
            .service
            .decide(id, Decision::Approve, UserId(500), None)
            .await
            .unwrap();
        assert_eq!(out, DecisionOutcome::Approved);

        let listing = fx.store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Approved);
        assert!(listing.approved_at.is_some());
        assert!(fx.store.queue_oldest(10).await.unwrap().is_empty());

        // Author was notified in their private chat.
        let to_author = fx.messenger.sent_to(DestId(10));
        assert_eq!(to_author.len(), 1);
    }

    #[tokio::test]
    async fn second_approve_is_a_not_found_no_op() {
        let fx = fixture();
        let id = queued_listing(&fx, 10).await;

        fx.service
            .decide(id, Decision::Approve, UserId(500), None)
            .await
            .unwrap();
        let again = fx
            .service
            .decide(id, Decision::Approve, UserId(500), None)
            .await
            .unwrap();
        assert_eq!(again, DecisionOutcome::NotFound);

        // End state identical to a single approve.
        let listing = fx.store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Approved);
    }

    #[tokio::test]
    async fn reject_stores_reason_verbatim_and_tells_the_author() {
        let fx = fixture();
        let id = queued_listing(&fx, 42).await;

        let out = fx
            .service
            .decide(id, Decision::Reject, UserId(500), Some("insufficient detail"))
            .await
            .unwrap();
        assert_eq!(out, DecisionOutcome::Rejected);

        let listing = fx.store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Rejected);
        assert_eq!(listing.reject_reason.as_deref(), Some("insufficient detail"));
        assert!(fx.store.queue_oldest(10).await.unwrap().is_empty());

        let to_author = fx.messenger.sent_to(DestId(42));
        let Sent::Text { html, .. } = &to_author[0] else {
            panic!("expected a text notification");
        };
        assert!(html.contains("insufficient detail"));
    }

    #[tokio::test]
    async fn ban_blacklists_author_but_leaves_listing_alone() {
        let fx = fixture();
        let id = queued_listing(&fx, 77).await;

        let out = fx
            .service
            .decide(id, Decision::Ban, UserId(500), None)
            .await
            .unwrap();
        assert_eq!(out, DecisionOutcome::Banned);

        assert!(fx.store.is_blacklisted(UserId(77)).await.unwrap());
        // No implicit rejection: the listing is still queued.
        let listing = fx.store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Queued);
        assert_eq!(fx.store.queue_oldest(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn decisions_on_unknown_listings_are_not_found() {
        let fx = fixture();
        for decision in [Decision::Approve, Decision::Reject, Decision::Ban] {
            let out = fx
                .service
                .decide(ListingId(999), decision, UserId(500), None)
                .await
                .unwrap();
            assert_eq!(out, DecisionOutcome::NotFound);
        }
        assert!(fx.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn decisions_land_in_the_audit_channel() {
        let fx = fixture();
        let id = queued_listing(&fx, 10).await;
        fx.service
            .decide(id, Decision::Approve, UserId(500), None)
            .await
            .unwrap();

        let audit = fx.messenger.sent_to(DestId(-2000));
        assert_eq!(audit.len(), 1);
        let Sent::Text { html, .. } = &audit[0] else {
            panic!("expected audit text");
        };
        assert!(html.contains("Admin 500"));
    }

    #[test]
    fn callback_data_round_trips() {
        let buttons = decision_buttons(ListingId(42));
        assert_eq!(
            parse_decision_callback(&buttons[0].data),
            Some((Decision::Approve, ListingId(42)))
        );
        assert_eq!(
            parse_decision_callback("mod:reject:7"),
            Some((Decision::Reject, ListingId(7)))
        );
        assert_eq!(parse_decision_callback("mod:nuke:7"), None);
        assert_eq!(parse_decision_callback("cat:Lost pet"), None);
    }
}
