//! Persistence port and in-memory reference implementation.
//!
//! The `Store` is the only component allowed to mutate persisted state; every
//! other component calls through it. Two operations carry the system's
//! correctness load and MUST stay atomic in any implementation:
//!
//! - [`Store::persist_listing`]: listing row + photo rows + moderation-queue
//!   entry commit as one unit (never a listing without its queue entry).
//! - [`Store::claim_oldest_approved`]: selecting the oldest approved listing
//!   and flipping it to `Publishing` is a single conditional update, so two
//!   concurrent scheduler ticks can never publish the same listing twice.
//!
//! `MemoryStore` keeps every table behind one mutex; holding the lock for the
//! duration of a call is its transaction discipline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{
        AdminLogRecord, BlacklistEntry, DestId, Listing, ListingId, ListingStatus, NewListing,
        QueueEntry, Schedule, StatCounts, User, UserId,
    },
    Result,
};

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn get_or_create_user(&self, user: UserId) -> Result<User>;
    async fn set_rules_accepted(&self, user: UserId) -> Result<()>;

    // Blacklist
    async fn is_blacklisted(&self, user: UserId) -> Result<bool>;
    async fn add_to_blacklist(&self, user: UserId, reason: &str) -> Result<()>;

    // Bad-word list
    async fn bad_words(&self) -> Result<Vec<String>>;
    async fn add_bad_word(&self, word: &str) -> Result<()>;

    // Listings
    /// Atomic unit of work: the listing, its photos, and its moderation-queue
    /// entry are committed together with status `Queued`.
    async fn persist_listing(&self, listing: NewListing) -> Result<ListingId>;
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>>;
    async fn listings_by_author(&self, author: UserId, limit: usize) -> Result<Vec<Listing>>;
    async fn set_status(
        &self,
        id: ListingId,
        status: ListingStatus,
        reason: Option<&str>,
    ) -> Result<()>;

    // Moderation queue
    /// Insert a queue entry if none exists. Returns false (no-op) when the
    /// listing already has one or does not exist.
    async fn enqueue_listing(&self, id: ListingId) -> Result<bool>;
    async fn queue_oldest(&self, n: usize) -> Result<Vec<QueueEntry>>;
    /// Remove the queue entry for a listing. Returns false when no entry
    /// exists (unknown listing or already decided).
    async fn take_queue_entry(&self, id: ListingId) -> Result<bool>;

    // Publishing
    /// Atomically select the oldest `Approved` listing and flip it to
    /// `Publishing`. Returns `None` when nothing is claimable.
    async fn claim_oldest_approved(&self) -> Result<Option<Listing>>;
    /// Return a claimed listing to `Approved` after a failed publish; it
    /// becomes claimable again on a later tick.
    async fn release_claim(&self, id: ListingId) -> Result<()>;
    async fn mark_published(&self, id: ListingId) -> Result<()>;

    // Schedules
    /// Create a schedule row for any destination that lacks one.
    async fn ensure_schedules(
        &self,
        dests: &[DestId],
        interval_min: u64,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>>;
    /// Push a destination's next run to `now + interval`, unconditionally.
    async fn advance_schedule(&self, dest: DestId, now: DateTime<Utc>) -> Result<()>;

    // Audit
    async fn log_admin_action(
        &self,
        admin: UserId,
        action: &str,
        listing: Option<ListingId>,
    ) -> Result<()>;
    async fn stats_since(&self, since: DateTime<Utc>) -> Result<StatCounts>;
}

// ============== In-memory implementation ==============

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    blacklist: HashMap<UserId, BlacklistEntry>,
    bad_words: Vec<String>,
    listings: HashMap<ListingId, Listing>,
    queue: HashMap<ListingId, QueueEntry>,
    schedules: HashMap<DestId, Schedule>,
    admin_log: Vec<AdminLogRecord>,
    next_listing_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(seed_bad_words: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                bad_words: seed_bad_words,
                next_listing_id: 1,
                ..Inner::default()
            }),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_user(&self, user: UserId) -> Result<User> {
        let mut st = self.inner.lock().await;
        let u = st.users.entry(user).or_insert_with(|| User {
            id: user,
            rules_accepted: false,
            created_at: Utc::now(),
        });
        Ok(u.clone())
    }

    async fn set_rules_accepted(&self, user: UserId) -> Result<()> {
        let mut st = self.inner.lock().await;
        if let Some(u) = st.users.get_mut(&user) {
            u.rules_accepted = true;
        }
        Ok(())
    }

    async fn is_blacklisted(&self, user: UserId) -> Result<bool> {
        Ok(self.inner.lock().await.blacklist.contains_key(&user))
    }

    async fn add_to_blacklist(&self, user: UserId, reason: &str) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.blacklist.insert(
            user,
            BlacklistEntry {
                user,
                reason: reason.to_string(),
                added_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn bad_words(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.bad_words.clone())
    }

    async fn add_bad_word(&self, word: &str) -> Result<()> {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return Ok(());
        }
        let mut st = self.inner.lock().await;
        if !st.bad_words.contains(&word) {
            st.bad_words.push(word);
        }
        Ok(())
    }

    async fn persist_listing(&self, listing: NewListing) -> Result<ListingId> {
        let mut st = self.inner.lock().await;
        let id = ListingId(st.next_listing_id);
        st.next_listing_id += 1;

        let now = Utc::now();
        st.listings.insert(
            id,
            Listing {
                id,
                author: listing.author,
                category: listing.category,
                district: listing.district,
                title: listing.title,
                description: listing.description,
                contacts: listing.contacts,
                photos: listing.photos,
                created_at: now,
                status: ListingStatus::Queued,
                reject_reason: None,
                approved_at: None,
                published_at: None,
            },
        );
        st.queue.insert(
            id,
            QueueEntry {
                listing: id,
                queued_at: now,
            },
        );

        Ok(id)
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.inner.lock().await.listings.get(&id).cloned())
    }

    async fn listings_by_author(&self, author: UserId, limit: usize) -> Result<Vec<Listing>> {
        let st = self.inner.lock().await;
        let mut out: Vec<Listing> = st
            .listings
            .values()
            .filter(|l| l.author == author)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id)); // newest first
        out.truncate(limit);
        Ok(out)
    }

    async fn set_status(
        &self,
        id: ListingId,
        status: ListingStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut st = self.inner.lock().await;
        if let Some(l) = st.listings.get_mut(&id) {
            l.status = status;
            if let Some(r) = reason {
                l.reject_reason = Some(r.to_string());
            }
            if status == ListingStatus::Approved && l.approved_at.is_none() {
                l.approved_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn enqueue_listing(&self, id: ListingId) -> Result<bool> {
        let mut st = self.inner.lock().await;
        if !st.listings.contains_key(&id) || st.queue.contains_key(&id) {
            return Ok(false);
        }
        st.queue.insert(
            id,
            QueueEntry {
                listing: id,
                queued_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn queue_oldest(&self, n: usize) -> Result<Vec<QueueEntry>> {
        let st = self.inner.lock().await;
        let mut entries: Vec<QueueEntry> = st.queue.values().copied().collect();
        entries.sort_by_key(|e| (e.queued_at, e.listing));
        entries.truncate(n);
        Ok(entries)
    }

    async fn take_queue_entry(&self, id: ListingId) -> Result<bool> {
        Ok(self.inner.lock().await.queue.remove(&id).is_some())
    }

    async fn claim_oldest_approved(&self) -> Result<Option<Listing>> {
        let mut st = self.inner.lock().await;

        // Select + flip under one lock: this is the atomic conditional update.
        let oldest = st
            .listings
            .values()
            .filter(|l| l.status == ListingStatus::Approved)
            .map(|l| (l.created_at, l.id))
            .min();

        let Some((_, id)) = oldest else {
            return Ok(None);
        };

        let Some(l) = st.listings.get_mut(&id) else {
            return Ok(None);
        };
        l.status = ListingStatus::Publishing;
        Ok(Some(l.clone()))
    }

    async fn release_claim(&self, id: ListingId) -> Result<()> {
        let mut st = self.inner.lock().await;
        if let Some(l) = st.listings.get_mut(&id) {
            if l.status == ListingStatus::Publishing {
                l.status = ListingStatus::Approved;
            }
        }
        Ok(())
    }

    async fn mark_published(&self, id: ListingId) -> Result<()> {
        let mut st = self.inner.lock().await;
        if let Some(l) = st.listings.get_mut(&id) {
            // Only a claimed listing can complete; publishing is reachable
            // solely from approved, so nothing skips moderation.
            if l.status == ListingStatus::Publishing {
                l.status = ListingStatus::Published;
                l.published_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn ensure_schedules(
        &self,
        dests: &[DestId],
        interval_min: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut st = self.inner.lock().await;
        for dest in dests {
            st.schedules.entry(*dest).or_insert(Schedule {
                dest: *dest,
                interval_min,
                next_run_at: now,
            });
        }
        Ok(())
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let st = self.inner.lock().await;
        let mut due: Vec<Schedule> = st
            .schedules
            .values()
            .filter(|s| s.next_run_at <= now)
            .copied()
            .collect();
        due.sort_by_key(|s| s.dest.0);
        Ok(due)
    }

    async fn advance_schedule(&self, dest: DestId, now: DateTime<Utc>) -> Result<()> {
        let mut st = self.inner.lock().await;
        if let Some(s) = st.schedules.get_mut(&dest) {
            s.next_run_at = now + chrono::Duration::minutes(s.interval_min as i64);
        }
        Ok(())
    }

    async fn log_admin_action(
        &self,
        admin: UserId,
        action: &str,
        listing: Option<ListingId>,
    ) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.admin_log.push(AdminLogRecord {
            admin,
            action: action.to_string(),
            listing,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn stats_since(&self, since: DateTime<Utc>) -> Result<StatCounts> {
        let st = self.inner.lock().await;
        let mut counts = StatCounts::default();
        for l in st.listings.values() {
            if l.created_at >= since {
                counts.created += 1;
                if l.status == ListingStatus::Rejected {
                    counts.rejected += 1;
                }
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileRef, PhotoRef};
    use crate::phash::Fingerprint;
    use std::sync::Arc;

    fn new_listing(author: i64, photos: usize) -> NewListing {
        NewListing {
            author: UserId(author),
            category: "Lost pet".to_string(),
            district: "Central".to_string(),
            title: "Orange cat missing".to_string(),
            description: "Seen near the park".to_string(),
            contacts: "+1-555-0100".to_string(),
            photos: (0..photos)
                .map(|i| PhotoRef {
                    file: FileRef(format!("file-{i}")),
                    fingerprint: Fingerprint::from_hex(&format!("{i:016x}")),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn persist_and_fetch_round_trip() {
        let store = MemoryStore::new(vec![]);
        let id = store.persist_listing(new_listing(10, 2)).await.unwrap();

        let got = store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(got.author, UserId(10));
        assert_eq!(got.category, "Lost pet");
        assert_eq!(got.district, "Central");
        assert_eq!(got.title, "Orange cat missing");
        assert_eq!(got.description, "Seen near the park");
        assert_eq!(got.contacts, "+1-555-0100");
        assert_eq!(got.status, ListingStatus::Queued);
        assert_eq!(got.photos.len(), 2);
        assert_eq!(got.photos[0].file, FileRef("file-0".to_string()));
        assert_eq!(got.photos[1].file, FileRef("file-1".to_string()));

        // Queue entry was committed in the same unit of work.
        let queue = store.queue_oldest(10).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].listing, id);
    }

    #[tokio::test]
    async fn take_queue_entry_is_single_shot() {
        let store = MemoryStore::new(vec![]);
        let id = store.persist_listing(new_listing(1, 1)).await.unwrap();

        assert!(store.take_queue_entry(id).await.unwrap());
        assert!(!store.take_queue_entry(id).await.unwrap());
        assert!(!store.take_queue_entry(ListingId(999)).await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_is_idempotent() {
        let store = MemoryStore::new(vec![]);
        let id = store.persist_listing(new_listing(1, 1)).await.unwrap();

        // persist_listing already queued it.
        assert!(!store.enqueue_listing(id).await.unwrap());

        assert!(store.take_queue_entry(id).await.unwrap());
        assert!(store.enqueue_listing(id).await.unwrap());
        assert!(!store.enqueue_listing(ListingId(999)).await.unwrap());
    }

    #[tokio::test]
    async fn claim_takes_oldest_approved_and_flips_status() {
        let store = MemoryStore::new(vec![]);
        let first = store.persist_listing(new_listing(1, 1)).await.unwrap();
        let second = store.persist_listing(new_listing(2, 1)).await.unwrap();

        store
            .set_status(second, ListingStatus::Approved, None)
            .await
            .unwrap();
        store
            .set_status(first, ListingStatus::Approved, None)
            .await
            .unwrap();

        let claimed = store.claim_oldest_approved().await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(
            store.get_listing(first).await.unwrap().unwrap().status,
            ListingStatus::Publishing
        );

        // Queued-only listings are never claimable.
        let next = store.claim_oldest_approved().await.unwrap().unwrap();
        assert_eq!(next.id, second);
        assert!(store.claim_oldest_approved().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let id = store.persist_listing(new_listing(1, 1)).await.unwrap();
        store
            .set_status(id, ListingStatus::Approved, None)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(
                async move { store.claim_oldest_approved().await },
            ));
        }

        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn release_claim_makes_listing_claimable_again() {
        let store = MemoryStore::new(vec![]);
        let id = store.persist_listing(new_listing(1, 1)).await.unwrap();
        store
            .set_status(id, ListingStatus::Approved, None)
            .await
            .unwrap();

        assert!(store.claim_oldest_approved().await.unwrap().is_some());
        assert!(store.claim_oldest_approved().await.unwrap().is_none());

        store.release_claim(id).await.unwrap();
        let reclaimed = store.claim_oldest_approved().await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
    }

    #[tokio::test]
    async fn publish_requires_a_claim_first() {
        let store = MemoryStore::new(vec![]);
        let id = store.persist_listing(new_listing(1, 1)).await.unwrap();

        // Still queued: marking published is a no-op.
        store.mark_published(id).await.unwrap();
        assert_eq!(
            store.get_listing(id).await.unwrap().unwrap().status,
            ListingStatus::Queued
        );

        store
            .set_status(id, ListingStatus::Approved, None)
            .await
            .unwrap();
        store.claim_oldest_approved().await.unwrap().unwrap();
        store.mark_published(id).await.unwrap();

        let listing = store.get_listing(id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Published);
        assert!(listing.published_at.is_some());
    }

    #[tokio::test]
    async fn schedules_advance_by_their_interval() {
        let store = MemoryStore::new(vec![]);
        let dest = DestId(-100);
        let now = Utc::now();

        store.ensure_schedules(&[dest], 10, now).await.unwrap();
        let due = store.due_schedules(now).await.unwrap();
        assert_eq!(due.len(), 1);

        store.advance_schedule(dest, now).await.unwrap();
        assert!(store.due_schedules(now).await.unwrap().is_empty());

        let later = now + chrono::Duration::minutes(10);
        assert_eq!(store.due_schedules(later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_count_created_and_rejected() {
        let store = MemoryStore::new(vec![]);
        let a = store.persist_listing(new_listing(1, 1)).await.unwrap();
        let _b = store.persist_listing(new_listing(2, 1)).await.unwrap();
        store
            .set_status(a, ListingStatus::Rejected, Some("spam"))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let counts = store.stats_since(since).await.unwrap();
        assert_eq!(counts.created, 2);
        assert_eq!(counts.rejected, 1);
    }
}
