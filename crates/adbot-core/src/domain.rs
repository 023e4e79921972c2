use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phash::Fingerprint;

/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Publishing destination id (chat/channel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestId(pub i64);

/// Persisted listing id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(pub i64);

/// Platform message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Opaque platform file reference (enough to re-send or download a photo).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef(pub String);

/// A bot user. Created on first contact; only the rules-acceptance flag ever
/// mutates; rows are never deleted (kept for ban checks and history).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub rules_accepted: bool,
    pub created_at: DateTime<Utc>,
}

/// Listing lifecycle. `Publishing` is the interim claim state: the autoposter
/// flips `Approved -> Publishing` in one atomic conditional update so two
/// concurrent ticks can never publish the same listing twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Queued,
    Approved,
    Publishing,
    Published,
    Rejected,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Queued => "queued",
            ListingStatus::Approved => "approved",
            ListingStatus::Publishing => "publishing",
            ListingStatus::Published => "published",
            ListingStatus::Rejected => "rejected",
        }
    }
}

/// One photo attached to a listing. Fingerprints are pairwise-distinct within
/// a listing (exact-match dedup at intake).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub file: FileRef,
    pub fingerprint: Fingerprint,
}

/// One persisted classified ad.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub author: UserId,
    pub category: String,
    pub district: String,
    pub title: String,
    pub description: String,
    pub contacts: String,
    pub photos: Vec<PhotoRef>,
    pub created_at: DateTime<Utc>,
    pub status: ListingStatus,
    pub reject_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Field payload for a listing about to be persisted (no id/status yet).
#[derive(Clone, Debug)]
pub struct NewListing {
    pub author: UserId,
    pub category: String,
    pub district: String,
    pub title: String,
    pub description: String,
    pub contacts: String,
    pub photos: Vec<PhotoRef>,
}

/// Moderation queue row; at most one per listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub listing: ListingId,
    pub queued_at: DateTime<Utc>,
}

/// Per-destination publishing schedule. `next_run_at` is pushed forward by
/// `interval_min` from "now" on every tick, whether or not anything published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub dest: DestId,
    pub interval_min: u64,
    pub next_run_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct BlacklistEntry {
    pub user: UserId,
    pub reason: String,
    pub added_at: DateTime<Utc>,
}

/// Append-only audit trail row for moderator actions.
#[derive(Clone, Debug, Serialize)]
pub struct AdminLogRecord {
    pub admin: UserId,
    pub action: String,
    pub listing: Option<ListingId>,
    pub at: DateTime<Utc>,
}

/// A moderator's verdict on a queued listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Ban,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Ban => "ban",
        }
    }
}

/// What actually happened when a decision was applied. `NotFound` covers
/// unknown ids and already-decided listings; a no-op, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Rejected,
    Banned,
    NotFound,
}

/// Created/rejected counters for the admin stats overview.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatCounts {
    pub created: u64,
    pub rejected: u64,
}
