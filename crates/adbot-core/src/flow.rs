//! Submission flow: the guided dialogue that builds one listing.
//!
//! The draft is an explicit tagged-state object held in memory, keyed by
//! author. Each state has exactly one transition method; input that does not
//! match the current state is rejected by construction (`StepOutcome::
//! Ignored`), never applied out of order. Drafts are ephemeral: discarded on
//! submission, replaced wholesale when the author starts over, and lost on
//! process restart.
//!
//! Order: category -> district -> title -> description -> photos -> contacts,
//! then one atomic persist (listing + photos + moderation-queue entry) and a
//! best-effort moderation notification.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{DestId, FileRef, ListingId, NewListing, PhotoRef, UserId},
    filter::ContentFilter,
    messaging::{FileFetcher, MessagingPort, MEDIA_BATCH_LIMIT},
    moderation,
    phash,
    render,
    store::Store,
    throttle::RateLimiter,
    Result,
};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_CONTACTS_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DraftState {
    Category,
    District,
    Title,
    Description,
    Photos,
    Contacts,
}

#[derive(Clone, Debug)]
struct Draft {
    state: DraftState,
    category: Option<String>,
    district: Option<String>,
    title: Option<String>,
    description: Option<String>,
    photos: Vec<PhotoRef>,
}

impl Draft {
    fn new() -> Self {
        Self {
            state: DraftState::Category,
            category: None,
            district: None,
            title: None,
            description: None,
            photos: Vec::new(),
        }
    }
}

/// Which keyboard (if any) the adapter should attach to a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Categories,
    Districts,
    Plain,
}

/// Result of feeding one user input into the flow.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The draft advanced; show the next prompt.
    Advanced { kind: PromptKind, text: String },
    /// Input was invalid (or informational); the draft did not move.
    Stay { text: String },
    /// No draft is active, or the input type does not fit the current state.
    Ignored,
    /// The listing was persisted and queued for moderation.
    Submitted {
        listing: ListingId,
        moderation_notified: bool,
    },
}

/// Result of a flow entry attempt (`/start`, `/add`).
#[derive(Clone, Debug, PartialEq)]
pub enum EntryOutcome {
    /// A fresh draft was created; show the category prompt.
    Started { text: String },
    /// First contact or rules not yet accepted; show the rules.
    ShowRules,
    /// Rules already accepted; ready to submit.
    Ready,
    Blacklisted,
    RulesNotAccepted,
    RateLimited { retry_after: Duration },
}

pub struct SubmissionFlow {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
    fetcher: Arc<dyn FileFetcher>,
    filter: ContentFilter,
    limiter: Arc<Mutex<RateLimiter>>,
    drafts: Mutex<HashMap<UserId, Draft>>,
}

impl SubmissionFlow {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        messenger: Arc<dyn MessagingPort>,
        fetcher: Arc<dyn FileFetcher>,
        limiter: Arc<Mutex<RateLimiter>>,
    ) -> Self {
        Self {
            cfg,
            store,
            messenger,
            fetcher,
            filter: ContentFilter::new(),
            limiter,
            drafts: Mutex::new(HashMap::new()),
        }
    }

    // ============== Entry points ==============

    /// `/start`: create the user row on first contact and report where the
    /// author stands with the rules.
    pub async fn first_contact(&self, user: UserId) -> Result<EntryOutcome> {
        if let Some(blocked) = self.check_gate(user, false).await? {
            return Ok(blocked);
        }

        let u = self.store.get_or_create_user(user).await?;
        if u.rules_accepted {
            Ok(EntryOutcome::Ready)
        } else {
            Ok(EntryOutcome::ShowRules)
        }
    }

    pub async fn accept_rules(&self, user: UserId) -> Result<()> {
        self.store.get_or_create_user(user).await?;
        self.store.set_rules_accepted(user).await
    }

    /// `/add`: start (or restart) a submission. Any unfinished draft for this
    /// author is discarded.
    pub async fn begin(&self, user: UserId) -> Result<EntryOutcome> {
        if let Some(blocked) = self.check_gate(user, true).await? {
            return Ok(blocked);
        }

        let mut drafts = self.drafts.lock().await;
        if drafts.insert(user, Draft::new()).is_some() {
            debug!(user = user.0, "restarted submission, prior draft discarded");
        }

        Ok(EntryOutcome::Started {
            text: "Choose a category for your listing:".to_string(),
        })
    }

    /// Shared entry preconditions: blacklist, then rules, then flood control.
    /// Returns `Some(outcome)` when entry must be refused. No draft state is
    /// created before every gate has passed.
    async fn check_gate(&self, user: UserId, require_rules: bool) -> Result<Option<EntryOutcome>> {
        if self.store.is_blacklisted(user).await? {
            return Ok(Some(EntryOutcome::Blacklisted));
        }

        if require_rules {
            let u = self.store.get_or_create_user(user).await?;
            if !u.rules_accepted {
                return Ok(Some(EntryOutcome::RulesNotAccepted));
            }
        }

        let (ok, retry_after) = self.limiter.lock().await.check(user);
        if !ok {
            return Ok(Some(EntryOutcome::RateLimited {
                retry_after: retry_after.unwrap_or_default(),
            }));
        }

        Ok(None)
    }

    /// Drop any in-progress draft (user cancelled).
    pub async fn cancel(&self, user: UserId) -> bool {
        self.drafts.lock().await.remove(&user).is_some()
    }

    // ============== Choice steps ==============

    pub async fn choose_category(&self, user: UserId, value: &str) -> Result<StepOutcome> {
        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::Category {
            return Ok(StepOutcome::Ignored);
        }

        if !self.cfg.categories.iter().any(|c| c == value) {
            return Ok(StepOutcome::Stay {
                text: "Please pick one of the listed categories.".to_string(),
            });
        }

        draft.category = Some(value.to_string());
        draft.state = DraftState::District;
        Ok(StepOutcome::Advanced {
            kind: PromptKind::Districts,
            text: "Choose a district:".to_string(),
        })
    }

    pub async fn choose_district(&self, user: UserId, value: &str) -> Result<StepOutcome> {
        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::District {
            return Ok(StepOutcome::Ignored);
        }

        if !self.cfg.districts.iter().any(|d| d == value) {
            return Ok(StepOutcome::Stay {
                text: "Please pick one of the listed districts.".to_string(),
            });
        }

        draft.district = Some(value.to_string());
        draft.state = DraftState::Title;
        Ok(StepOutcome::Advanced {
            kind: PromptKind::Plain,
            text: format!("Enter a title (up to {MAX_TITLE_LEN} characters):"),
        })
    }

    // ============== Free-text steps ==============

    /// Route a plain text message into whatever the draft currently expects.
    pub async fn handle_text(&self, user: UserId, text: &str) -> Result<StepOutcome> {
        let state = {
            let drafts = self.drafts.lock().await;
            match drafts.get(&user) {
                Some(d) => d.state,
                None => return Ok(StepOutcome::Ignored),
            }
        };

        match state {
            DraftState::Title => self.set_title(user, text).await,
            DraftState::Description => self.set_description(user, text).await,
            DraftState::Photos => self.photos_done(user, text).await,
            DraftState::Contacts => self.set_contacts(user, text).await,
            // Category/district take button input, not free text.
            DraftState::Category | DraftState::District => Ok(StepOutcome::Ignored),
        }
    }

    async fn set_title(&self, user: UserId, text: &str) -> Result<StepOutcome> {
        let title = text.trim();
        if let Some(msg) = self.validate_text(title, MAX_TITLE_LEN).await? {
            return Ok(StepOutcome::Stay { text: msg });
        }

        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::Title {
            return Ok(StepOutcome::Ignored);
        }
        draft.title = Some(title.to_string());
        draft.state = DraftState::Description;
        Ok(StepOutcome::Advanced {
            kind: PromptKind::Plain,
            text: format!("Describe your listing (up to {MAX_DESCRIPTION_LEN} characters):"),
        })
    }

    async fn set_description(&self, user: UserId, text: &str) -> Result<StepOutcome> {
        let description = text.trim();
        if let Some(msg) = self.validate_text(description, MAX_DESCRIPTION_LEN).await? {
            return Ok(StepOutcome::Stay { text: msg });
        }

        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::Description {
            return Ok(StepOutcome::Ignored);
        }
        draft.description = Some(description.to_string());
        draft.state = DraftState::Photos;
        Ok(StepOutcome::Advanced {
            kind: PromptKind::Plain,
            text: format!(
                "Send 1-{} photos. When finished, type \"{}\".",
                self.cfg.max_photos_per_listing, self.cfg.photos_done_word
            ),
        })
    }

    /// Text received while collecting photos: only the configured done-word
    /// advances, and only once at least one photo is attached.
    async fn photos_done(&self, user: UserId, text: &str) -> Result<StepOutcome> {
        if !text.trim().eq_ignore_ascii_case(&self.cfg.photos_done_word) {
            return Ok(StepOutcome::Stay {
                text: format!(
                    "Send a photo, or type \"{}\" to continue.",
                    self.cfg.photos_done_word
                ),
            });
        }

        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::Photos {
            return Ok(StepOutcome::Ignored);
        }
        if draft.photos.is_empty() {
            return Ok(StepOutcome::Stay {
                text: "Attach at least one photo first.".to_string(),
            });
        }

        draft.state = DraftState::Contacts;
        Ok(StepOutcome::Advanced {
            kind: PromptKind::Plain,
            text: format!("Add contact information (up to {MAX_CONTACTS_LEN} characters):"),
        })
    }

    async fn validate_text(&self, text: &str, max_len: usize) -> Result<Option<String>> {
        if text.is_empty() || text.chars().count() > max_len {
            return Ok(Some(format!("Enter text up to {max_len} characters.")));
        }

        let banned = self.store.bad_words().await?;
        if let Some(violation) = self.filter.check(text, &banned) {
            return Ok(Some(violation.user_message()));
        }

        Ok(None)
    }

    // ============== Photos ==============

    pub async fn handle_photo(&self, user: UserId, file: FileRef) -> Result<StepOutcome> {
        {
            let drafts = self.drafts.lock().await;
            match drafts.get(&user) {
                Some(d) if d.state == DraftState::Photos => {}
                Some(_) | None => return Ok(StepOutcome::Ignored),
            }
        }

        let cap = self.cfg.max_photos_per_listing;

        // Fetch + fingerprint without holding the draft map across the
        // suspension points.
        let bytes = match self.fetcher.fetch_file(&file).await {
            Ok(b) => b,
            Err(e) => {
                warn!(user = user.0, error = %e, "photo download failed");
                return Ok(StepOutcome::Stay {
                    text: "Could not download that photo, please try again.".to_string(),
                });
            }
        };
        let fingerprint = match phash::dhash(&bytes) {
            Ok(f) => f,
            Err(e) => {
                debug!(user = user.0, error = %e, "photo decode failed");
                return Ok(StepOutcome::Stay {
                    text: "That does not look like an image I can read, please try another photo."
                        .to_string(),
                });
            }
        };

        let mut drafts = self.drafts.lock().await;
        let Some(draft) = drafts.get_mut(&user) else {
            return Ok(StepOutcome::Ignored);
        };
        if draft.state != DraftState::Photos {
            return Ok(StepOutcome::Ignored);
        }

        if draft.photos.len() >= cap {
            return Ok(StepOutcome::Stay {
                text: format!(
                    "Maximum of {cap} photos reached. Type \"{}\" to continue.",
                    self.cfg.photos_done_word
                ),
            });
        }

        // Exact-fingerprint dedup within the draft; duplicates are dropped,
        // never stored.
        if draft.photos.iter().any(|p| p.fingerprint == fingerprint) {
            debug!(user = user.0, %fingerprint, "duplicate photo dropped");
            return Ok(StepOutcome::Stay {
                text: "That photo looks like a duplicate, skipping it.".to_string(),
            });
        }

        draft.photos.push(PhotoRef { file, fingerprint });
        let count = draft.photos.len();
        Ok(StepOutcome::Stay {
            text: format!(
                "Photo added ({count}/{cap}). Send more or type \"{}\".",
                self.cfg.photos_done_word
            ),
        })
    }

    // ============== Submission ==============

    async fn set_contacts(&self, user: UserId, text: &str) -> Result<StepOutcome> {
        let contacts = text.trim();
        if let Some(msg) = self.validate_text(contacts, MAX_CONTACTS_LEN).await? {
            return Ok(StepOutcome::Stay { text: msg });
        }

        // Assemble the listing while the draft is still in place; it is only
        // removed after the persist succeeds, so a storage failure leaves the
        // user able to retry.
        let new_listing = {
            let drafts = self.drafts.lock().await;
            let Some(draft) = drafts.get(&user) else {
                return Ok(StepOutcome::Ignored);
            };
            if draft.state != DraftState::Contacts {
                return Ok(StepOutcome::Ignored);
            }
            let (Some(category), Some(district), Some(title), Some(description)) = (
                draft.category.clone(),
                draft.district.clone(),
                draft.title.clone(),
                draft.description.clone(),
            ) else {
                return Ok(StepOutcome::Ignored);
            };

            NewListing {
                author: user,
                category,
                district,
                title,
                description,
                contacts: contacts.to_string(),
                photos: draft.photos.clone(),
            }
        };

        let listing_id = self.store.persist_listing(new_listing).await?;
        self.drafts.lock().await.remove(&user);
        info!(user = user.0, listing = listing_id.0, "listing queued for moderation");

        let moderation_notified = self.notify_moderation(listing_id).await;
        Ok(StepOutcome::Submitted {
            listing: listing_id,
            moderation_notified,
        })
    }

    /// Best-effort moderation card: first photo with the caption and decision
    /// buttons, remaining photos as a capped gallery. A delivery failure never
    /// rolls back the already-persisted listing.
    async fn notify_moderation(&self, id: ListingId) -> bool {
        let listing = match self.store.get_listing(id).await {
            Ok(Some(l)) => l,
            Ok(None) => return false,
            Err(e) => {
                warn!(listing = id.0, error = %e, "failed to load listing for moderation card");
                return false;
            }
        };

        let dest = DestId(self.cfg.moderation_chat_id);
        let caption = render::moderation_caption(&listing);
        let buttons = moderation::decision_buttons(id);

        let sent = match listing.photos.first() {
            Some(first) => {
                self.messenger
                    .send_photo(dest, &first.file, &caption, &buttons)
                    .await
            }
            None => self.messenger.send_text(dest, &caption).await,
        };

        if let Err(e) = sent {
            warn!(listing = id.0, error = %e, "moderation notification failed");
            return false;
        }

        if listing.photos.len() > 1 {
            let gallery: Vec<FileRef> = listing.photos[1..]
                .iter()
                .take(MEDIA_BATCH_LIMIT)
                .map(|p| p.file.clone())
                .collect();
            if let Err(e) = self.messenger.send_media_batch(dest, &gallery).await {
                warn!(listing = id.0, error = %e, "moderation gallery failed");
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{seeded_png, test_config, FakeFetcher, RecordingMessenger, Sent};
    use crate::domain::ListingStatus;

    struct Fixture {
        flow: SubmissionFlow,
        store: Arc<MemoryStore>,
        messenger: Arc<RecordingMessenger>,
        fetcher: Arc<FakeFetcher>,
    }

    fn fixture() -> Fixture {
        let cfg = Arc::new(test_config());
        let store = Arc::new(MemoryStore::new(cfg.bad_words.clone()));
        let messenger = Arc::new(RecordingMessenger::new());
        let fetcher = Arc::new(FakeFetcher::new());
        let limiter = Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        )));
        let flow = SubmissionFlow::new(
            cfg,
            store.clone(),
            messenger.clone(),
            fetcher.clone(),
            limiter,
        );
        Fixture {
            flow,
            store,
            messenger,
            fetcher,
        }
    }

    async fn accepted_user(fx: &Fixture, id: i64) -> UserId {
        let user = UserId(id);
        fx.flow.accept_rules(user).await.unwrap();
        user
    }

    async fn advance_to_photos(fx: &Fixture, user: UserId) {
        assert!(matches!(
            fx.flow.begin(user).await.unwrap(),
            EntryOutcome::Started { .. }
        ));
        assert!(matches!(
            fx.flow.choose_category(user, "Lost pet").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
        assert!(matches!(
            fx.flow.choose_district(user, "Central").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
        assert!(matches!(
            fx.flow.handle_text(user, "Orange cat missing").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
        assert!(matches!(
            fx.flow.handle_text(user, "Seen near the park").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
    }

    #[tokio::test]
    async fn happy_path_queues_listing_and_notifies_moderation() {
        let fx = fixture();
        let user = accepted_user(&fx, 10).await;
        advance_to_photos(&fx, user).await;

        fx.fetcher.put_seeded("photo-1", 1);
        assert!(matches!(
            fx.flow
                .handle_photo(user, FileRef("photo-1".to_string()))
                .await
                .unwrap(),
            StepOutcome::Stay { .. }
        ));
        assert!(matches!(
            fx.flow.handle_text(user, "done").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));

        let outcome = fx.flow.handle_text(user, "+1-555-0100").await.unwrap();
        let StepOutcome::Submitted {
            listing,
            moderation_notified,
        } = outcome
        else {
            panic!("expected submission, got {outcome:?}");
        };
        assert!(moderation_notified);

        let stored = fx.store.get_listing(listing).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Queued);
        assert_eq!(stored.category, "Lost pet");
        assert_eq!(stored.district, "Central");
        assert_eq!(stored.title, "Orange cat missing");
        assert_eq!(stored.description, "Seen near the park");
        assert_eq!(stored.contacts, "+1-555-0100");
        assert_eq!(stored.photos.len(), 1);

        let queue = fx.store.queue_oldest(10).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].listing, listing);

        // One moderation card with decision buttons, to the moderation chat.
        let cards = fx.messenger.sent_to(DestId(-1000));
        assert_eq!(cards.len(), 1);
        let Sent::Photo { buttons, caption, .. } = &cards[0] else {
            panic!("expected a photo card");
        };
        assert_eq!(buttons.len(), 3);
        assert!(caption.contains("Orange cat missing"));
    }

    #[tokio::test]
    async fn blacklisted_author_is_refused_before_any_draft_exists() {
        let fx = fixture();
        let user = accepted_user(&fx, 11).await;
        fx.store.add_to_blacklist(user, "spam").await.unwrap();

        assert_eq!(fx.flow.begin(user).await.unwrap(), EntryOutcome::Blacklisted);
        // No draft: all step inputs are ignored.
        assert_eq!(
            fx.flow.handle_text(user, "anything").await.unwrap(),
            StepOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn rules_must_be_accepted_before_submitting() {
        let fx = fixture();
        let user = UserId(12);
        fx.store.get_or_create_user(user).await.unwrap();

        assert_eq!(
            fx.flow.begin(user).await.unwrap(),
            EntryOutcome::RulesNotAccepted
        );

        fx.flow.accept_rules(user).await.unwrap();
        assert!(matches!(
            fx.flow.begin(user).await.unwrap(),
            EntryOutcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn rate_limited_entry_is_refused() {
        let fx = fixture();
        let user = accepted_user(&fx, 13).await;

        // Re-wire a 1-per-minute limiter by building a new flow around it.
        let cfg = Arc::new(test_config());
        let limiter = Arc::new(Mutex::new(RateLimiter::new(
            true,
            1,
            Duration::from_secs(60),
        )));
        let flow = SubmissionFlow::new(
            cfg,
            fx.store.clone(),
            fx.messenger.clone(),
            fx.fetcher.clone(),
            limiter,
        );

        assert!(matches!(
            flow.begin(user).await.unwrap(),
            EntryOutcome::Started { .. }
        ));
        assert!(matches!(
            flow.begin(user).await.unwrap(),
            EntryOutcome::RateLimited { .. }
        ));
    }

    #[tokio::test]
    async fn title_boundary_is_exactly_200_chars() {
        let fx = fixture();
        let user = accepted_user(&fx, 14).await;
        assert!(matches!(
            fx.flow.begin(user).await.unwrap(),
            EntryOutcome::Started { .. }
        ));
        fx.flow.choose_category(user, "Lost pet").await.unwrap();
        fx.flow.choose_district(user, "Central").await.unwrap();

        let too_long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(
            fx.flow.handle_text(user, &too_long).await.unwrap(),
            StepOutcome::Stay { .. }
        ));

        let exactly = "x".repeat(MAX_TITLE_LEN);
        assert!(matches!(
            fx.flow.handle_text(user, &exactly).await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
    }

    #[tokio::test]
    async fn banned_words_and_links_reprompt_without_advancing() {
        let fx = fixture();
        let user = accepted_user(&fx, 15).await;
        fx.flow.begin(user).await.unwrap();
        fx.flow.choose_category(user, "Lost pet").await.unwrap();
        fx.flow.choose_district(user, "Central").await.unwrap();

        assert!(matches!(
            fx.flow.handle_text(user, "buy SPAMWORD now").await.unwrap(),
            StepOutcome::Stay { .. }
        ));
        assert!(matches!(
            fx.flow
                .handle_text(user, "see https://spam.example")
                .await
                .unwrap(),
            StepOutcome::Stay { .. }
        ));
        // Still at the title step.
        assert!(matches!(
            fx.flow.handle_text(user, "A clean title").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_photos_are_dropped_not_stored() {
        let fx = fixture();
        let user = accepted_user(&fx, 16).await;
        advance_to_photos(&fx, user).await;

        // Same pixels behind two different file references.
        fx.fetcher.put("photo-a", seeded_png(7));
        fx.fetcher.put("photo-b", seeded_png(7));
        fx.fetcher.put_seeded("photo-c", 8);

        fx.flow
            .handle_photo(user, FileRef("photo-a".to_string()))
            .await
            .unwrap();
        let dup = fx
            .flow
            .handle_photo(user, FileRef("photo-b".to_string()))
            .await
            .unwrap();
        assert!(matches!(dup, StepOutcome::Stay { ref text } if text.contains("duplicate")));
        fx.flow
            .handle_photo(user, FileRef("photo-c".to_string()))
            .await
            .unwrap();

        fx.flow.handle_text(user, "done").await.unwrap();
        let StepOutcome::Submitted { listing, .. } =
            fx.flow.handle_text(user, "+1-555-0100").await.unwrap()
        else {
            panic!("expected submission");
        };

        let stored = fx.store.get_listing(listing).await.unwrap().unwrap();
        assert_eq!(stored.photos.len(), 2);
        assert_ne!(stored.photos[0].fingerprint, stored.photos[1].fingerprint);
    }

    #[tokio::test]
    async fn done_without_photos_is_blocked() {
        let fx = fixture();
        let user = accepted_user(&fx, 17).await;
        advance_to_photos(&fx, user).await;

        assert!(matches!(
            fx.flow.handle_text(user, "done").await.unwrap(),
            StepOutcome::Stay { .. }
        ));
        // Case-insensitive done-word still requires a photo first.
        assert!(matches!(
            fx.flow.handle_text(user, "DONE").await.unwrap(),
            StepOutcome::Stay { .. }
        ));
    }

    #[tokio::test]
    async fn invalid_choices_reprompt() {
        let fx = fixture();
        let user = accepted_user(&fx, 18).await;
        fx.flow.begin(user).await.unwrap();

        assert!(matches!(
            fx.flow.choose_category(user, "Not a category").await.unwrap(),
            StepOutcome::Stay { .. }
        ));
        fx.flow.choose_category(user, "Lost pet").await.unwrap();
        assert!(matches!(
            fx.flow.choose_district(user, "Atlantis").await.unwrap(),
            StepOutcome::Stay { .. }
        ));
    }

    #[tokio::test]
    async fn out_of_order_input_is_ignored() {
        let fx = fixture();
        let user = accepted_user(&fx, 19).await;
        fx.flow.begin(user).await.unwrap();

        // Draft expects a category; free text and photos do not apply.
        assert_eq!(
            fx.flow.handle_text(user, "some text").await.unwrap(),
            StepOutcome::Ignored
        );
        assert_eq!(
            fx.flow
                .handle_photo(user, FileRef("photo-x".to_string()))
                .await
                .unwrap(),
            StepOutcome::Ignored
        );
        // District before category is also rejected.
        assert_eq!(
            fx.flow.choose_district(user, "Central").await.unwrap(),
            StepOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn restart_discards_prior_draft() {
        let fx = fixture();
        let user = accepted_user(&fx, 20).await;
        fx.flow.begin(user).await.unwrap();
        fx.flow.choose_category(user, "Lost pet").await.unwrap();

        // A fresh /add returns the flow to the category step.
        fx.flow.begin(user).await.unwrap();
        assert_eq!(
            fx.flow.choose_district(user, "Central").await.unwrap(),
            StepOutcome::Ignored
        );
        assert!(matches!(
            fx.flow.choose_category(user, "Found pet").await.unwrap(),
            StepOutcome::Advanced { .. }
        ));
    }

    #[tokio::test]
    async fn moderation_notify_failure_keeps_listing_queued() {
        let fx = fixture();
        let user = accepted_user(&fx, 21).await;
        advance_to_photos(&fx, user).await;

        fx.fetcher.put_seeded("photo-1", 3);
        fx.flow
            .handle_photo(user, FileRef("photo-1".to_string()))
            .await
            .unwrap();
        fx.flow.handle_text(user, "done").await.unwrap();

        fx.messenger
            .fail_dest(DestId(-1000), crate::testing::FailMode::Forbidden);

        let StepOutcome::Submitted {
            listing,
            moderation_notified,
        } = fx.flow.handle_text(user, "+1-555-0100").await.unwrap()
        else {
            panic!("expected submission");
        };

        assert!(!moderation_notified);
        let stored = fx.store.get_listing(listing).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Queued);
        assert_eq!(fx.store.queue_oldest(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gallery_is_capped_at_the_batch_limit() {
        let fx = fixture();
        let user = accepted_user(&fx, 22).await;
        advance_to_photos(&fx, user).await;

        for i in 0..15u8 {
            let name = format!("photo-{i}");
            fx.fetcher.put_seeded(&name, i);
            fx.flow.handle_photo(user, FileRef(name)).await.unwrap();
        }
        fx.flow.handle_text(user, "done").await.unwrap();
        fx.flow.handle_text(user, "+1-555-0100").await.unwrap();

        let batches: Vec<_> = fx
            .messenger
            .sent_to(DestId(-1000))
            .into_iter()
            .filter_map(|s| match s {
                Sent::Batch { photos, .. } => Some(photos),
                _ => None,
            })
            .collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), MEDIA_BATCH_LIMIT);
    }
}
