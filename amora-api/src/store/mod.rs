//! Storage capabilities, one trait per entity family. `PgConnection`
//! implements all of them (see `pg`); services are generic over the subset
//! they need so a single transaction can span several stores.

use chrono::{DateTime, NaiveDate, Utc};

use amora_shared::errors::AppResult;

use crate::models::{
    Ad, DislikeState, Entitlement, Like, Match, MatchPair, ModerationItem, ModerationStatus,
    NewPaymentTransaction, PaymentTransaction, Profile, ProfileCoreChanges, QuotaDaily, Report,
    Swipe, SwipeAction, User,
};
use crate::services::cursor::FeedCursor;
use crate::services::day::DayKey;
use crate::services::moderation::EtaBucket;

pub mod pg;

/// Runs `f` atomically: every write inside commits together or not at all.
pub trait Transactional {
    fn in_transaction<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Self) -> AppResult<T>;
}

pub trait UserStore {
    /// Creates the user on first login; refreshes the username afterwards.
    fn upsert_telegram_user(
        &mut self,
        external_id: i64,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<User>;
    fn find_user(&mut self, user_id: i64) -> AppResult<Option<User>>;
}

pub trait ProfileStore {
    fn find_profile(&mut self, user_id: i64) -> AppResult<Option<Profile>>;
    /// Upserts the core and puts the profile back into review.
    fn save_profile_core(
        &mut self,
        user_id: i64,
        core: &ProfileCoreChanges,
        now: DateTime<Utc>,
    ) -> AppResult<Profile>;
    fn save_location(&mut self, user_id: i64, lat: f64, lon: f64, now: DateTime<Utc>) -> AppResult<()>;
    fn clear_stale_locations(&mut self, older_than: DateTime<Utc>) -> AppResult<usize>;
    /// Keeps `approved` and `moderation_status` in step.
    fn set_moderation_outcome(
        &mut self,
        user_id: i64,
        status: ModerationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
}

pub trait EntitlementStore {
    fn entitlement(&mut self, user_id: i64) -> AppResult<Option<Entitlement>>;
    /// Takes one super-like credit and one like-token together; false when either is zero.
    fn consume_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool>;
    fn refund_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<()>;
    fn consume_reveal_credit(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool>;
    /// Returns the row, created empty if missing, locked for the rest of the transaction.
    fn lock_entitlement(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<Entitlement>;
    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    Used(i32),
    LimitReached,
}

pub trait QuotaStore {
    fn consume_like_with_limit(
        &mut self,
        user_id: i64,
        day: &DayKey,
        limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Consumed>;
    /// Saturates at zero.
    fn refund_like(&mut self, user_id: i64, day_key: NaiveDate, now: DateTime<Utc>) -> AppResult<()>;
    fn consume_rewind_with_limit(
        &mut self,
        user_id: i64,
        day: &DayKey,
        limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Consumed>;
    fn quota_usage(&mut self, user_id: i64, day_key: NaiveDate) -> AppResult<Option<QuotaDaily>>;
}

pub trait SwipeStore {
    fn create_swipe(
        &mut self,
        actor: i64,
        target: i64,
        action: SwipeAction,
        now: DateTime<Utc>,
    ) -> AppResult<Swipe>;
    fn last_swipe_by_actor(&mut self, actor: i64) -> AppResult<Option<Swipe>>;
    fn delete_swipe(&mut self, swipe_id: i64) -> AppResult<()>;
}

pub trait LikeStore {
    /// `is_super_like` only ever flips false -> true.
    fn upsert_like(
        &mut self,
        from: i64,
        to: i64,
        is_super_like: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Like>;
    fn find_like(&mut self, from: i64, to: i64) -> AppResult<Option<Like>>;
    fn delete_like(&mut self, from: i64, to: i64) -> AppResult<bool>;
}

pub trait MatchStore {
    /// True iff a row was created, or a removed row brought back to active.
    fn create_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool>;
    fn delete_match(&mut self, pair: MatchPair) -> AppResult<bool>;
    fn remove_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool>;
    fn list_active_matches(&mut self, user_id: i64, limit: i64, offset: i64) -> AppResult<Vec<Match>>;
}

pub trait DislikeStore {
    fn record_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<DislikeState>;
    /// Steps the state back by one dislike; `None` when the row is gone.
    fn undo_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<Option<DislikeState>>;
}

pub trait SafetyStore {
    fn upsert_block(
        &mut self,
        actor: i64,
        target: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
    fn create_report(
        &mut self,
        reporter: i64,
        target: i64,
        reason: &str,
        details: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Report>;
    fn increment_reports_count(&mut self, target: i64) -> AppResult<()>;
}

/// Looking-for values that accept anyone.
pub const OPEN_PREFERENCES: [&str; 4] = ["all", "any", "unknown", ""];

/// The lowercased gender, or `None` for an open preference.
pub fn concrete_gender(raw: &str) -> Option<String> {
    let gender = raw.trim().to_lowercase();
    (!OPEN_PREFERENCES.contains(&gender.as_str())).then_some(gender)
}

/// Who is looking at the feed and what they are looking for.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub user_id: i64,
    pub city_id: String,
    /// Viewer's own gender; candidates must accept it.
    pub own_gender: String,
    /// Gender the viewer is looking for; candidates must have it.
    pub wanted_gender: String,
    pub goals: Vec<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub radius_km: Option<i32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ViewerContext {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id,
            city_id: profile.city_id.clone(),
            own_gender: profile.gender.clone(),
            wanted_gender: profile.looking_for.clone(),
            goals: profile.goals.clone(),
            age_min: profile.age_min,
            age_max: profile.age_max,
            radius_km: profile.radius_km,
            lat: profile.last_lat,
            lon: profile.last_lon,
        }
    }
}

/// Normalized listing parameters.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub now: DateTime<Utc>,
    pub age_min: i32,
    pub age_max: i32,
    pub radius_km: i32,
    pub limit: i64,
    pub cursor: Option<FeedCursor>,
    /// When positive, candidates carry a rank score and boosted ones get this on top.
    pub boost_rank_bonus: f64,
}

impl CandidateQuery {
    /// Ages are measured on the UTC calendar day of `now`.
    pub fn age_reference_day(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: Profile,
    pub goals_priority: i32,
    pub distance_km: Option<f64>,
    pub rank_score: Option<f64>,
}

impl Candidate {
    pub fn cursor(&self) -> FeedCursor {
        FeedCursor {
            priority: self.goals_priority,
            created_at_ms: self.profile.created_at.timestamp_millis(),
            user_id: self.profile.user_id,
        }
    }
}

pub trait FeedRepository {
    fn viewer_context(&mut self, user_id: i64) -> AppResult<Option<ViewerContext>>;
    /// Filtered and ordered by `(goals_priority DESC, created_at DESC, user_id DESC)`,
    /// strictly after `query.cursor`.
    fn list_candidates(&mut self, viewer: &ViewerContext, query: &CandidateQuery) -> AppResult<Vec<Candidate>>;
    /// An approved profile the viewer is allowed to see.
    fn candidate_profile(&mut self, viewer_id: i64, candidate_id: i64) -> AppResult<Option<Profile>>;
}

pub trait AdsStore {
    fn active_ads(&mut self, city_id: &str, limit: i64) -> AppResult<Vec<Ad>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingLike {
    pub from_user_id: i64,
    pub liked_at: DateTime<Utc>,
    pub is_super_like: bool,
}

/// Incoming likes exclude likers that have blocked the recipient.
pub trait LikesInboxStore {
    fn count_incoming(&mut self, user_id: i64) -> AppResult<i64>;
    fn incoming_likes(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<IncomingLike>>;
    fn incoming_profiles(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<Profile>>;
    fn latest_unrevealed(&mut self, user_id: i64) -> AppResult<Option<IncomingLike>>;
    fn mark_revealed(&mut self, user_id: i64, liker_id: i64, now: DateTime<Utc>) -> AppResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve,
    Reject {
        reason_code: String,
        reason_text: String,
        required_fix_step: String,
    },
}

impl Decision {
    pub fn status(&self) -> ModerationStatus {
        match self {
            Decision::Approve => ModerationStatus::Approved,
            Decision::Reject { .. } => ModerationStatus::Rejected,
        }
    }
}

pub trait ModerationStore {
    fn latest_item(&mut self, user_id: i64) -> AppResult<Option<ModerationItem>>;
    fn find_item(&mut self, item_id: i64) -> AppResult<Option<ModerationItem>>;
    fn pending_count(&mut self) -> AppResult<i64>;
    fn enqueue(
        &mut self,
        user_id: i64,
        target_type: &str,
        target_id: Option<i64>,
        eta: EtaBucket,
        now: DateTime<Utc>,
    ) -> AppResult<ModerationItem>;
    /// Oldest PENDING item not leased by someone else, leased to `actor` until `lease_until`.
    fn acquire_next_pending(
        &mut self,
        actor: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>>;
    fn release_lease(&mut self, item_id: i64, actor: i64, now: DateTime<Utc>) -> AppResult<bool>;
    /// Applies the decision to a PENDING item that is unleased, leased by `actor`,
    /// or whose lease ran out. `None` when no such item exists.
    fn decide(
        &mut self,
        item_id: i64,
        actor: i64,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>>;
    fn set_eta_bucket(&mut self, item_id: i64, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<()>;
    fn update_pending_eta(&mut self, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<usize>;
    fn clear_expired_leases(&mut self, now: DateTime<Utc>) -> AppResult<usize>;
}

pub trait PaymentStore {
    fn find_by_idempotency_key(&mut self, provider: &str, key: &str) -> AppResult<Option<PaymentTransaction>>;
    fn find_by_provider_event(&mut self, provider: &str, event_id: &str) -> AppResult<Option<PaymentTransaction>>;
    /// `None` when a transaction with the same `(provider, idempotency_key)` already exists.
    fn insert_pending(&mut self, new: &NewPaymentTransaction) -> AppResult<Option<PaymentTransaction>>;
    /// PENDING -> SUCCEEDED, binding the provider event. `None` if it was not PENDING.
    fn mark_succeeded(
        &mut self,
        transaction_id: i64,
        provider_event_id: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PaymentTransaction>>;
}
