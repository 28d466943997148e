use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{
    ads, blocks, dislike_states, entitlements, likes, matches, moderation_items,
    payment_transactions, profiles, quota_daily, reports, swipes, users,
};

// --- User ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub external_id: i64,
    pub username: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Profile ---

#[derive(Debug, Clone, Queryable, Selectable, QueryableByName, Serialize)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub user_id: i64,
    pub display_name: String,
    pub birthdate: Option<NaiveDate>,
    pub gender: String,
    pub looking_for: String,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub height_cm: Option<i32>,
    pub eye_color: Option<String>,
    pub zodiac: String,
    pub languages: Vec<String>,
    pub goals: Vec<String>,
    pub city_id: String,
    pub city: String,
    #[serde(skip_serializing)]
    pub last_lat: Option<f64>,
    #[serde(skip_serializing)]
    pub last_lon: Option<f64>,
    #[serde(skip_serializing)]
    pub last_geo_at: Option<DateTime<Utc>>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub radius_km: Option<i32>,
    pub moderation_status: String,
    pub approved: bool,
    pub reports_count: i32,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by a profile-core submission.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = profiles)]
#[diesel(treat_none_as_null = true)]
pub struct ProfileCoreChanges {
    pub display_name: String,
    pub birthdate: Option<NaiveDate>,
    pub gender: String,
    pub looking_for: String,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub height_cm: Option<i32>,
    pub eye_color: Option<String>,
    pub zodiac: String,
    pub languages: Vec<String>,
    pub goals: Vec<String>,
    pub city_id: String,
    pub city: String,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub radius_km: Option<i32>,
}

// --- Swipe ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwipeAction {
    Like,
    Superlike,
    Dislike,
}

impl SwipeAction {
    /// Accepts any case and ignores underscores: `super_like` is `SUPERLIKE`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "LIKE" => Some(Self::Like),
            "SUPERLIKE" => Some(Self::Superlike),
            "DISLIKE" => Some(Self::Dislike),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Superlike => "SUPERLIKE",
            Self::Dislike => "DISLIKE",
        }
    }

    pub fn is_like(&self) -> bool {
        matches!(self, Self::Like | Self::Superlike)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = swipes)]
pub struct Swipe {
    pub id: i64,
    pub actor_user_id: i64,
    pub target_user_id: i64,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

impl Swipe {
    pub fn swipe_action(&self) -> Option<SwipeAction> {
        SwipeAction::parse(&self.action)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = swipes)]
pub struct NewSwipe<'a> {
    pub actor_user_id: i64,
    pub target_user_id: i64,
    pub action: &'a str,
    pub created_at: DateTime<Utc>,
}

// --- Like ---

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = likes)]
pub struct Like {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub is_super_like: bool,
    pub created_at: DateTime<Utc>,
}

// --- Match ---

pub const MATCH_ACTIVE: &str = "active";
pub const MATCH_REMOVED: &str = "removed";

/// Canonically ordered pair: `user_a_id < user_b_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchPair {
    pub user_a_id: i64,
    pub user_b_id: i64,
}

impl MatchPair {
    pub fn new(x: i64, y: i64) -> Self {
        Self {
            user_a_id: x.min(y),
            user_b_id: x.max(y),
        }
    }

    pub fn other(&self, user_id: i64) -> i64 {
        if user_id == self.user_a_id {
            self.user_b_id
        } else {
            self.user_a_id
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: i64,
    pub user_a_id: i64,
    pub user_b_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn pair(&self) -> MatchPair {
        MatchPair::new(self.user_a_id, self.user_b_id)
    }
}

// --- DislikeState ---

/// How long a first dislike hides the target.
pub const DISLIKE_HIDE_HOURS: i64 = 24;

#[derive(Debug, Clone, Queryable, Selectable, QueryableByName, Insertable, Serialize)]
#[diesel(table_name = dislike_states)]
pub struct DislikeState {
    pub actor_user_id: i64,
    pub target_user_id: i64,
    pub dislike_count: i32,
    pub hide_until: Option<DateTime<Utc>>,
    pub never_show: bool,
    pub until_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DislikeState {
    pub fn hides_at(&self, now: DateTime<Utc>) -> bool {
        self.never_show || self.hide_until.or(self.until_at).map_or(false, |t| t > now)
    }
}

// --- Block / Report ---

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub actor_user_id: i64,
    pub target_user_id: i64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = reports)]
pub struct Report {
    pub id: i64,
    pub reporter_user_id: i64,
    pub target_user_id: i64,
    pub reason: String,
    pub details: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport<'a> {
    pub reporter_user_id: i64,
    pub target_user_id: i64,
    pub reason: &'a str,
    pub details: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

// --- Quota ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = quota_daily)]
pub struct QuotaDaily {
    pub user_id: i64,
    pub day_key: NaiveDate,
    pub tz_name: String,
    pub likes_used: i32,
    pub rewind_used: i32,
    pub updated_at: DateTime<Utc>,
}

// --- Entitlement ---

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize)]
#[diesel(table_name = entitlements)]
#[diesel(treat_none_as_null = true)]
pub struct Entitlement {
    pub user_id: i64,
    pub plus_expires_at: Option<DateTime<Utc>>,
    pub boost_until: Option<DateTime<Utc>>,
    pub incognito_until: Option<DateTime<Utc>>,
    pub superlike_credits: i32,
    pub reveal_credits: i32,
    pub like_tokens: i32,
    pub message_wo_match_credits: i32,
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    pub fn empty(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plus_expires_at: None,
            boost_until: None,
            incognito_until: None,
            superlike_credits: 0,
            reveal_credits: 0,
            like_tokens: 0,
            message_wo_match_credits: 0,
            updated_at: now,
        }
    }

    pub fn is_plus(&self, now: DateTime<Utc>) -> bool {
        self.plus_expires_at.map_or(false, |t| t > now)
    }

    pub fn is_boosted(&self, now: DateTime<Utc>) -> bool {
        self.boost_until.map_or(false, |t| t > now)
    }
}

// --- Payments ---

pub const PAYMENT_PENDING: &str = "PENDING";
pub const PAYMENT_SUCCEEDED: &str = "SUCCEEDED";

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = payment_transactions)]
pub struct PaymentTransaction {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub provider_event_id: Option<String>,
    pub idempotency_key: String,
    pub amount: i64,
    pub currency: String,
    pub product_sku: String,
    pub status: String,
    pub result_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_transactions)]
pub struct NewPaymentTransaction {
    pub user_id: i64,
    pub provider: String,
    pub idempotency_key: String,
    pub amount: i64,
    pub currency: String,
    pub product_sku: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Moderation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

pub const TARGET_PROFILE: &str = "profile";
pub const TARGET_MEDIA: &str = "media";

#[derive(Debug, Clone, Queryable, Selectable, QueryableByName, Serialize)]
#[diesel(table_name = moderation_items)]
pub struct ModerationItem {
    pub id: i64,
    pub user_id: i64,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub status: String,
    pub reason_code: Option<String>,
    pub reason_text: Option<String>,
    pub required_fix_step: Option<String>,
    pub eta_bucket: String,
    pub moderator_actor_id: Option<i64>,
    pub locked_by: Option<i64>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationItem {
    pub fn moderation_status(&self) -> Option<ModerationStatus> {
        ModerationStatus::parse(&self.status)
    }

    /// Held by someone other than `actor` with time left on the lease.
    pub fn leased_by_other(&self, actor: i64, now: DateTime<Utc>) -> bool {
        match (self.locked_by, self.locked_until) {
            (Some(holder), Some(until)) => holder != actor && until > now,
            _ => false,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = moderation_items)]
pub struct NewModerationItem<'a> {
    pub user_id: i64,
    pub target_type: &'a str,
    pub target_id: Option<i64>,
    pub status: &'a str,
    pub eta_bucket: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Ads ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = ads)]
pub struct Ad {
    pub id: i64,
    pub city_id: String,
    pub title: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub link_url: String,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(skip_serializing)]
    pub priority: i32,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}
