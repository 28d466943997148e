//! In-memory stand-ins for Postgres, Redis and the broker. They follow the
//! SQL and Lua semantics closely enough for service tests: transactions roll
//! back on error, windows expire on a settable clock, and the risk math is
//! the scripts' math.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::Event;

use crate::events::EventSink;
use crate::kv::{
    CounterStore, KvResult, RateWindowStore, RiskState, RiskStore, SessionRecord, SessionStore,
    Violation, WindowState,
};
use crate::models::{
    Ad, Block, DislikeState, Entitlement, Like, Match, MatchPair, ModerationItem, ModerationStatus,
    NewPaymentTransaction, PaymentTransaction, Profile, ProfileCoreChanges, QuotaDaily, Report,
    Swipe, SwipeAction, User, DISLIKE_HIDE_HOURS, MATCH_ACTIVE, MATCH_REMOVED, PAYMENT_PENDING,
    PAYMENT_SUCCEEDED,
};
use crate::services::day::DayKey;
use crate::services::moderation::EtaBucket;
use crate::services::profile::{age_years, haversine_km};
use crate::services::risk;
use crate::store::{
    concrete_gender, AdsStore, Candidate, CandidateQuery, Consumed, Decision, DislikeStore,
    EntitlementStore, FeedRepository, IncomingLike, LikeStore, LikesInboxStore, MatchStore,
    ModerationStore, PaymentStore, ProfileStore, QuotaStore, SafetyStore, SwipeStore,
    Transactional, UserStore, ViewerContext, OPEN_PREFERENCES,
};

/// Creation time of seeded rows unless a test overrides it.
pub fn seeded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, Default)]
struct Tables {
    seq: i64,
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, Profile>,
    entitlements: BTreeMap<i64, Entitlement>,
    quota: BTreeMap<(i64, NaiveDate), QuotaDaily>,
    swipes: Vec<Swipe>,
    likes: BTreeMap<(i64, i64), Like>,
    matches: Vec<Match>,
    dislikes: BTreeMap<(i64, i64), DislikeState>,
    blocks: BTreeMap<(i64, i64), Block>,
    reports: Vec<Report>,
    reveals: BTreeSet<(i64, i64)>,
    ads: Vec<Ad>,
    moderation: Vec<ModerationItem>,
    payments: Vec<PaymentTransaction>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn blocked(&self, actor: i64, target: i64) -> bool {
        self.blocks.contains_key(&(actor, target))
    }

    fn visible_incoming(&self, user_id: i64) -> Vec<IncomingLike> {
        let mut rows: Vec<IncomingLike> = self
            .likes
            .values()
            .filter(|l| l.to_user_id == user_id && !self.blocked(l.from_user_id, user_id))
            .map(|l| IncomingLike {
                from_user_id: l.from_user_id,
                liked_at: l.created_at,
                is_super_like: l.is_super_like,
            })
            .collect();
        rows.sort_by(|a, b| (b.liked_at, b.from_user_id).cmp(&(a.liked_at, a.from_user_id)));
        rows
    }
}

/// Every storage trait over plain maps.
#[derive(Debug, Default)]
pub struct MemoryDb {
    t: Tables,
}

pub fn default_profile(user_id: i64) -> Profile {
    Profile {
        user_id,
        display_name: format!("user{user_id}"),
        birthdate: NaiveDate::from_ymd_opt(1995, 1, 1),
        gender: "female".into(),
        looking_for: "all".into(),
        occupation: None,
        education: None,
        height_cm: None,
        eye_color: None,
        zodiac: "capricorn".into(),
        languages: Vec::new(),
        goals: Vec::new(),
        city_id: "minsk".into(),
        city: "Minsk".into(),
        last_lat: None,
        last_lon: None,
        last_geo_at: None,
        age_min: None,
        age_max: None,
        radius_km: None,
        moderation_status: ModerationStatus::Approved.as_str().into(),
        approved: true,
        reports_count: 0,
        profile_completed: true,
        created_at: seeded_at(),
        updated_at: seeded_at(),
    }
}

fn apply_core(profile: &mut Profile, core: &ProfileCoreChanges) {
    profile.display_name = core.display_name.clone();
    profile.birthdate = core.birthdate;
    profile.gender = core.gender.clone();
    profile.looking_for = core.looking_for.clone();
    profile.occupation = core.occupation.clone();
    profile.education = core.education.clone();
    profile.height_cm = core.height_cm;
    profile.eye_color = core.eye_color.clone();
    profile.zodiac = core.zodiac.clone();
    profile.languages = core.languages.clone();
    profile.goals = core.goals.clone();
    profile.city_id = core.city_id.clone();
    profile.city = core.city.clone();
    profile.age_min = core.age_min;
    profile.age_max = core.age_max;
    profile.radius_km = core.radius_km;
}

impl MemoryDb {
    pub fn seed_user(&mut self, user_id: i64) -> User {
        let user = User {
            id: user_id,
            external_id: user_id,
            username: None,
            role: "USER".into(),
            created_at: seeded_at(),
            updated_at: seeded_at(),
        };
        self.t.users.insert(user_id, user.clone());
        user
    }

    /// Approved, completed profile in Minsk; `edit` runs on the existing row
    /// when the id is already seeded.
    pub fn seed_profile<F>(&mut self, user_id: i64, edit: F)
    where
        F: FnOnce(&mut Profile),
    {
        let profile = self
            .t
            .profiles
            .entry(user_id)
            .or_insert_with(|| default_profile(user_id));
        edit(profile);
    }

    pub fn profile(&self, user_id: i64) -> Option<Profile> {
        self.t.profiles.get(&user_id).cloned()
    }

    pub fn seed_ad(&mut self, city_id: &str, title: &str, priority: i32) -> Ad {
        let ad = Ad {
            id: self.t.next_id(),
            city_id: city_id.into(),
            title: title.into(),
            body: None,
            image_url: None,
            link_url: "https://ads.example/landing".into(),
            active: true,
            priority,
            created_at: seeded_at(),
        };
        self.t.ads.push(ad.clone());
        ad
    }

    pub fn seed_block(&mut self, actor: i64, target: i64) {
        self.t.blocks.insert(
            (actor, target),
            Block { actor_user_id: actor, target_user_id: target, reason: None, created_at: seeded_at() },
        );
    }

    pub fn has_block(&self, actor: i64, target: i64) -> bool {
        self.t.blocked(actor, target)
    }

    pub fn seed_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> DislikeState {
        let state = next_dislike(self.t.dislikes.get(&(actor, target)), actor, target, now);
        self.t.dislikes.insert((actor, target), state.clone());
        state
    }

    pub fn dislike(&self, actor: i64, target: i64) -> Option<DislikeState> {
        self.t.dislikes.get(&(actor, target)).cloned()
    }

    pub fn grant_plus(&mut self, user_id: i64, until: DateTime<Utc>) {
        self.seed_entitlement(user_id, |e| e.plus_expires_at = Some(until));
    }

    pub fn seed_entitlement<F>(&mut self, user_id: i64, edit: F)
    where
        F: FnOnce(&mut Entitlement),
    {
        let ent = self
            .t
            .entitlements
            .entry(user_id)
            .or_insert_with(|| Entitlement::empty(user_id, seeded_at()));
        edit(ent);
    }

    /// The stored row, or an empty one when the user never had any.
    pub fn entitlement_of(&self, user_id: i64) -> Entitlement {
        self.t
            .entitlements
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Entitlement::empty(user_id, seeded_at()))
    }

    pub fn match_count(&self) -> usize {
        self.t.matches.len()
    }

    pub fn match_for(&self, pair: MatchPair) -> Option<Match> {
        self.t.matches.iter().find(|m| m.pair() == pair).cloned()
    }
}

impl Transactional for MemoryDb {
    fn in_transaction<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Self) -> AppResult<T>,
    {
        let snapshot = self.t.clone();
        let result = f(self);
        if result.is_err() {
            self.t = snapshot;
        }
        result
    }
}

impl UserStore for MemoryDb {
    fn upsert_telegram_user(&mut self, external_id: i64, username: Option<&str>, now: DateTime<Utc>) -> AppResult<User> {
        if let Some(user) = self.t.users.values_mut().find(|u| u.external_id == external_id) {
            user.username = username.map(str::to_string);
            user.updated_at = now;
            return Ok(user.clone());
        }
        let user = User {
            id: self.t.next_id(),
            external_id,
            username: username.map(str::to_string),
            role: "USER".into(),
            created_at: now,
            updated_at: now,
        };
        self.t.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_user(&mut self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.t.users.get(&user_id).cloned())
    }
}

impl ProfileStore for MemoryDb {
    fn find_profile(&mut self, user_id: i64) -> AppResult<Option<Profile>> {
        Ok(self.t.profiles.get(&user_id).cloned())
    }

    fn save_profile_core(&mut self, user_id: i64, core: &ProfileCoreChanges, now: DateTime<Utc>) -> AppResult<Profile> {
        let profile = self.t.profiles.entry(user_id).or_insert_with(|| {
            let mut fresh = default_profile(user_id);
            fresh.created_at = now;
            fresh
        });
        apply_core(profile, core);
        profile.moderation_status = ModerationStatus::Pending.as_str().into();
        profile.approved = false;
        profile.profile_completed = true;
        profile.updated_at = now;
        Ok(profile.clone())
    }

    fn save_location(&mut self, user_id: i64, lat: f64, lon: f64, now: DateTime<Utc>) -> AppResult<()> {
        let profile = self
            .t
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("profile not found"))?;
        profile.last_lat = Some(lat);
        profile.last_lon = Some(lon);
        profile.last_geo_at = Some(now);
        profile.updated_at = now;
        Ok(())
    }

    fn clear_stale_locations(&mut self, older_than: DateTime<Utc>) -> AppResult<usize> {
        let mut cleared = 0;
        for profile in self.t.profiles.values_mut() {
            if profile.last_geo_at.is_some_and(|at| at < older_than) {
                profile.last_lat = None;
                profile.last_lon = None;
                profile.last_geo_at = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn set_moderation_outcome(&mut self, user_id: i64, status: ModerationStatus, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(profile) = self.t.profiles.get_mut(&user_id) {
            profile.moderation_status = status.as_str().into();
            profile.approved = status == ModerationStatus::Approved;
            profile.updated_at = now;
        }
        Ok(())
    }
}

impl EntitlementStore for MemoryDb {
    fn entitlement(&mut self, user_id: i64) -> AppResult<Option<Entitlement>> {
        Ok(self.t.entitlements.get(&user_id).cloned())
    }

    fn consume_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
        match self.t.entitlements.get_mut(&user_id) {
            Some(e) if e.superlike_credits >= 1 && e.like_tokens >= 1 => {
                e.superlike_credits -= 1;
                e.like_tokens -= 1;
                e.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn refund_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        let e = self
            .t
            .entitlements
            .entry(user_id)
            .or_insert_with(|| Entitlement::empty(user_id, now));
        e.superlike_credits += 1;
        e.like_tokens += 1;
        e.updated_at = now;
        Ok(())
    }

    fn consume_reveal_credit(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
        match self.t.entitlements.get_mut(&user_id) {
            Some(e) if e.reveal_credits >= 1 => {
                e.reveal_credits -= 1;
                e.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn lock_entitlement(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<Entitlement> {
        Ok(self
            .t
            .entitlements
            .entry(user_id)
            .or_insert_with(|| Entitlement::empty(user_id, now))
            .clone())
    }

    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()> {
        if let Some(row) = self.t.entitlements.get_mut(&entitlement.user_id) {
            *row = entitlement.clone();
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Counter {
    Likes,
    Rewinds,
}

impl MemoryDb {
    fn consume_daily(&mut self, counter: Counter, user_id: i64, day: &DayKey, limit: i32, now: DateTime<Utc>) -> Consumed {
        if limit <= 0 {
            return Consumed::LimitReached;
        }
        let row = self.t.quota.entry((user_id, day.day)).or_insert_with(|| QuotaDaily {
            user_id,
            day_key: day.day,
            tz_name: day.tz_name.clone(),
            likes_used: 0,
            rewind_used: 0,
            updated_at: now,
        });
        let used = match counter {
            Counter::Likes => &mut row.likes_used,
            Counter::Rewinds => &mut row.rewind_used,
        };
        if *used >= limit {
            return Consumed::LimitReached;
        }
        *used += 1;
        let value = *used;
        row.updated_at = now;
        Consumed::Used(value)
    }
}

impl QuotaStore for MemoryDb {
    fn consume_like_with_limit(&mut self, user_id: i64, day: &DayKey, limit: i32, now: DateTime<Utc>) -> AppResult<Consumed> {
        Ok(self.consume_daily(Counter::Likes, user_id, day, limit, now))
    }

    fn refund_like(&mut self, user_id: i64, day_key: NaiveDate, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(row) = self.t.quota.get_mut(&(user_id, day_key)) {
            if row.likes_used > 0 {
                row.likes_used -= 1;
                row.updated_at = now;
            }
        }
        Ok(())
    }

    fn consume_rewind_with_limit(&mut self, user_id: i64, day: &DayKey, limit: i32, now: DateTime<Utc>) -> AppResult<Consumed> {
        Ok(self.consume_daily(Counter::Rewinds, user_id, day, limit, now))
    }

    fn quota_usage(&mut self, user_id: i64, day_key: NaiveDate) -> AppResult<Option<QuotaDaily>> {
        Ok(self.t.quota.get(&(user_id, day_key)).cloned())
    }
}

impl SwipeStore for MemoryDb {
    fn create_swipe(&mut self, actor: i64, target: i64, action: SwipeAction, now: DateTime<Utc>) -> AppResult<Swipe> {
        let swipe = Swipe {
            id: self.t.next_id(),
            actor_user_id: actor,
            target_user_id: target,
            action: action.as_str().into(),
            created_at: now,
        };
        self.t.swipes.push(swipe.clone());
        Ok(swipe)
    }

    fn last_swipe_by_actor(&mut self, actor: i64) -> AppResult<Option<Swipe>> {
        Ok(self
            .t
            .swipes
            .iter()
            .filter(|s| s.actor_user_id == actor)
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    fn delete_swipe(&mut self, swipe_id: i64) -> AppResult<()> {
        self.t.swipes.retain(|s| s.id != swipe_id);
        Ok(())
    }
}

impl LikeStore for MemoryDb {
    fn upsert_like(&mut self, from: i64, to: i64, is_super_like: bool, now: DateTime<Utc>) -> AppResult<Like> {
        let like = self.t.likes.entry((from, to)).or_insert_with(|| Like {
            from_user_id: from,
            to_user_id: to,
            is_super_like: false,
            created_at: now,
        });
        like.is_super_like |= is_super_like;
        Ok(like.clone())
    }

    fn find_like(&mut self, from: i64, to: i64) -> AppResult<Option<Like>> {
        Ok(self.t.likes.get(&(from, to)).cloned())
    }

    fn delete_like(&mut self, from: i64, to: i64) -> AppResult<bool> {
        Ok(self.t.likes.remove(&(from, to)).is_some())
    }
}

impl MatchStore for MemoryDb {
    fn create_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool> {
        if let Some(existing) = self.t.matches.iter_mut().find(|m| m.pair() == pair) {
            if existing.status == MATCH_REMOVED {
                existing.status = MATCH_ACTIVE.into();
                existing.updated_at = now;
                return Ok(true);
            }
            return Ok(false);
        }
        let id = self.t.next_id();
        self.t.matches.push(Match {
            id,
            user_a_id: pair.user_a_id,
            user_b_id: pair.user_b_id,
            status: MATCH_ACTIVE.into(),
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    fn delete_match(&mut self, pair: MatchPair) -> AppResult<bool> {
        let before = self.t.matches.len();
        self.t.matches.retain(|m| m.pair() != pair);
        Ok(self.t.matches.len() < before)
    }

    fn remove_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool> {
        match self.t.matches.iter_mut().find(|m| m.pair() == pair && m.status == MATCH_ACTIVE) {
            Some(m) => {
                m.status = MATCH_REMOVED.into();
                m.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_active_matches(&mut self, user_id: i64, limit: i64, offset: i64) -> AppResult<Vec<Match>> {
        let mut rows: Vec<Match> = self
            .t
            .matches
            .iter()
            .filter(|m| (m.user_a_id == user_id || m.user_b_id == user_id) && m.status == MATCH_ACTIVE)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

fn next_dislike(current: Option<&DislikeState>, actor: i64, target: i64, now: DateTime<Utc>) -> DislikeState {
    let hide_until = now + Duration::hours(DISLIKE_HIDE_HOURS);
    match current {
        None => DislikeState {
            actor_user_id: actor,
            target_user_id: target,
            dislike_count: 1,
            hide_until: Some(hide_until),
            never_show: false,
            until_at: Some(hide_until),
            updated_at: now,
        },
        Some(state) => {
            let count = state.dislike_count + 1;
            let permanent = count >= 2;
            DislikeState {
                dislike_count: count,
                never_show: state.never_show || permanent,
                hide_until: (!permanent).then_some(hide_until),
                until_at: (!permanent).then_some(hide_until),
                updated_at: now,
                ..state.clone()
            }
        }
    }
}

impl DislikeStore for MemoryDb {
    fn record_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<DislikeState> {
        Ok(self.seed_dislike(actor, target, now))
    }

    fn undo_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<Option<DislikeState>> {
        let Some(current) = self.t.dislikes.get_mut(&(actor, target)) else {
            return Ok(None);
        };
        if current.dislike_count <= 1 {
            self.t.dislikes.remove(&(actor, target));
            return Ok(None);
        }
        current.dislike_count -= 1;
        if current.dislike_count == 1 {
            let hide_until = now + Duration::hours(DISLIKE_HIDE_HOURS);
            current.never_show = false;
            current.hide_until = Some(hide_until);
            current.until_at = Some(hide_until);
        }
        current.updated_at = now;
        Ok(Some(current.clone()))
    }
}

impl SafetyStore for MemoryDb {
    fn upsert_block(&mut self, actor: i64, target: i64, reason: Option<&str>, now: DateTime<Utc>) -> AppResult<()> {
        let block = self.t.blocks.entry((actor, target)).or_insert_with(|| Block {
            actor_user_id: actor,
            target_user_id: target,
            reason: None,
            created_at: now,
        });
        block.reason = reason.map(str::to_string);
        Ok(())
    }

    fn create_report(
        &mut self,
        reporter: i64,
        target: i64,
        reason: &str,
        details: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Report> {
        let report = Report {
            id: self.t.next_id(),
            reporter_user_id: reporter,
            target_user_id: target,
            reason: reason.into(),
            details: details.map(str::to_string),
            status: "OPEN".into(),
            created_at: now,
        };
        self.t.reports.push(report.clone());
        Ok(report)
    }

    fn increment_reports_count(&mut self, target: i64) -> AppResult<()> {
        if let Some(profile) = self.t.profiles.get_mut(&target) {
            profile.reports_count += 1;
        }
        Ok(())
    }
}

impl FeedRepository for MemoryDb {
    fn viewer_context(&mut self, user_id: i64) -> AppResult<Option<ViewerContext>> {
        Ok(self.t.profiles.get(&user_id).map(ViewerContext::from_profile))
    }

    fn list_candidates(&mut self, viewer: &ViewerContext, query: &CandidateQuery) -> AppResult<Vec<Candidate>> {
        let t = &self.t;
        let today = query.age_reference_day();
        let wanted = concrete_gender(&viewer.wanted_gender);
        let own = concrete_gender(&viewer.own_gender);
        let geo = match (viewer.lat, viewer.lon) {
            (Some(lat), Some(lon)) if query.radius_km > 0 => Some((lat, lon)),
            _ => None,
        };

        let mut out: Vec<Candidate> = t
            .profiles
            .values()
            .filter(|p| p.approved && p.user_id != viewer.user_id)
            .filter(|p| {
                p.birthdate
                    .map(|b| age_years(b, today))
                    .is_some_and(|age| (query.age_min..=query.age_max).contains(&age))
            })
            .filter(|p| viewer.city_id.is_empty() || p.city_id == viewer.city_id)
            .filter(|p| wanted.as_deref().map_or(true, |w| p.gender.to_lowercase() == w))
            .filter(|p| {
                own.as_deref().map_or(true, |o| {
                    let accepts = p.looking_for.to_lowercase();
                    OPEN_PREFERENCES.contains(&accepts.as_str()) || accepts == o
                })
            })
            .filter(|p| !t.blocked(p.user_id, viewer.user_id))
            .filter(|p| {
                t.dislikes.get(&(viewer.user_id, p.user_id)).map_or(true, |d| {
                    !(d.never_show || d.hide_until.or(d.until_at).is_some_and(|h| h > query.now))
                })
            })
            .filter_map(|p| {
                let distance_km = match (geo, p.last_lat, p.last_lon) {
                    (Some((lat, lon)), Some(plat), Some(plon)) => Some(haversine_km(lat, lon, plat, plon)),
                    _ => None,
                };
                if geo.is_some() && !distance_km.is_some_and(|d| d <= f64::from(query.radius_km)) {
                    return None;
                }
                let goals_priority = i32::from(p.goals.iter().any(|g| viewer.goals.contains(g)));
                let rank_score = (query.boost_rank_bonus > 0.0).then(|| {
                    let boosted = t.entitlements.get(&p.user_id).is_some_and(|e| e.is_boosted(query.now));
                    if boosted { 1.0 + query.boost_rank_bonus } else { 1.0 }
                });
                Some(Candidate { profile: p.clone(), goals_priority, distance_km, rank_score })
            })
            .filter(|c| {
                query.cursor.map_or(true, |cur| {
                    cur.precedes(c.goals_priority, c.profile.created_at.timestamp_millis(), c.profile.user_id)
                })
            })
            .collect();

        out.sort_by(|a, b| {
            let key = |c: &Candidate| (c.goals_priority, c.profile.created_at.timestamp_millis(), c.profile.user_id);
            key(b).cmp(&key(a))
        });
        out.truncate(query.limit.max(0) as usize);
        Ok(out)
    }

    fn candidate_profile(&mut self, viewer_id: i64, candidate_id: i64) -> AppResult<Option<Profile>> {
        Ok(self
            .t
            .profiles
            .get(&candidate_id)
            .filter(|p| p.approved && !self.t.blocked(candidate_id, viewer_id))
            .cloned())
    }
}

impl AdsStore for MemoryDb {
    fn active_ads(&mut self, city_id: &str, limit: i64) -> AppResult<Vec<Ad>> {
        let mut ads: Vec<Ad> = self
            .t
            .ads
            .iter()
            .filter(|a| a.active && (a.city_id == city_id || a.city_id.is_empty()))
            .cloned()
            .collect();
        ads.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        ads.truncate(limit.max(0) as usize);
        Ok(ads)
    }
}

impl LikesInboxStore for MemoryDb {
    fn count_incoming(&mut self, user_id: i64) -> AppResult<i64> {
        Ok(self.t.visible_incoming(user_id).len() as i64)
    }

    fn incoming_likes(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<IncomingLike>> {
        let mut rows = self.t.visible_incoming(user_id);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    fn incoming_profiles(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<Profile>> {
        Ok(self
            .t
            .visible_incoming(user_id)
            .iter()
            .filter_map(|l| self.t.profiles.get(&l.from_user_id).cloned())
            .take(limit.max(0) as usize)
            .collect())
    }

    fn latest_unrevealed(&mut self, user_id: i64) -> AppResult<Option<IncomingLike>> {
        Ok(self
            .t
            .visible_incoming(user_id)
            .into_iter()
            .find(|l| !self.t.reveals.contains(&(user_id, l.from_user_id))))
    }

    fn mark_revealed(&mut self, user_id: i64, liker_id: i64, _now: DateTime<Utc>) -> AppResult<()> {
        self.t.reveals.insert((user_id, liker_id));
        Ok(())
    }
}

fn clear_lease(item: &mut ModerationItem) {
    item.locked_by = None;
    item.locked_at = None;
    item.locked_until = None;
}

impl ModerationStore for MemoryDb {
    fn latest_item(&mut self, user_id: i64) -> AppResult<Option<ModerationItem>> {
        Ok(self
            .t
            .moderation
            .iter()
            .filter(|i| i.user_id == user_id)
            .max_by_key(|i| (i.created_at, i.id))
            .cloned())
    }

    fn find_item(&mut self, item_id: i64) -> AppResult<Option<ModerationItem>> {
        Ok(self.t.moderation.iter().find(|i| i.id == item_id).cloned())
    }

    fn pending_count(&mut self) -> AppResult<i64> {
        let pending = ModerationStatus::Pending.as_str();
        Ok(self.t.moderation.iter().filter(|i| i.status == pending).count() as i64)
    }

    fn enqueue(
        &mut self,
        user_id: i64,
        target_type: &str,
        target_id: Option<i64>,
        eta: EtaBucket,
        now: DateTime<Utc>,
    ) -> AppResult<ModerationItem> {
        let item = ModerationItem {
            id: self.t.next_id(),
            user_id,
            target_type: target_type.into(),
            target_id,
            status: ModerationStatus::Pending.as_str().into(),
            reason_code: None,
            reason_text: None,
            required_fix_step: None,
            eta_bucket: eta.as_str().into(),
            moderator_actor_id: None,
            locked_by: None,
            locked_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };
        self.t.moderation.push(item.clone());
        Ok(item)
    }

    fn acquire_next_pending(
        &mut self,
        actor: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>> {
        let pending = ModerationStatus::Pending.as_str();
        let next = self
            .t
            .moderation
            .iter_mut()
            .filter(|i| {
                i.status == pending
                    && (i.locked_until.map_or(true, |u| u <= now) || i.locked_by == Some(actor))
            })
            .min_by_key(|i| (i.created_at, i.id));
        Ok(next.map(|item| {
            item.locked_by = Some(actor);
            item.locked_at = Some(now);
            item.locked_until = Some(lease_until);
            item.updated_at = now;
            item.clone()
        }))
    }

    fn release_lease(&mut self, item_id: i64, actor: i64, now: DateTime<Utc>) -> AppResult<bool> {
        match self.t.moderation.iter_mut().find(|i| i.id == item_id && i.locked_by == Some(actor)) {
            Some(item) => {
                clear_lease(item);
                item.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn decide(
        &mut self,
        item_id: i64,
        actor: i64,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>> {
        let pending = ModerationStatus::Pending.as_str();
        let Some(item) = self.t.moderation.iter_mut().find(|i| {
            i.id == item_id
                && i.status == pending
                && (i.locked_by.is_none()
                    || i.locked_by == Some(actor)
                    || i.locked_until.is_some_and(|u| u <= now))
        }) else {
            return Ok(None);
        };

        item.status = decision.status().as_str().into();
        match decision {
            Decision::Approve => {
                item.reason_code = None;
                item.reason_text = None;
                item.required_fix_step = None;
            }
            Decision::Reject { reason_code, reason_text, required_fix_step } => {
                item.reason_code = Some(reason_code.clone());
                item.reason_text = Some(reason_text.clone());
                item.required_fix_step = Some(required_fix_step.clone());
            }
        }
        item.moderator_actor_id = Some(actor);
        clear_lease(item);
        item.updated_at = now;
        Ok(Some(item.clone()))
    }

    fn set_eta_bucket(&mut self, item_id: i64, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(item) = self.t.moderation.iter_mut().find(|i| i.id == item_id) {
            item.eta_bucket = eta.as_str().into();
            item.updated_at = now;
        }
        Ok(())
    }

    fn update_pending_eta(&mut self, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<usize> {
        let pending = ModerationStatus::Pending.as_str();
        let mut updated = 0;
        for item in self.t.moderation.iter_mut() {
            if item.status == pending && item.eta_bucket != eta.as_str() {
                item.eta_bucket = eta.as_str().into();
                item.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn clear_expired_leases(&mut self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut cleared = 0;
        for item in self.t.moderation.iter_mut() {
            if item.locked_until.is_some_and(|u| u <= now) {
                clear_lease(item);
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

impl PaymentStore for MemoryDb {
    fn find_by_idempotency_key(&mut self, provider: &str, key: &str) -> AppResult<Option<PaymentTransaction>> {
        Ok(self
            .t
            .payments
            .iter()
            .find(|p| p.provider == provider && p.idempotency_key == key)
            .cloned())
    }

    fn find_by_provider_event(&mut self, provider: &str, event_id: &str) -> AppResult<Option<PaymentTransaction>> {
        Ok(self
            .t
            .payments
            .iter()
            .find(|p| p.provider == provider && p.provider_event_id.as_deref() == Some(event_id))
            .cloned())
    }

    fn insert_pending(&mut self, new: &NewPaymentTransaction) -> AppResult<Option<PaymentTransaction>> {
        if self
            .t
            .payments
            .iter()
            .any(|p| p.provider == new.provider && p.idempotency_key == new.idempotency_key)
        {
            return Ok(None);
        }
        let tx = PaymentTransaction {
            id: self.t.next_id(),
            user_id: new.user_id,
            provider: new.provider.clone(),
            provider_event_id: None,
            idempotency_key: new.idempotency_key.clone(),
            amount: new.amount,
            currency: new.currency.clone(),
            product_sku: new.product_sku.clone(),
            status: new.status.clone(),
            result_payload: None,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        self.t.payments.push(tx.clone());
        Ok(Some(tx))
    }

    fn mark_succeeded(
        &mut self,
        transaction_id: i64,
        provider_event_id: &str,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PaymentTransaction>> {
        match self
            .t
            .payments
            .iter_mut()
            .find(|p| p.id == transaction_id && p.status == PAYMENT_PENDING)
        {
            Some(tx) => {
                tx.status = PAYMENT_SUCCEEDED.into();
                tx.provider_event_id = Some(provider_event_id.into());
                tx.result_payload = Some(payload.clone());
                tx.updated_at = now;
                Ok(Some(tx.clone()))
            }
            None => Ok(None),
        }
    }
}

// --- Key-value ---

#[derive(Debug, Default)]
struct KvState {
    clock_ms: i64,
    failing: bool,
    windows: HashMap<String, (i64, i64)>,
    risk: HashMap<i64, RiskState>,
    sessions: HashMap<String, (SessionRecord, i64)>,
    refresh: HashMap<String, (String, i64)>,
    session_refresh: HashMap<String, (String, i64)>,
    user_sessions: HashMap<i64, BTreeSet<String>>,
    counters: HashMap<String, HashMap<String, i64>>,
}

impl KvState {
    fn live<'a, T>(&self, entry: Option<&'a (T, i64)>) -> Option<&'a T> {
        entry.filter(|(_, expires)| *expires > self.clock_ms).map(|(v, _)| v)
    }
}

/// Redis stand-in. Windows and sessions expire against an internal clock
/// moved by `advance`; risk math runs on the caller's `now` like the scripts.
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: Mutex<KvState>,
}

impl MemoryKv {
    pub fn advance(&self, by: Duration) {
        self.lock().clock_ms += by.num_milliseconds();
    }

    /// While set, every call fails like an unreachable server.
    pub fn fail(&self, failing: bool) {
        self.lock().failing = failing;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, KvState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self) -> KvResult<std::sync::MutexGuard<'_, KvState>> {
        let state = self.lock();
        if state.failing {
            return Err(::redis::RedisError::from((::redis::ErrorKind::IoError, "connection refused")));
        }
        Ok(state)
    }
}

#[async_trait]
impl RateWindowStore for MemoryKv {
    async fn allow(&self, key: &str, window_secs: i64) -> KvResult<WindowState> {
        let mut s = self.open()?;
        let now = s.clock_ms;
        let entry = s.windows.entry(key.to_string()).or_insert((0, 0));
        if entry.1 <= now {
            *entry = (0, now + window_secs.max(1) * 1000);
        }
        entry.0 += 1;
        Ok(WindowState { count: entry.0, ttl_ms: entry.1 - now })
    }

    async fn window_state(&self, key: &str) -> KvResult<WindowState> {
        let s = self.open()?;
        Ok(match s.windows.get(key) {
            Some((count, expires)) if *expires > s.clock_ms => WindowState { count: *count, ttl_ms: expires - s.clock_ms },
            _ => WindowState { count: 0, ttl_ms: 0 },
        })
    }
}

#[async_trait]
impl RiskStore for MemoryKv {
    async fn apply_violation(&self, user_id: i64, violation: &Violation) -> KvResult<RiskState> {
        let mut s = self.open()?;
        let current = s.risk.get(&user_id).copied().unwrap_or_default();
        let mut next = current.decayed(violation.now, violation.decay_sec);
        next.risk += violation.weight.max(1);
        let step = risk::cooldown_step(&violation.ladder, next.risk, violation.forced_step);
        next.cooldown_until = next.cooldown_until.max(violation.now + step);
        next.last_violation_at = violation.now;
        s.risk.insert(user_id, next);
        Ok(next)
    }

    async fn apply_decay(&self, user_id: i64, now: i64, decay_sec: i64) -> KvResult<RiskState> {
        let mut s = self.open()?;
        let Some(current) = s.risk.get(&user_id).copied() else {
            return Ok(RiskState::default());
        };
        let next = current.decayed(now, decay_sec);
        s.risk.insert(user_id, next);
        Ok(next)
    }

    async fn risk_states(&self, user_ids: &[i64]) -> KvResult<Vec<RiskState>> {
        let s = self.open()?;
        Ok(user_ids
            .iter()
            .map(|id| s.risk.get(id).copied().unwrap_or_default())
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryKv {
    async fn create_session(&self, record: &SessionRecord, refresh_hash: &str, ttl_secs: i64) -> KvResult<()> {
        let mut s = self.open()?;
        let expires = s.clock_ms + ttl_secs * 1000;
        s.sessions.insert(record.sid.clone(), (record.clone(), expires));
        s.refresh.insert(refresh_hash.to_string(), (record.sid.clone(), expires));
        s.session_refresh.insert(record.sid.clone(), (refresh_hash.to_string(), expires));
        s.user_sessions.entry(record.user_id).or_default().insert(record.sid.clone());
        Ok(())
    }

    async fn find_session(&self, sid: &str) -> KvResult<Option<SessionRecord>> {
        let s = self.open()?;
        Ok(s.live(s.sessions.get(sid)).cloned())
    }

    async fn save_session(&self, record: &SessionRecord, ttl_secs: i64) -> KvResult<()> {
        let mut s = self.open()?;
        let expires = s.clock_ms + ttl_secs * 1000;
        s.sessions.insert(record.sid.clone(), (record.clone(), expires));
        Ok(())
    }

    async fn rotate_refresh(&self, old_hash: &str, new_hash: &str, ttl_secs: i64) -> KvResult<Option<String>> {
        let mut s = self.open()?;
        let Some(sid) = s.live(s.refresh.get(old_hash)).cloned() else {
            return Ok(None);
        };
        s.refresh.remove(old_hash);

        if s.live(s.sessions.get(&sid)).is_none() {
            return Ok(None);
        }
        if let Some(current) = s.live(s.session_refresh.get(&sid)) {
            if current != old_hash {
                return Ok(None);
            }
        }

        let expires = s.clock_ms + ttl_secs * 1000;
        s.refresh.insert(new_hash.to_string(), (sid.clone(), expires));
        s.session_refresh.insert(sid.clone(), (new_hash.to_string(), expires));
        if let Some(session) = s.sessions.get_mut(&sid) {
            session.1 = expires;
        }
        Ok(Some(sid))
    }

    async fn delete_session(&self, sid: &str, user_id: i64) -> KvResult<()> {
        let mut s = self.open()?;
        if let Some((hash, _)) = s.session_refresh.remove(sid) {
            s.refresh.remove(&hash);
        }
        s.sessions.remove(sid);
        if let Some(set) = s.user_sessions.get_mut(&user_id) {
            set.remove(sid);
        }
        Ok(())
    }

    async fn user_sessions(&self, user_id: i64) -> KvResult<Vec<String>> {
        let s = self.open()?;
        Ok(s.user_sessions
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CounterStore for MemoryKv {
    async fn bump_counter(&self, key: &str, field: &str, _ttl_secs: i64) -> KvResult<()> {
        let mut s = self.open()?;
        *s.counters
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn counters(&self, key: &str) -> KvResult<HashMap<String, i64>> {
        let s = self.open()?;
        Ok(s.counters.get(key).cloned().unwrap_or_default())
    }
}

// --- Events ---

/// Keeps every published event for inspection.
#[derive(Debug, Default)]
pub struct CaptureSink {
    events: Mutex<Vec<(String, Event<Value>)>>,
}

impl CaptureSink {
    /// `event_type` of each captured event, in publish order.
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, e)| e.event_type).collect()
    }

    pub fn events(&self) -> Vec<(String, Event<Value>)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for CaptureSink {
    async fn publish(&self, routing_key: &str, event: Event<Value>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((routing_key.to_string(), event));
        }
    }
}
