//! Feed assembly: repository page, shadow demotion, ad injection, cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amora_shared::errors::{AppError, AppResult};

use crate::config::{AdsConfig, AntiAbuseConfig, FeedConfig};
use crate::kv::RiskStore;
use crate::models::Ad;
use crate::services::cursor::FeedCursor;
use crate::services::profile::ProfileCard;
use crate::services::{quota, risk};
use crate::store::{AdsStore, Candidate, CandidateQuery, EntitlementStore, FeedRepository, ViewerContext};

const MAX_ADS_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    Profile(ProfileCard),
    Ad(Ad),
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
}

impl FeedPage {
    fn empty() -> Self {
        Self { items: Vec::new(), next_cursor: None }
    }
}

/// Configuration slices the assembler reads.
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings<'a> {
    pub feed: &'a FeedConfig,
    pub ads: &'a AdsConfig,
    pub antiabuse: &'a AntiAbuseConfig,
}

/// Viewer preferences with defaults filled in and bounds enforced.
pub fn build_query(
    viewer: &ViewerContext,
    params: &FeedParams,
    cfg: &FeedConfig,
    now: DateTime<Utc>,
) -> AppResult<CandidateQuery> {
    let cursor = params
        .cursor
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(FeedCursor::decode)
        .transpose()
        .map_err(|e| AppError::validation(format!("invalid cursor: {e}")))?;

    let age_min = viewer.age_min.unwrap_or(cfg.default_age_min).clamp(18, 99);
    let age_max = viewer.age_max.unwrap_or(cfg.default_age_max).clamp(18, 99).max(age_min);
    let radius_km = viewer
        .radius_km
        .filter(|r| *r > 0)
        .unwrap_or(cfg.default_radius_km)
        .min(cfg.max_radius_km);

    Ok(CandidateQuery {
        now,
        age_min,
        age_max,
        radius_km,
        limit: params.limit.unwrap_or(cfg.default_limit).clamp(1, cfg.max_limit),
        cursor,
        boost_rank_bonus: cfg.boost_rank_bonus,
    })
}

/// Pushes shadow-flagged candidates down. Ranked pages scale the shadow
/// scores by `multiplier` and re-sort stably; unranked pages keep SQL order
/// for everyone else and re-insert one shadow item after every
/// `ceil(1 / (1 - multiplier))` regular items.
pub fn demote_shadow(candidates: Vec<Candidate>, shadow: &[bool], multiplier: f64) -> Vec<Candidate> {
    let ranked = candidates.iter().any(|c| c.rank_score.is_some());
    if !ranked && !shadow.iter().any(|s| *s) {
        return candidates;
    }

    if ranked {
        let mut scored: Vec<(f64, Candidate)> = candidates
            .into_iter()
            .zip(shadow.iter().copied().chain(std::iter::repeat(false)))
            .map(|(c, is_shadow)| {
                let base = c.rank_score.unwrap_or(1.0);
                let score = if is_shadow { base * multiplier } else { base };
                (score, c)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        return scored.into_iter().map(|(_, c)| c).collect();
    }

    let every = (1.0 / (1.0 - multiplier.clamp(0.0, 0.99))).ceil().max(1.0) as usize;
    let (mut regular, mut shadowed) = (Vec::new(), std::collections::VecDeque::new());
    for (c, is_shadow) in candidates.into_iter().zip(shadow.iter().copied().chain(std::iter::repeat(false))) {
        if is_shadow {
            shadowed.push_back(c);
        } else {
            regular.push(c);
        }
    }

    let mut out = Vec::with_capacity(regular.len() + shadowed.len());
    for (i, c) in regular.into_iter().enumerate() {
        out.push(c);
        if (i + 1) % every == 0 {
            if let Some(s) = shadowed.pop_front() {
                out.push(s);
            }
        }
    }
    out.extend(shadowed);
    out
}

/// Inserts one ad after every `every` profiles, cycling through `ads`.
pub fn inject_ads(profiles: Vec<ProfileCard>, ads: &[Ad], every: usize) -> Vec<FeedItem> {
    let mut items = Vec::with_capacity(profiles.len() + ads.len());
    let mut next_ad = 0;
    for (i, card) in profiles.into_iter().enumerate() {
        items.push(FeedItem::Profile(card));
        if every > 0 && !ads.is_empty() && (i + 1) % every == 0 {
            items.push(FeedItem::Ad(ads[next_ad % ads.len()].clone()));
            next_ad += 1;
        }
    }
    items
}

pub async fn feed_page<C, K>(
    conn: &mut C,
    kv: &K,
    viewer_id: i64,
    params: &FeedParams,
    settings: FeedSettings<'_>,
    now: DateTime<Utc>,
) -> AppResult<FeedPage>
where
    C: FeedRepository + AdsStore + EntitlementStore + Send,
    K: RiskStore + ?Sized,
{
    let Some(viewer) = conn.viewer_context(viewer_id)? else {
        return Ok(FeedPage::empty());
    };
    if viewer.city_id.is_empty() {
        return Ok(FeedPage::empty());
    }

    let query = build_query(&viewer, params, settings.feed, now)?;
    let candidates = conn.list_candidates(&viewer, &query)?;

    // Paging follows the SQL order, whatever happens to display order below.
    let next_cursor = (candidates.len() as i64 == query.limit)
        .then(|| candidates.last().map(|c| c.cursor().encode()))
        .flatten();

    let ids: Vec<i64> = candidates.iter().map(|c| c.profile.user_id).collect();
    let shadow = match risk::shadow_flags(kv, &ids, settings.antiabuse, now).await {
        Ok(flags) => flags,
        Err(e) => {
            tracing::warn!(error = %e, viewer_id = %viewer_id, "risk store unavailable, serving feed without demotion");
            vec![false; ids.len()]
        }
    };
    let ordered = demote_shadow(candidates, &shadow, settings.antiabuse.shadow_rank_multiplier);

    let cards: Vec<ProfileCard> = ordered
        .iter()
        .map(|c| ProfileCard::from_profile(&c.profile, now).with_distance(c.distance_km))
        .collect();

    let is_plus = quota::is_plus(conn, viewer_id, now)?;
    let every = if is_plus { settings.ads.plus_every } else { settings.ads.free_every };
    let slots = if every > 0 { cards.len() / every } else { 0 };
    let ads = if slots > 0 {
        conn.active_ads(&viewer.city_id, slots.min(MAX_ADS_PER_PAGE) as i64)?
    } else {
        Vec::new()
    };

    metrics::counter!("feed_pages_total").increment(1);
    tracing::debug!(
        viewer_id = %viewer_id,
        profiles = cards.len(),
        ads = ads.len(),
        has_next = next_cursor.is_some(),
        "feed page assembled"
    );

    Ok(FeedPage {
        items: inject_ads(cards, &ads, every),
        next_cursor,
    })
}

/// A single approved candidate, as opened from the feed.
pub fn candidate_card<C: FeedRepository>(
    conn: &mut C,
    viewer_id: i64,
    candidate_id: i64,
    now: DateTime<Utc>,
) -> AppResult<ProfileCard> {
    conn.candidate_profile(viewer_id, candidate_id)?
        .map(|p| ProfileCard::from_profile(&p, now))
        .ok_or_else(|| AppError::not_found("profile not found"))
}
