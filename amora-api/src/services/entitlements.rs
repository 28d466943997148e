use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use amora_shared::errors::{AppError, AppResult};

use crate::models::Entitlement;

/// Purchasable products. Aliases from older clients parse to the same SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sku {
    PlusMonth,
    Boost30m,
    Boost60m,
    SuperLikePack3,
    Reveal1,
    Incognito24h,
    MessageWithoutMatch1,
}

impl Sku {
    pub const ALL: [Sku; 7] = [
        Sku::PlusMonth,
        Sku::Boost30m,
        Sku::Boost60m,
        Sku::SuperLikePack3,
        Sku::Reveal1,
        Sku::Incognito24h,
        Sku::MessageWithoutMatch1,
    ];

    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "plus_1m" | "plus_month" => Ok(Self::PlusMonth),
            "boost_30m" => Ok(Self::Boost30m),
            "boost_60m" => Ok(Self::Boost60m),
            "superlike_pack_3" | "superlike_3" => Ok(Self::SuperLikePack3),
            "reveal_1" => Ok(Self::Reveal1),
            "incognito_24h" => Ok(Self::Incognito24h),
            "message_wo_match_1" | "msg_nomatch_1" => Ok(Self::MessageWithoutMatch1),
            other => Err(AppError::validation(format!("unsupported sku: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlusMonth => "plus_1m",
            Self::Boost30m => "boost_30m",
            Self::Boost60m => "boost_60m",
            Self::SuperLikePack3 => "superlike_pack_3",
            Self::Reveal1 => "reveal_1",
            Self::Incognito24h => "incognito_24h",
            Self::MessageWithoutMatch1 => "message_wo_match_1",
        }
    }

    /// Catalogue price in the provider's minor unit.
    pub fn price(&self) -> i64 {
        match self {
            Self::PlusMonth => 499,
            Self::Boost30m => 49,
            Self::Boost60m => 79,
            Self::SuperLikePack3 => 99,
            Self::Reveal1 => 39,
            Self::Incognito24h => 59,
            Self::MessageWithoutMatch1 => 29,
        }
    }

    /// Adds this product to `ent`. Time-boxed products extend from the later
    /// of `now` and the current expiry.
    pub fn apply(&self, ent: &mut Entitlement, now: DateTime<Utc>) {
        match self {
            Self::PlusMonth => ent.plus_expires_at = Some(extend(ent.plus_expires_at, now, Duration::days(30))),
            Self::Boost30m => ent.boost_until = Some(extend(ent.boost_until, now, Duration::minutes(30))),
            Self::Boost60m => ent.boost_until = Some(extend(ent.boost_until, now, Duration::minutes(60))),
            Self::SuperLikePack3 => {
                ent.superlike_credits += 3;
                ent.like_tokens += 3;
            }
            Self::Reveal1 => ent.reveal_credits += 1,
            Self::Incognito24h => ent.incognito_until = Some(extend(ent.incognito_until, now, Duration::hours(24))),
            Self::MessageWithoutMatch1 => ent.message_wo_match_credits += 1,
        }
        ent.updated_at = now;
    }
}

fn extend(current: Option<DateTime<Utc>>, now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    current.map_or(now, |t| t.max(now)) + by
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueEntry {
    pub sku: &'static str,
    pub price: i64,
    pub currency: String,
}

pub fn catalogue(currency: &str) -> Vec<CatalogueEntry> {
    Sku::ALL
        .iter()
        .map(|sku| CatalogueEntry {
            sku: sku.as_str(),
            price: sku.price(),
            currency: currency.to_string(),
        })
        .collect()
}

/// Balances as shown to the owner.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementView {
    pub is_plus: bool,
    pub plus_expires_at: Option<DateTime<Utc>>,
    pub boost_until: Option<DateTime<Utc>>,
    pub incognito_until: Option<DateTime<Utc>>,
    pub superlike_credits: i32,
    pub reveal_credits: i32,
    pub like_tokens: i32,
    pub message_wo_match_credits: i32,
}

impl EntitlementView {
    pub fn new(ent: Option<&Entitlement>, now: DateTime<Utc>) -> Self {
        match ent {
            Some(e) => Self {
                is_plus: e.is_plus(now),
                plus_expires_at: e.plus_expires_at,
                boost_until: e.boost_until,
                incognito_until: e.incognito_until,
                superlike_credits: e.superlike_credits,
                reveal_credits: e.reveal_credits,
                like_tokens: e.like_tokens,
                message_wo_match_credits: e.message_wo_match_credits,
            },
            None => Self::new(Some(&Entitlement::empty(0, now)), now),
        }
    }
}
