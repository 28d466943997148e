use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Integer, Text, Timestamptz};

use amora_shared::errors::AppResult;

use crate::models::{Entitlement, QuotaDaily};
use crate::schema::{entitlements, quota_daily};
use crate::services::day::DayKey;
use crate::store::{Consumed, EntitlementStore, QuotaStore};

impl EntitlementStore for PgConnection {
    fn entitlement(&mut self, user_id: i64) -> AppResult<Option<Entitlement>> {
        let ent = entitlements::table
            .find(user_id)
            .select(Entitlement::as_select())
            .first(self)
            .optional()?;
        Ok(ent)
    }

    fn consume_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(
            entitlements::table
                .find(user_id)
                .filter(entitlements::superlike_credits.ge(1))
                .filter(entitlements::like_tokens.ge(1)),
        )
        .set((
            entitlements::superlike_credits.eq(entitlements::superlike_credits - 1),
            entitlements::like_tokens.eq(entitlements::like_tokens - 1),
            entitlements::updated_at.eq(now),
        ))
        .execute(self)?;
        Ok(updated == 1)
    }

    fn refund_super_like(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        diesel::insert_into(entitlements::table)
            .values((
                entitlements::user_id.eq(user_id),
                entitlements::superlike_credits.eq(1),
                entitlements::like_tokens.eq(1),
                entitlements::updated_at.eq(now),
            ))
            .on_conflict(entitlements::user_id)
            .do_update()
            .set((
                entitlements::superlike_credits.eq(entitlements::superlike_credits + 1),
                entitlements::like_tokens.eq(entitlements::like_tokens + 1),
                entitlements::updated_at.eq(now),
            ))
            .execute(self)?;
        Ok(())
    }

    fn consume_reveal_credit(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(
            entitlements::table
                .find(user_id)
                .filter(entitlements::reveal_credits.ge(1)),
        )
        .set((
            entitlements::reveal_credits.eq(entitlements::reveal_credits - 1),
            entitlements::updated_at.eq(now),
        ))
        .execute(self)?;
        Ok(updated == 1)
    }

    fn lock_entitlement(&mut self, user_id: i64, now: DateTime<Utc>) -> AppResult<Entitlement> {
        diesel::insert_into(entitlements::table)
            .values(&Entitlement::empty(user_id, now))
            .on_conflict_do_nothing()
            .execute(self)?;

        let ent = entitlements::table
            .find(user_id)
            .for_update()
            .select(Entitlement::as_select())
            .first(self)?;
        Ok(ent)
    }

    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()> {
        diesel::update(entitlements::table.find(entitlement.user_id))
            .set(entitlement)
            .execute(self)?;
        Ok(())
    }
}

#[derive(QueryableByName)]
struct UsedRow {
    #[diesel(sql_type = Integer)]
    used: i32,
}

/// Conditional upsert of one daily counter. The conflict branch only fires
/// while the counter is below the limit, so a spent quota returns no row.
fn consume_daily(
    conn: &mut PgConnection,
    column: &'static str,
    user_id: i64,
    day: &DayKey,
    limit: i32,
    now: DateTime<Utc>,
) -> AppResult<Consumed> {
    if limit <= 0 {
        return Ok(Consumed::LimitReached);
    }

    let (likes_init, rewind_init) = if column == "likes_used" { (1, 0) } else { (0, 1) };
    let query = format!(
        "INSERT INTO quota_daily (user_id, day_key, tz_name, likes_used, rewind_used, updated_at) \
         VALUES ($1, $2, $3, {likes_init}, {rewind_init}, $4) \
         ON CONFLICT (user_id, day_key) DO UPDATE \
            SET {column} = quota_daily.{column} + 1, updated_at = EXCLUDED.updated_at \
          WHERE quota_daily.{column} < $5 \
         RETURNING {column} AS used"
    );

    let row = diesel::sql_query(query)
        .bind::<BigInt, _>(user_id)
        .bind::<Date, _>(day.day)
        .bind::<Text, _>(&day.tz_name)
        .bind::<Timestamptz, _>(now)
        .bind::<Integer, _>(limit)
        .get_result::<UsedRow>(conn)
        .optional()?;

    Ok(match row {
        Some(row) => Consumed::Used(row.used),
        None => Consumed::LimitReached,
    })
}

impl QuotaStore for PgConnection {
    fn consume_like_with_limit(
        &mut self,
        user_id: i64,
        day: &DayKey,
        limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Consumed> {
        consume_daily(self, "likes_used", user_id, day, limit, now)
    }

    fn refund_like(&mut self, user_id: i64, day_key: NaiveDate, now: DateTime<Utc>) -> AppResult<()> {
        diesel::update(
            quota_daily::table
                .find((user_id, day_key))
                .filter(quota_daily::likes_used.gt(0)),
        )
        .set((
            quota_daily::likes_used.eq(quota_daily::likes_used - 1),
            quota_daily::updated_at.eq(now),
        ))
        .execute(self)?;
        Ok(())
    }

    fn consume_rewind_with_limit(
        &mut self,
        user_id: i64,
        day: &DayKey,
        limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Consumed> {
        consume_daily(self, "rewind_used", user_id, day, limit, now)
    }

    fn quota_usage(&mut self, user_id: i64, day_key: NaiveDate) -> AppResult<Option<QuotaDaily>> {
        let usage = quota_daily::table
            .find((user_id, day_key))
            .select(QuotaDaily::as_select())
            .first(self)
            .optional()?;
        Ok(usage)
    }
}
