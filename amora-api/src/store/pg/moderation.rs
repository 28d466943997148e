use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamptz};

use amora_shared::errors::AppResult;

use crate::models::{ModerationItem, ModerationStatus, NewModerationItem};
use crate::schema::moderation_items;
use crate::services::moderation::EtaBucket;
use crate::store::{Decision, ModerationStore};

#[derive(AsChangeset)]
#[diesel(table_name = moderation_items)]
#[diesel(treat_none_as_null = true)]
struct DecisionChanges<'a> {
    status: &'a str,
    reason_code: Option<&'a str>,
    reason_text: Option<&'a str>,
    required_fix_step: Option<&'a str>,
    moderator_actor_id: Option<i64>,
    locked_by: Option<i64>,
    locked_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl<'a> DecisionChanges<'a> {
    fn new(decision: &'a Decision, actor: i64, now: DateTime<Utc>) -> Self {
        let (reason_code, reason_text, required_fix_step) = match decision {
            Decision::Approve => (None, None, None),
            Decision::Reject { reason_code, reason_text, required_fix_step } => (
                Some(reason_code.as_str()),
                Some(reason_text.as_str()),
                Some(required_fix_step.as_str()),
            ),
        };
        Self {
            status: decision.status().as_str(),
            reason_code,
            reason_text,
            required_fix_step,
            moderator_actor_id: Some(actor),
            locked_by: None,
            locked_at: None,
            locked_until: None,
            updated_at: now,
        }
    }
}

impl ModerationStore for PgConnection {
    fn latest_item(&mut self, user_id: i64) -> AppResult<Option<ModerationItem>> {
        let item = moderation_items::table
            .filter(moderation_items::user_id.eq(user_id))
            .order((moderation_items::created_at.desc(), moderation_items::id.desc()))
            .select(ModerationItem::as_select())
            .first(self)
            .optional()?;
        Ok(item)
    }

    fn find_item(&mut self, item_id: i64) -> AppResult<Option<ModerationItem>> {
        let item = moderation_items::table
            .find(item_id)
            .select(ModerationItem::as_select())
            .first(self)
            .optional()?;
        Ok(item)
    }

    fn pending_count(&mut self) -> AppResult<i64> {
        let count = moderation_items::table
            .filter(moderation_items::status.eq(ModerationStatus::Pending.as_str()))
            .count()
            .get_result(self)?;
        Ok(count)
    }

    fn enqueue(
        &mut self,
        user_id: i64,
        target_type: &str,
        target_id: Option<i64>,
        eta: EtaBucket,
        now: DateTime<Utc>,
    ) -> AppResult<ModerationItem> {
        let item = diesel::insert_into(moderation_items::table)
            .values(&NewModerationItem {
                user_id,
                target_type,
                target_id,
                status: ModerationStatus::Pending.as_str(),
                eta_bucket: eta.as_str(),
                created_at: now,
                updated_at: now,
            })
            .returning(ModerationItem::as_returning())
            .get_result(self)?;
        Ok(item)
    }

    fn acquire_next_pending(
        &mut self,
        actor: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>> {
        // SKIP LOCKED lets concurrent moderators pass over a row another
        // transaction is about to lease.
        let item = diesel::sql_query(
            "UPDATE moderation_items \
                SET locked_by = $1, locked_at = $2, locked_until = $3, updated_at = $2 \
              WHERE id = ( \
                    SELECT id FROM moderation_items \
                     WHERE status = 'PENDING' \
                       AND (locked_until IS NULL OR locked_until <= $2 OR locked_by = $1) \
                     ORDER BY created_at ASC, id ASC \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED) \
             RETURNING *",
        )
        .bind::<BigInt, _>(actor)
        .bind::<Timestamptz, _>(now)
        .bind::<Timestamptz, _>(lease_until)
        .get_result::<ModerationItem>(self)
        .optional()?;
        Ok(item)
    }

    fn release_lease(&mut self, item_id: i64, actor: i64, now: DateTime<Utc>) -> AppResult<bool> {
        let released = diesel::update(
            moderation_items::table
                .find(item_id)
                .filter(moderation_items::locked_by.eq(actor)),
        )
        .set((
            moderation_items::locked_by.eq(None::<i64>),
            moderation_items::locked_at.eq(None::<DateTime<Utc>>),
            moderation_items::locked_until.eq(None::<DateTime<Utc>>),
            moderation_items::updated_at.eq(now),
        ))
        .execute(self)?;
        Ok(released > 0)
    }

    fn decide(
        &mut self,
        item_id: i64,
        actor: i64,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ModerationItem>> {
        let item = diesel::update(
            moderation_items::table
                .find(item_id)
                .filter(moderation_items::status.eq(ModerationStatus::Pending.as_str()))
                .filter(
                    moderation_items::locked_by
                        .is_null()
                        .or(moderation_items::locked_by.eq(actor))
                        .or(moderation_items::locked_until.le(now)),
                ),
        )
        .set(&DecisionChanges::new(decision, actor, now))
        .returning(ModerationItem::as_returning())
        .get_result(self)
        .optional()?;
        Ok(item)
    }

    fn set_eta_bucket(&mut self, item_id: i64, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<()> {
        diesel::update(moderation_items::table.find(item_id))
            .set((
                moderation_items::eta_bucket.eq(eta.as_str()),
                moderation_items::updated_at.eq(now),
            ))
            .execute(self)?;
        Ok(())
    }

    fn update_pending_eta(&mut self, eta: EtaBucket, now: DateTime<Utc>) -> AppResult<usize> {
        let updated = diesel::update(
            moderation_items::table
                .filter(moderation_items::status.eq(ModerationStatus::Pending.as_str()))
                .filter(moderation_items::eta_bucket.ne(eta.as_str())),
        )
        .set((
            moderation_items::eta_bucket.eq(eta.as_str()),
            moderation_items::updated_at.eq(now),
        ))
        .execute(self)?;
        Ok(updated)
    }

    fn clear_expired_leases(&mut self, now: DateTime<Utc>) -> AppResult<usize> {
        let cleared = diesel::update(moderation_items::table.filter(moderation_items::locked_until.le(now)))
            .set((
                moderation_items::locked_by.eq(None::<i64>),
                moderation_items::locked_at.eq(None::<DateTime<Utc>>),
                moderation_items::locked_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(self)?;
        Ok(cleared)
    }
}
