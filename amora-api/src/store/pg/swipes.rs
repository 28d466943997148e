use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamptz};
use diesel::upsert::excluded;

use amora_shared::errors::AppResult;

use crate::models::{
    Block, DislikeState, Like, Match, MatchPair, NewReport, NewSwipe, Report, Swipe, SwipeAction,
    DISLIKE_HIDE_HOURS, MATCH_ACTIVE, MATCH_REMOVED,
};
use crate::schema::{blocks, dislike_states, likes, matches, profiles, reports, swipes};
use crate::store::{DislikeStore, LikeStore, MatchStore, SafetyStore, SwipeStore};

impl SwipeStore for PgConnection {
    fn create_swipe(
        &mut self,
        actor: i64,
        target: i64,
        action: SwipeAction,
        now: DateTime<Utc>,
    ) -> AppResult<Swipe> {
        let swipe = diesel::insert_into(swipes::table)
            .values(&NewSwipe {
                actor_user_id: actor,
                target_user_id: target,
                action: action.as_str(),
                created_at: now,
            })
            .returning(Swipe::as_returning())
            .get_result(self)?;
        Ok(swipe)
    }

    fn last_swipe_by_actor(&mut self, actor: i64) -> AppResult<Option<Swipe>> {
        let swipe = swipes::table
            .filter(swipes::actor_user_id.eq(actor))
            .order((swipes::created_at.desc(), swipes::id.desc()))
            .select(Swipe::as_select())
            .first(self)
            .optional()?;
        Ok(swipe)
    }

    fn delete_swipe(&mut self, swipe_id: i64) -> AppResult<()> {
        diesel::delete(swipes::table.find(swipe_id)).execute(self)?;
        Ok(())
    }
}

impl LikeStore for PgConnection {
    fn upsert_like(
        &mut self,
        from: i64,
        to: i64,
        is_super_like: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Like> {
        let like = diesel::insert_into(likes::table)
            .values(&Like {
                from_user_id: from,
                to_user_id: to,
                is_super_like,
                created_at: now,
            })
            .on_conflict((likes::from_user_id, likes::to_user_id))
            .do_update()
            .set(likes::is_super_like.eq(likes::is_super_like.or(excluded(likes::is_super_like))))
            .returning(Like::as_returning())
            .get_result(self)?;
        Ok(like)
    }

    fn find_like(&mut self, from: i64, to: i64) -> AppResult<Option<Like>> {
        let like = likes::table
            .find((from, to))
            .select(Like::as_select())
            .first(self)
            .optional()?;
        Ok(like)
    }

    fn delete_like(&mut self, from: i64, to: i64) -> AppResult<bool> {
        let deleted = diesel::delete(likes::table.find((from, to))).execute(self)?;
        Ok(deleted > 0)
    }
}

#[derive(QueryableByName)]
struct IdRow {
    #[diesel(sql_type = BigInt)]
    #[allow(dead_code)]
    id: i64,
}

impl MatchStore for PgConnection {
    fn create_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool> {
        // A removed row for the same pair comes back to life; an active one is left alone.
        let row = diesel::sql_query(
            "INSERT INTO matches (user_a_id, user_b_id, status, created_at, updated_at) \
             VALUES ($1, $2, 'active', $3, $3) \
             ON CONFLICT (user_a_id, user_b_id) DO UPDATE \
                SET status = 'active', updated_at = EXCLUDED.updated_at \
              WHERE matches.status = 'removed' \
             RETURNING id",
        )
        .bind::<BigInt, _>(pair.user_a_id)
        .bind::<BigInt, _>(pair.user_b_id)
        .bind::<Timestamptz, _>(now)
        .get_result::<IdRow>(self)
        .optional()?;
        Ok(row.is_some())
    }

    fn delete_match(&mut self, pair: MatchPair) -> AppResult<bool> {
        let deleted = diesel::delete(
            matches::table
                .filter(matches::user_a_id.eq(pair.user_a_id))
                .filter(matches::user_b_id.eq(pair.user_b_id)),
        )
        .execute(self)?;
        Ok(deleted > 0)
    }

    fn remove_match(&mut self, pair: MatchPair, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(
            matches::table
                .filter(matches::user_a_id.eq(pair.user_a_id))
                .filter(matches::user_b_id.eq(pair.user_b_id))
                .filter(matches::status.eq(MATCH_ACTIVE)),
        )
        .set((matches::status.eq(MATCH_REMOVED), matches::updated_at.eq(now)))
        .execute(self)?;
        Ok(updated > 0)
    }

    fn list_active_matches(&mut self, user_id: i64, limit: i64, offset: i64) -> AppResult<Vec<Match>> {
        let rows = matches::table
            .filter(matches::user_a_id.eq(user_id).or(matches::user_b_id.eq(user_id)))
            .filter(matches::status.eq(MATCH_ACTIVE))
            .order((matches::updated_at.desc(), matches::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(Match::as_select())
            .load(self)?;
        Ok(rows)
    }
}

impl DislikeStore for PgConnection {
    fn record_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<DislikeState> {
        let hide_until = now + Duration::hours(DISLIKE_HIDE_HOURS);
        let state = diesel::sql_query(
            "INSERT INTO dislike_states \
                (actor_user_id, target_user_id, dislike_count, hide_until, never_show, until_at, updated_at) \
             VALUES ($1, $2, 1, $4, FALSE, $4, $3) \
             ON CONFLICT (actor_user_id, target_user_id) DO UPDATE SET \
                dislike_count = dislike_states.dislike_count + 1, \
                never_show = dislike_states.never_show OR dislike_states.dislike_count + 1 >= 2, \
                hide_until = CASE WHEN dislike_states.dislike_count + 1 >= 2 THEN NULL ELSE EXCLUDED.hide_until END, \
                until_at = CASE WHEN dislike_states.dislike_count + 1 >= 2 THEN NULL ELSE EXCLUDED.until_at END, \
                updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind::<BigInt, _>(actor)
        .bind::<BigInt, _>(target)
        .bind::<Timestamptz, _>(now)
        .bind::<Timestamptz, _>(hide_until)
        .get_result::<DislikeState>(self)?;
        Ok(state)
    }

    fn undo_dislike(&mut self, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<Option<DislikeState>> {
        let current = dislike_states::table
            .find((actor, target))
            .for_update()
            .select(DislikeState::as_select())
            .first(self)
            .optional()?;

        let Some(current) = current else {
            return Ok(None);
        };

        if current.dislike_count <= 1 {
            diesel::delete(dislike_states::table.find((actor, target))).execute(self)?;
            return Ok(None);
        }

        let new_count = current.dislike_count - 1;
        let row = dislike_states::table.find((actor, target));
        let state = if new_count == 1 {
            let hide_until = now + Duration::hours(DISLIKE_HIDE_HOURS);
            diesel::update(row)
                .set((
                    dislike_states::dislike_count.eq(1),
                    dislike_states::never_show.eq(false),
                    dislike_states::hide_until.eq(Some(hide_until)),
                    dislike_states::until_at.eq(Some(hide_until)),
                    dislike_states::updated_at.eq(now),
                ))
                .returning(DislikeState::as_returning())
                .get_result(self)?
        } else {
            diesel::update(row)
                .set((
                    dislike_states::dislike_count.eq(new_count),
                    dislike_states::updated_at.eq(now),
                ))
                .returning(DislikeState::as_returning())
                .get_result(self)?
        };
        Ok(Some(state))
    }
}

impl SafetyStore for PgConnection {
    fn upsert_block(
        &mut self,
        actor: i64,
        target: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        diesel::insert_into(blocks::table)
            .values(&Block {
                actor_user_id: actor,
                target_user_id: target,
                reason: reason.map(str::to_string),
                created_at: now,
            })
            .on_conflict((blocks::actor_user_id, blocks::target_user_id))
            .do_update()
            .set(blocks::reason.eq(reason))
            .execute(self)?;
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
        let report = diesel::insert_into(reports::table)
            .values(&NewReport {
                reporter_user_id: reporter,
                target_user_id: target,
                reason,
                details,
                created_at: now,
            })
            .returning(Report::as_returning())
            .get_result(self)?;
        Ok(report)
    }

    fn increment_reports_count(&mut self, target: i64) -> AppResult<()> {
        diesel::update(profiles::table.find(target))
            .set(profiles::reports_count.eq(profiles::reports_count + 1))
            .execute(self)?;
        Ok(())
    }
}
