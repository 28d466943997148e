use chrono::{DateTime, Utc};
use diesel::dsl::{exists, not};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Bool, Date, Double, Integer, Nullable, Text, Timestamptz};

use amora_shared::errors::AppResult;

use crate::models::{Ad, Profile};
use crate::schema::{ads, blocks, likes_reveals, profiles};
use crate::store::{
    concrete_gender, AdsStore, Candidate, CandidateQuery, FeedRepository, IncomingLike,
    LikesInboxStore, ProfileStore, ViewerContext,
};

#[derive(QueryableByName)]
struct CandidateRow {
    #[diesel(embed)]
    profile: Profile,
    #[diesel(sql_type = Integer)]
    goals_priority: i32,
    #[diesel(sql_type = Nullable<Double>)]
    distance_km: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    rank_score: Option<f64>,
}

// Binds: $1 viewer, $2 now, $3 goals, $4 has_geo, $5 lat, $6 lon, $7 bonus,
// $8 age_min, $9 age_max, $10 city, $11 wanted gender (or ''), $12 own gender (or ''),
// $13 radius, $14 has_cursor, $15 cursor priority, $16 cursor ms, $17 cursor user, $18 limit,
// $19 UTC day for ages.
const CANDIDATES_SQL: &str = "\
SELECT c.* FROM (
    SELECT p.*,
           CASE WHEN p.goals && $3 THEN 1 ELSE 0 END AS goals_priority,
           FLOOR(EXTRACT(EPOCH FROM p.created_at) * 1000)::BIGINT AS created_ms,
           CASE WHEN $4 AND p.last_lat IS NOT NULL AND p.last_lon IS NOT NULL THEN
               6371.0 * ACOS(LEAST(1.0, GREATEST(-1.0,
                   SIN(RADIANS($5)) * SIN(RADIANS(p.last_lat))
                   + COS(RADIANS($5)) * COS(RADIANS(p.last_lat)) * COS(RADIANS(p.last_lon - $6)))))
           END AS distance_km,
           CASE WHEN $7 > 0 THEN
               CASE WHEN e.boost_until > $2 THEN 1.0 + $7 ELSE 1.0 END
           END AS rank_score
      FROM profiles p
      LEFT JOIN entitlements e ON e.user_id = p.user_id
     WHERE p.approved
       AND p.user_id <> $1
       AND p.birthdate IS NOT NULL
       AND EXTRACT(YEAR FROM AGE($19, p.birthdate))::INT BETWEEN $8 AND $9
       AND ($10 = '' OR p.city_id = $10)
       AND ($11 = '' OR LOWER(p.gender) = $11)
       AND ($12 = '' OR LOWER(p.looking_for) IN ('all', 'any', 'unknown', '', $12))
       AND NOT EXISTS (
           SELECT 1 FROM blocks b
            WHERE b.actor_user_id = p.user_id AND b.target_user_id = $1)
       AND NOT EXISTS (
           SELECT 1 FROM dislike_states d
            WHERE d.actor_user_id = $1 AND d.target_user_id = p.user_id
              AND (d.never_show OR COALESCE(d.hide_until, d.until_at) > $2))
) c
WHERE (NOT $4 OR c.distance_km <= $13)
  AND (NOT $14
       OR c.goals_priority < $15
       OR (c.goals_priority = $15
           AND (c.created_ms < $16 OR (c.created_ms = $16 AND c.user_id < $17))))
ORDER BY c.goals_priority DESC, c.created_ms DESC, c.user_id DESC
LIMIT $18";

impl FeedRepository for PgConnection {
    fn viewer_context(&mut self, user_id: i64) -> AppResult<Option<ViewerContext>> {
        Ok(self
            .find_profile(user_id)?
            .map(|profile| ViewerContext::from_profile(&profile)))
    }

    fn list_candidates(&mut self, viewer: &ViewerContext, query: &CandidateQuery) -> AppResult<Vec<Candidate>> {
        let (lat, lon) = (viewer.lat.unwrap_or_default(), viewer.lon.unwrap_or_default());
        let has_geo = viewer.lat.is_some() && viewer.lon.is_some() && query.radius_km > 0;

        let wanted = concrete_gender(&viewer.wanted_gender).unwrap_or_default();
        let own = concrete_gender(&viewer.own_gender).unwrap_or_default();

        let cursor = query.cursor;
        let rows = diesel::sql_query(CANDIDATES_SQL)
            .bind::<BigInt, _>(viewer.user_id)
            .bind::<Timestamptz, _>(query.now)
            .bind::<Array<Text>, _>(&viewer.goals)
            .bind::<Bool, _>(has_geo)
            .bind::<Double, _>(lat)
            .bind::<Double, _>(lon)
            .bind::<Double, _>(query.boost_rank_bonus)
            .bind::<Integer, _>(query.age_min)
            .bind::<Integer, _>(query.age_max)
            .bind::<Text, _>(&viewer.city_id)
            .bind::<Text, _>(wanted)
            .bind::<Text, _>(own)
            .bind::<Double, _>(f64::from(query.radius_km))
            .bind::<Bool, _>(cursor.is_some())
            .bind::<Integer, _>(cursor.map_or(0, |c| c.priority))
            .bind::<BigInt, _>(cursor.map_or(0, |c| c.created_at_ms))
            .bind::<BigInt, _>(cursor.map_or(0, |c| c.user_id))
            .bind::<BigInt, _>(query.limit)
            .bind::<Date, _>(query.age_reference_day())
            .load::<CandidateRow>(self)?;

        Ok(rows
            .into_iter()
            .map(|row| Candidate {
                profile: row.profile,
                goals_priority: row.goals_priority,
                distance_km: row.distance_km,
                rank_score: row.rank_score,
            })
            .collect())
    }

    fn candidate_profile(&mut self, viewer_id: i64, candidate_id: i64) -> AppResult<Option<Profile>> {
        let profile = profiles::table
            .find(candidate_id)
            .filter(profiles::approved.eq(true))
            .filter(not(exists(
                blocks::table
                    .filter(blocks::actor_user_id.eq(candidate_id))
                    .filter(blocks::target_user_id.eq(viewer_id)),
            )))
            .select(Profile::as_select())
            .first(self)
            .optional()?;
        Ok(profile)
    }
}

impl AdsStore for PgConnection {
    fn active_ads(&mut self, city_id: &str, limit: i64) -> AppResult<Vec<Ad>> {
        let rows = ads::table
            .filter(ads::active.eq(true))
            .filter(ads::city_id.eq(city_id).or(ads::city_id.eq("")))
            .order((ads::priority.desc(), ads::id.asc()))
            .limit(limit)
            .select(Ad::as_select())
            .load(self)?;
        Ok(rows)
    }
}

#[derive(QueryableByName)]
struct IncomingRow {
    #[diesel(sql_type = BigInt)]
    from_user_id: i64,
    #[diesel(sql_type = Timestamptz)]
    liked_at: DateTime<Utc>,
    #[diesel(sql_type = Bool)]
    is_super_like: bool,
}

impl From<IncomingRow> for IncomingLike {
    fn from(row: IncomingRow) -> Self {
        Self {
            from_user_id: row.from_user_id,
            liked_at: row.liked_at,
            is_super_like: row.is_super_like,
        }
    }
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

const VISIBLE_INCOMING: &str = "\
  FROM likes l
 WHERE l.to_user_id = $1
   AND NOT EXISTS (
       SELECT 1 FROM blocks b
        WHERE b.actor_user_id = l.from_user_id AND b.target_user_id = l.to_user_id)";

impl LikesInboxStore for PgConnection {
    fn count_incoming(&mut self, user_id: i64) -> AppResult<i64> {
        let row = diesel::sql_query(format!("SELECT COUNT(*) AS total {VISIBLE_INCOMING}"))
            .bind::<BigInt, _>(user_id)
            .get_result::<CountRow>(self)?;
        Ok(row.total)
    }

    fn incoming_likes(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<IncomingLike>> {
        let rows = diesel::sql_query(format!(
            "SELECT l.from_user_id, l.created_at AS liked_at, l.is_super_like {VISIBLE_INCOMING} \
             ORDER BY l.created_at DESC, l.from_user_id DESC LIMIT $2"
        ))
        .bind::<BigInt, _>(user_id)
        .bind::<BigInt, _>(limit)
        .load::<IncomingRow>(self)?;
        Ok(rows.into_iter().map(IncomingLike::from).collect())
    }

    fn incoming_profiles(&mut self, user_id: i64, limit: i64) -> AppResult<Vec<Profile>> {
        let rows = diesel::sql_query(
            "SELECT p.* \
               FROM likes l \
               JOIN profiles p ON p.user_id = l.from_user_id \
              WHERE l.to_user_id = $1 \
                AND NOT EXISTS ( \
                    SELECT 1 FROM blocks b \
                     WHERE b.actor_user_id = l.from_user_id AND b.target_user_id = l.to_user_id) \
              ORDER BY l.created_at DESC, l.from_user_id DESC LIMIT $2",
        )
        .bind::<BigInt, _>(user_id)
        .bind::<BigInt, _>(limit)
        .load::<Profile>(self)?;
        Ok(rows)
    }

    fn latest_unrevealed(&mut self, user_id: i64) -> AppResult<Option<IncomingLike>> {
        let row = diesel::sql_query(format!(
            "SELECT l.from_user_id, l.created_at AS liked_at, l.is_super_like {VISIBLE_INCOMING} \
               AND NOT EXISTS ( \
                   SELECT 1 FROM likes_reveals r \
                    WHERE r.user_id = l.to_user_id AND r.liker_user_id = l.from_user_id) \
             ORDER BY l.created_at DESC, l.from_user_id DESC LIMIT 1"
        ))
        .bind::<BigInt, _>(user_id)
        .get_result::<IncomingRow>(self)
        .optional()?;
        Ok(row.map(IncomingLike::from))
    }

    fn mark_revealed(&mut self, user_id: i64, liker_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        diesel::insert_into(likes_reveals::table)
            .values((
                likes_reveals::user_id.eq(user_id),
                likes_reveals::liker_user_id.eq(liker_id),
                likes_reveals::revealed_at.eq(now),
            ))
            .on_conflict_do_nothing()
            .execute(self)?;
        Ok(())
    }
}
