use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::UserRole;

use crate::models::{ModerationStatus, Profile, ProfileCoreChanges, User};
use crate::schema::{profiles, users};
use crate::store::{ProfileStore, UserStore};

impl UserStore for PgConnection {
    fn upsert_telegram_user(
        &mut self,
        external_id: i64,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        let user = diesel::insert_into(users::table)
            .values((
                users::external_id.eq(external_id),
                users::username.eq(username),
                users::role.eq(UserRole::User.as_str()),
                users::created_at.eq(now),
                users::updated_at.eq(now),
            ))
            .on_conflict(users::external_id)
            .do_update()
            .set((users::username.eq(username), users::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_result(self)?;
        Ok(user)
    }

    fn find_user(&mut self, user_id: i64) -> AppResult<Option<User>> {
        let user = users::table
            .find(user_id)
            .select(User::as_select())
            .first(self)
            .optional()?;
        Ok(user)
    }
}

impl ProfileStore for PgConnection {
    fn find_profile(&mut self, user_id: i64) -> AppResult<Option<Profile>> {
        let profile = profiles::table
            .find(user_id)
            .select(Profile::as_select())
            .first(self)
            .optional()?;
        Ok(profile)
    }

    fn save_profile_core(
        &mut self,
        user_id: i64,
        core: &ProfileCoreChanges,
        now: DateTime<Utc>,
    ) -> AppResult<Profile> {
        let pending = ModerationStatus::Pending.as_str();
        let profile = diesel::insert_into(profiles::table)
            .values((
                profiles::user_id.eq(user_id),
                core,
                profiles::moderation_status.eq(pending),
                profiles::approved.eq(false),
                profiles::profile_completed.eq(true),
                profiles::created_at.eq(now),
                profiles::updated_at.eq(now),
            ))
            .on_conflict(profiles::user_id)
            .do_update()
            .set((
                core,
                profiles::moderation_status.eq(pending),
                profiles::approved.eq(false),
                profiles::profile_completed.eq(true),
                profiles::updated_at.eq(now),
            ))
            .returning(Profile::as_returning())
            .get_result(self)?;
        Ok(profile)
    }

    fn save_location(&mut self, user_id: i64, lat: f64, lon: f64, now: DateTime<Utc>) -> AppResult<()> {
        let updated = diesel::update(profiles::table.find(user_id))
            .set((
                profiles::last_lat.eq(Some(lat)),
                profiles::last_lon.eq(Some(lon)),
                profiles::last_geo_at.eq(Some(now)),
                profiles::updated_at.eq(now),
            ))
            .execute(self)?;
        if updated == 0 {
            return Err(AppError::not_found("profile not found"));
        }
        Ok(())
    }

    fn clear_stale_locations(&mut self, older_than: DateTime<Utc>) -> AppResult<usize> {
        let cleared = diesel::update(profiles::table.filter(profiles::last_geo_at.lt(older_than)))
            .set((
                profiles::last_lat.eq(None::<f64>),
                profiles::last_lon.eq(None::<f64>),
                profiles::last_geo_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(self)?;
        Ok(cleared)
    }

    fn set_moderation_outcome(
        &mut self,
        user_id: i64,
        status: ModerationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        diesel::update(profiles::table.find(user_id))
            .set((
                profiles::moderation_status.eq(status.as_str()),
                profiles::approved.eq(status == ModerationStatus::Approved),
                profiles::updated_at.eq(now),
            ))
            .execute(self)?;
        Ok(())
    }
}
