use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Profile, ProfileCoreChanges, TARGET_PROFILE};
use crate::services::moderation;
use crate::store::{ModerationStore, ProfileStore, Transactional};

pub const MIN_AGE: i32 = 18;
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Western sign for a birthdate; an unknown birthdate has no sign.
pub fn zodiac(birthdate: Option<NaiveDate>) -> &'static str {
    let Some(date) = birthdate else {
        return "";
    };
    match (date.month(), date.day()) {
        (3, 21..=31) | (4, 1..=19) => "aries",
        (4, _) | (5, 1..=20) => "taurus",
        (5, _) | (6, 1..=20) => "gemini",
        (6, _) | (7, 1..=22) => "cancer",
        (7, _) | (8, 1..=22) => "leo",
        (8, _) | (9, 1..=22) => "virgo",
        (9, _) | (10, 1..=22) => "libra",
        (10, _) | (11, 1..=21) => "scorpio",
        (11, _) | (12, 1..=21) => "sagittarius",
        (12, _) | (1, 1..=19) => "capricorn",
        (1, _) | (2, 1..=18) => "aquarius",
        _ => "pisces",
    }
}

/// Completed years between `birthdate` and `today`.
pub fn age_years(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        years -= 1;
    }
    years
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let delta_lambda = (lon2 - lon1).to_radians();
    let cos_angle = phi1.sin() * phi2.sin() + phi1.cos() * phi2.cos() * delta_lambda.cos();
    EARTH_RADIUS_KM * cos_angle.clamp(-1.0, 1.0).acos()
}

/// Public card shown to other users.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileCard {
    pub user_id: i64,
    pub display_name: String,
    pub age: Option<i32>,
    pub gender: String,
    pub zodiac: String,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub height_cm: Option<i32>,
    pub eye_color: Option<String>,
    pub languages: Vec<String>,
    pub goals: Vec<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl ProfileCard {
    pub fn from_profile(profile: &Profile, now: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id,
            display_name: profile.display_name.clone(),
            age: profile.birthdate.map(|b| age_years(b, now.date_naive())),
            gender: profile.gender.clone(),
            zodiac: profile.zodiac.clone(),
            occupation: profile.occupation.clone(),
            education: profile.education.clone(),
            height_cm: profile.height_cm,
            eye_color: profile.eye_color.clone(),
            languages: profile.languages.clone(),
            goals: profile.goals.clone(),
            city: profile.city.clone(),
            distance_km: None,
        }
    }

    pub fn with_distance(mut self, distance_km: Option<f64>) -> Self {
        self.distance_km = distance_km.map(|d| (d * 10.0).round() / 10.0);
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileCoreRequest {
    #[validate(length(min = 1, max = 64, message = "display_name must be 1-64 characters"))]
    pub display_name: String,
    pub birthdate: NaiveDate,
    #[validate(length(min = 1, max = 16, message = "gender is required"))]
    pub gender: String,
    #[validate(length(min = 1, max = 16, message = "looking_for is required"))]
    pub looking_for: String,
    #[validate(length(max = 128))]
    pub occupation: Option<String>,
    #[validate(length(max = 128))]
    pub education: Option<String>,
    #[validate(range(min = 100, max = 250, message = "height_cm must be 100-250"))]
    pub height_cm: Option<i32>,
    #[validate(length(max = 32))]
    pub eye_color: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 languages"))]
    pub languages: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 goals"))]
    pub goals: Vec<String>,
    #[validate(length(min = 1, max = 64, message = "city_id is required"))]
    pub city_id: String,
    #[validate(length(min = 1, max = 128, message = "city is required"))]
    pub city: String,
    #[validate(range(min = 18, max = 99))]
    pub age_min: Option<i32>,
    #[validate(range(min = 18, max = 99))]
    pub age_max: Option<i32>,
    #[validate(range(min = 1, max = 300))]
    pub radius_km: Option<i32>,
}

fn clean_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ProfileCoreRequest {
    /// Validates the submission and derives the stored columns.
    pub fn into_changes(self, today: NaiveDate) -> AppResult<ProfileCoreChanges> {
        self.validate()
            .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

        if self.birthdate > today {
            return Err(AppError::validation("birthdate is in the future"));
        }
        if age_years(self.birthdate, today) < MIN_AGE {
            return Err(AppError::new(ErrorCode::AgeRejected, "you must be at least 18"));
        }
        if let (Some(min), Some(max)) = (self.age_min, self.age_max) {
            if min > max {
                return Err(AppError::validation("age_min must not exceed age_max"));
            }
        }

        Ok(ProfileCoreChanges {
            display_name: self.display_name.trim().to_string(),
            zodiac: zodiac(Some(self.birthdate)).to_string(),
            birthdate: Some(self.birthdate),
            gender: self.gender.trim().to_lowercase(),
            looking_for: self.looking_for.trim().to_lowercase(),
            occupation: trimmed(&self.occupation),
            education: trimmed(&self.education),
            height_cm: self.height_cm,
            eye_color: trimmed(&self.eye_color),
            languages: clean_list(&self.languages),
            goals: clean_list(&self.goals),
            city_id: self.city_id.trim().to_string(),
            city: self.city.trim().to_string(),
            age_min: self.age_min,
            age_max: self.age_max,
            radius_km: self.radius_km,
        })
    }
}

/// Stores the core, sends the profile back to review and queues it.
pub fn submit_profile_core<C>(
    conn: &mut C,
    user_id: i64,
    request: ProfileCoreRequest,
    now: DateTime<Utc>,
) -> AppResult<Profile>
where
    C: ProfileStore + ModerationStore + Transactional,
{
    let changes = request.into_changes(now.date_naive())?;

    let (profile, item_id) = conn.in_transaction(|tx| {
        let profile = tx.save_profile_core(user_id, &changes, now)?;
        let eta = moderation::eta_bucket(tx.pending_count()? + 1);
        let item = tx.enqueue(user_id, TARGET_PROFILE, None, eta, now)?;
        tx.update_pending_eta(eta, now)?;
        Ok((profile, item.id))
    })?;

    tracing::info!(user_id = %user_id, item_id = %item_id, "profile core submitted for review");
    Ok(profile)
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lon: f64,
}

pub fn save_location<C: ProfileStore>(
    conn: &mut C,
    user_id: i64,
    location: LocationRequest,
    best_effort: bool,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let LocationRequest { lat, lon } = location;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::validation("lat must be within ±90 and lon within ±180"));
    }

    match conn.save_location(user_id, lat, lon, now) {
        Ok(()) => Ok(()),
        Err(e) if best_effort => {
            tracing::warn!(user_id = %user_id, error = %e, "location write failed, continuing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
