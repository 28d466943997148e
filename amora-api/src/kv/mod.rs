//! Key-value state that lives outside database transactions: rate windows,
//! risk scores, sessions and dashboard counters. `RedisClient` implements
//! every trait here (see `redis`); multi-step mutations are Lua scripts or
//! atomic pipelines so each call is a single step on the server.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amora_shared::types::UserRole;

pub mod redis;

pub type KvResult<T> = Result<T, ::redis::RedisError>;

/// Counter value and remaining lifetime of one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: i64,
    pub ttl_ms: i64,
}

impl WindowState {
    /// Whole seconds until the window resets, never below one.
    pub fn retry_after_secs(&self) -> i64 {
        ((self.ttl_ms + 999) / 1000).max(1)
    }
}

#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Increments the window counter; the first increment starts the TTL.
    async fn allow(&self, key: &str, window_secs: i64) -> KvResult<WindowState>;
    async fn window_state(&self, key: &str) -> KvResult<WindowState>;
}

/// Stored risk of one user. All fields are epoch seconds or counts, never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskState {
    pub risk: i64,
    pub cooldown_until: i64,
    pub last_violation_at: i64,
}

/// One violation as handed to the risk script.
#[derive(Debug, Clone)]
pub struct Violation {
    pub weight: i64,
    pub now: i64,
    pub decay_sec: i64,
    pub ladder: Vec<i64>,
    /// Index into `ladder` that overrides the risk-based pick.
    pub forced_step: Option<i64>,
    pub ttl_sec: i64,
}

#[async_trait]
pub trait RiskStore: Send + Sync {
    /// Decay, add `weight`, pick a cooldown step; one atomic step.
    async fn apply_violation(&self, user_id: i64, violation: &Violation) -> KvResult<RiskState>;
    /// Persists elapsed decay and returns the result.
    async fn apply_decay(&self, user_id: i64, now: i64, decay_sec: i64) -> KvResult<RiskState>;
    /// Raw stored states, no decay applied. Missing users read as zero.
    async fn risk_states(&self, user_ids: &[i64]) -> KvResult<Vec<RiskState>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub sid: String,
    pub user_id: i64,
    pub role: UserRole,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes the session, its refresh binding and the user index together.
    async fn create_session(&self, record: &SessionRecord, refresh_hash: &str, ttl_secs: i64) -> KvResult<()>;
    async fn find_session(&self, sid: &str) -> KvResult<Option<SessionRecord>>;
    async fn save_session(&self, record: &SessionRecord, ttl_secs: i64) -> KvResult<()>;
    /// Swaps the binding `old -> sid` for `new -> sid`. `None` when `old` is
    /// unknown, superseded, or its session is gone.
    async fn rotate_refresh(&self, old_hash: &str, new_hash: &str, ttl_secs: i64) -> KvResult<Option<String>>;
    async fn delete_session(&self, sid: &str, user_id: i64) -> KvResult<()>;
    async fn user_sessions(&self, user_id: i64) -> KvResult<Vec<String>>;
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn bump_counter(&self, key: &str, field: &str, ttl_secs: i64) -> KvResult<()>;
    async fn counters(&self, key: &str) -> KvResult<HashMap<String, i64>>;
}

/// Everything the services need from the key-value store.
pub trait KvStore: RateWindowStore + RiskStore + SessionStore + CounterStore {}

impl<T> KvStore for T where T: RateWindowStore + RiskStore + SessionStore + CounterStore {}

pub fn rate_window_key(scope: &str, user_id: i64, label: &str) -> String {
    format!("rw:{scope}:{user_id}:{label}")
}

pub fn risk_key(user_id: i64) -> String {
    format!("risk:{user_id}")
}

pub fn session_key(sid: &str) -> String {
    format!("sess:{sid}")
}

pub fn session_refresh_key(sid: &str) -> String {
    format!("sess:{sid}:refresh")
}

pub fn refresh_key(hash: &str) -> String {
    format!("refresh:{hash}")
}

pub fn user_sessions_key(user_id: i64) -> String {
    format!("user_sess:{user_id}")
}
