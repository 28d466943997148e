use std::collections::HashMap;
use std::sync::OnceLock;

use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;

use amora_shared::clients::redis::RedisClient;

use super::{
    refresh_key, risk_key, session_key, session_refresh_key, user_sessions_key, CounterStore,
    KvResult, RateWindowStore, RiskState, RiskStore, SessionRecord, SessionStore, Violation,
    WindowState,
};

fn rate_window_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(include_str!("scripts/rate_window.lua")))
}

fn risk_violation_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(include_str!("scripts/risk_violation.lua")))
}

fn risk_decay_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(include_str!("scripts/risk_decay.lua")))
}

fn refresh_rotate_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(include_str!("scripts/refresh_rotate.lua")))
}

fn session_delete_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(include_str!("scripts/session_delete.lua")))
}

fn risk_from_reply((risk, cooldown_until, last_violation_at): (i64, i64, i64)) -> RiskState {
    RiskState {
        risk: risk.max(0),
        cooldown_until: cooldown_until.max(0),
        last_violation_at: last_violation_at.max(0),
    }
}

fn decode_session(raw: &str) -> KvResult<SessionRecord> {
    serde_json::from_str(raw).map_err(|e| {
        ::redis::RedisError::from((
            ::redis::ErrorKind::TypeError,
            "malformed session record",
            e.to_string(),
        ))
    })
}

fn encode_session(record: &SessionRecord) -> KvResult<String> {
    serde_json::to_string(record).map_err(|e| {
        ::redis::RedisError::from((
            ::redis::ErrorKind::TypeError,
            "unserializable session record",
            e.to_string(),
        ))
    })
}

#[async_trait]
impl RateWindowStore for RedisClient {
    async fn allow(&self, key: &str, window_secs: i64) -> KvResult<WindowState> {
        let mut conn = self.connection();
        let (count, ttl_ms): (i64, i64) = rate_window_script()
            .key(key)
            .arg(window_secs.max(1) * 1000)
            .invoke_async(&mut conn)
            .await?;
        Ok(WindowState { count, ttl_ms })
    }

    async fn window_state(&self, key: &str) -> KvResult<WindowState> {
        let mut conn = self.connection();
        let (count, ttl_ms): (Option<i64>, i64) = ::redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await?;
        Ok(WindowState {
            count: count.unwrap_or(0),
            ttl_ms: ttl_ms.max(0),
        })
    }
}

#[async_trait]
impl RiskStore for RedisClient {
    async fn apply_violation(&self, user_id: i64, violation: &Violation) -> KvResult<RiskState> {
        let mut conn = self.connection();
        let mut invocation = risk_violation_script().key(risk_key(user_id));
        invocation
            .arg(violation.weight.max(1))
            .arg(violation.now)
            .arg(violation.decay_sec)
            .arg(violation.forced_step.unwrap_or(-1))
            .arg(violation.ttl_sec.max(1));
        for step in &violation.ladder {
            invocation.arg(*step);
        }
        let reply: (i64, i64, i64) = invocation.invoke_async(&mut conn).await?;
        Ok(risk_from_reply(reply))
    }

    async fn apply_decay(&self, user_id: i64, now: i64, decay_sec: i64) -> KvResult<RiskState> {
        let mut conn = self.connection();
        let reply: (i64, i64, i64) = risk_decay_script()
            .key(risk_key(user_id))
            .arg(now)
            .arg(decay_sec)
            .invoke_async(&mut conn)
            .await?;
        Ok(risk_from_reply(reply))
    }

    async fn risk_states(&self, user_ids: &[i64]) -> KvResult<Vec<RiskState>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = ::redis::pipe();
        for user_id in user_ids {
            pipe.cmd("HMGET")
                .arg(risk_key(*user_id))
                .arg("score")
                .arg("cooldown_until")
                .arg("last_violation_at");
        }

        let mut conn = self.connection();
        let rows: Vec<(Option<i64>, Option<i64>, Option<i64>)> = pipe.query_async(&mut conn).await?;
        Ok(rows
            .into_iter()
            .map(|(risk, cooldown, last)| {
                risk_from_reply((risk.unwrap_or(0), cooldown.unwrap_or(0), last.unwrap_or(0)))
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for RedisClient {
    async fn create_session(&self, record: &SessionRecord, refresh_hash: &str, ttl_secs: i64) -> KvResult<()> {
        let payload = encode_session(record)?;
        let user_key = user_sessions_key(record.user_id);

        let mut conn = self.connection();
        ::redis::pipe()
            .atomic()
            .cmd("SET").arg(session_key(&record.sid)).arg(payload).arg("EX").arg(ttl_secs).ignore()
            .cmd("SET").arg(refresh_key(refresh_hash)).arg(&record.sid).arg("EX").arg(ttl_secs).ignore()
            .cmd("SET").arg(session_refresh_key(&record.sid)).arg(refresh_hash).arg("EX").arg(ttl_secs).ignore()
            .cmd("SADD").arg(&user_key).arg(&record.sid).ignore()
            .cmd("EXPIRE").arg(&user_key).arg(ttl_secs).ignore()
            .query_async::<_, ()>(&mut conn)
            .await
    }

    async fn find_session(&self, sid: &str) -> KvResult<Option<SessionRecord>> {
        let mut conn = self.connection();
        let raw: Option<String> = conn.get(session_key(sid)).await?;
        raw.as_deref().map(decode_session).transpose()
    }

    async fn save_session(&self, record: &SessionRecord, ttl_secs: i64) -> KvResult<()> {
        let payload = encode_session(record)?;
        let mut conn = self.connection();
        ::redis::cmd("SET")
            .arg(session_key(&record.sid))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
    }

    async fn rotate_refresh(&self, old_hash: &str, new_hash: &str, ttl_secs: i64) -> KvResult<Option<String>> {
        let mut conn = self.connection();
        refresh_rotate_script()
            .key(refresh_key(old_hash))
            .arg(new_hash)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
    }

    async fn delete_session(&self, sid: &str, user_id: i64) -> KvResult<()> {
        let mut conn = self.connection();
        session_delete_script()
            .key(session_key(sid))
            .key(session_refresh_key(sid))
            .key(user_sessions_key(user_id))
            .arg(sid)
            .invoke_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn user_sessions(&self, user_id: i64) -> KvResult<Vec<String>> {
        let mut conn = self.connection();
        conn.smembers(user_sessions_key(user_id)).await
    }
}

#[async_trait]
impl CounterStore for RedisClient {
    async fn bump_counter(&self, key: &str, field: &str, ttl_secs: i64) -> KvResult<()> {
        let mut conn = self.connection();
        ::redis::pipe()
            .atomic()
            .cmd("HINCRBY").arg(key).arg(field).arg(1).ignore()
            .cmd("EXPIRE").arg(key).arg(ttl_secs).ignore()
            .query_async::<_, ()>(&mut conn)
            .await
    }

    async fn counters(&self, key: &str) -> KvResult<HashMap<String, i64>> {
        let mut conn = self.connection();
        conn.hgetall(key).await
    }
}
