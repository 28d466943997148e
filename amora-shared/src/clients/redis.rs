use redis::aio::ConnectionManager;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

/// `REDIS_ADDR` may be a bare `host:port` or a full `redis://` URL.
pub fn redis_url(addr: &str, db: i64, password: Option<&str>) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        return addr.to_string();
    }
    match password.filter(|p| !p.is_empty()) {
        Some(password) => format!("redis://:{password}@{addr}/{db}"),
        None => format!("redis://{addr}/{db}"),
    }
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("connected to Redis");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
