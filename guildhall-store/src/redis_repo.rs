use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns whether this hit is still within `limit`.
    /// The window starts at the first hit; later hits never extend it.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count, ttl): (i64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        if needs_expiry(ttl) {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_seconds)
                .query_async(&mut conn)
                .await?;
        }

        Ok(count <= limit)
    }
}

/// `TTL` answers -1 for a key without expiry, which is a fresh counter or one
/// whose `EXPIRE` never landed.
fn needs_expiry(ttl: i64) -> bool {
    ttl == -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_set_once() {
        assert!(needs_expiry(-1));
        // A running window keeps its original deadline.
        assert!(!needs_expiry(59));
        assert!(!needs_expiry(1));
        // Key vanished between INCR and TTL
        assert!(!needs_expiry(-2));
    }
}
