use crate::config::environment::AppConfig;
use redis::Client as RedisClient;

#[derive(Debug, Clone)]
pub struct InfraClients {
    pub redis: RedisClient,
}

pub const AGENT_JOBS_COLLECTION: &str = "agent_jobs";
pub const BLOCKCHAIN_ID_INDEX: &str = "agent_jobs:blockchain_ids";

pub async fn init_infra(config: &AppConfig) -> Result<Option<InfraClients>, String> {
    let Some(redis_url) = &config.redis_url else {
        return Ok(None);
    };

    let redis =
        RedisClient::open(redis_url.clone()).map_err(|e| format!("redis init failed: {e}"))?;
    let mut conn = redis
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| format!("redis connect failed: {e}"))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| format!("redis ping failed: {e}"))?;
    Ok(Some(InfraClients { redis }))
}
