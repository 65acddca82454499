//! Service configuration read from the environment (and `.env` via dotenv).

use crate::popularity::ZeroReviewPolicy;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub score_cache_ttl: Duration,
    pub zero_review_policy: ZeroReviewPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let jwt_secret = lookup("REVIEW_JWT_SECRET").unwrap_or_else(|| "demo-secret".to_string());
        let cache_secs: u64 = lookup("POPULARITY_CACHE_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let zero_review_policy = match lookup("ZERO_REVIEW_POLICY") {
            Some(raw) => ZeroReviewPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "Unknown ZERO_REVIEW_POLICY, ranking unreviewed products lowest");
                ZeroReviewPolicy::default()
            }),
            None => ZeroReviewPolicy::default(),
        };

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            jwt_secret,
            score_cache_ttl: Duration::from_secs(cache_secs),
            zero_review_policy,
        })
    }
}
