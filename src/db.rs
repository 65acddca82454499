use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};

use crate::popularity::ProductStats;
use crate::products::init_products_table;
use crate::reviews::init_reviews_table;

pub async fn init_db(pool: &PgPool) -> Result<()> {
    // Reviews reference products, so products go first.
    init_products_table(pool).await?;
    init_reviews_table(pool).await?;
    tracing::info!("Database schema ready");
    Ok(())
}

/// One product's counters with its review ratings and sentiments
/// aggregated into arrays.
#[derive(Debug, FromRow)]
struct StatsRow {
    id: String,
    views: i64,
    cart_adds: i64,
    updated_at: DateTime<Utc>,
    ratings: Vec<i16>,
    sentiments: Vec<f64>,
}

impl From<StatsRow> for ProductStats {
    fn from(row: StatsRow) -> Self {
        ProductStats {
            product_id: row.id,
            // Counters only ever grow from zero; a negative value means a bad
            // manual edit and counts as nothing.
            views: u64::try_from(row.views).unwrap_or(0),
            cart_adds: u64::try_from(row.cart_adds).unwrap_or(0),
            ratings: row.ratings,
            sentiments: row.sentiments,
            last_updated: row.updated_at,
        }
    }
}

const STATS_QUERY: &str = r#"
    SELECT p.id, p.views, p.cart_adds, p.updated_at,
           COALESCE(array_agg(r.rating ORDER BY r.id) FILTER (WHERE r.id IS NOT NULL), '{}') AS ratings,
           COALESCE(array_agg(r.sentiment_score ORDER BY r.id) FILTER (WHERE r.id IS NOT NULL), '{}') AS sentiments
    FROM products p
    LEFT JOIN reviews r ON r.product_id = p.id
"#;

/// Stats for every product, in creation order (ties broken by id) so that
/// equal scores rank the same way on every request.
pub async fn fetch_all_stats(pool: &PgPool) -> Result<Vec<ProductStats>> {
    let sql = format!("{} GROUP BY p.id ORDER BY p.created_at, p.id", STATS_QUERY);
    let rows: Vec<StatsRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(ProductStats::from).collect())
}

pub async fn fetch_product_stats(pool: &PgPool, product_id: &str) -> Result<Option<ProductStats>> {
    let sql = format!("{} WHERE p.id = $1 GROUP BY p.id", STATS_QUERY);
    let row: Option<StatsRow> = sqlx::query_as(&sql)
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(ProductStats::from))
}

/// Pool for tests that need Postgres; `None` (and the test is skipped) unless
/// `TEST_DATABASE_URL` is set.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .ok()?;
    // Tests run concurrently; a racing CREATE TABLE is harmless.
    let _ = init_db(&pool).await;
    Some(pool)
}
