//! Recompute the stored sentiment of every review from its current text.
//!
//! Run after changing the sentiment lexicon so existing reviews match what a
//! fresh write would store.

use catalog_popularity::reviews::rescore_all;
use catalog_popularity::sentiment::SentimentAnalyzer;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let db_url = env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new().max_connections(1).connect(&db_url).await?;
    let analyzer = SentimentAnalyzer::new();

    tracing::info!("Rescoring reviews");
    let summary = rescore_all(&pool, &analyzer).await?;

    tracing::info!(
        scanned = summary.scanned,
        changed = summary.changed,
        unchanged = summary.scanned as u64 - summary.changed,
        "Rescoring finished"
    );
    Ok(())
}
