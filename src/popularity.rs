//! Popularity scoring for catalog ranking.
//!
//! A product's score blends engagement (views), conversion (cart adds weighted
//! by rating and review sentiment) and recency. The weights are fixed
//! constants; changing them reorders every existing catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Weight of the mean user rating in the quality blend.
pub const RATING_WEIGHT: f64 = 0.3;
/// Weight of the rescaled mean review sentiment in the quality blend.
pub const SENTIMENT_WEIGHT: f64 = 0.6;
/// Time constant of the recency decay, in days.
pub const DECAY_DAYS: f64 = 7.0;

/// Aggregates of one product, as read from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductStats {
    pub product_id: String,
    pub views: u64,
    pub cart_adds: u64,
    pub ratings: Vec<i16>,
    pub sentiments: Vec<f64>,
    pub last_updated: DateTime<Utc>,
}

impl ProductStats {
    pub fn review_count(&self) -> usize {
        self.ratings.len()
    }

    pub fn breakdown(&self, now: DateTime<Utc>) -> PopularityBreakdown {
        popularity_breakdown(
            self.views,
            self.cart_adds,
            &self.ratings,
            &self.sentiments,
            self.last_updated,
            now,
        )
    }

    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        self.breakdown(now).score
    }
}

/// Every intermediate term of a popularity score.
///
/// For a product without reviews all averages are `None` and `score` is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PopularityBreakdown {
    pub review_count: usize,
    pub avg_rating: Option<f64>,
    pub avg_sentiment_raw: Option<f64>,
    /// Mean sentiment rescaled from `[-1, 1]` to `[0, 1]`.
    pub avg_sentiment: Option<f64>,
    pub days_passed: i64,
    pub decay_factor: f64,
    pub engagement: f64,
    pub conversion: f64,
    pub score: f64,
}

/// Ranking score of a product; higher is more popular.
///
/// Returns exactly 0 when `ratings` is empty.
pub fn compute_popularity(
    views: u64,
    cart_adds: u64,
    ratings: &[i16],
    sentiments: &[f64],
    last_updated: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    popularity_breakdown(views, cart_adds, ratings, sentiments, last_updated, now).score
}

pub fn popularity_breakdown(
    views: u64,
    cart_adds: u64,
    ratings: &[i16],
    sentiments: &[f64],
    last_updated: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PopularityBreakdown {
    let days_passed = days_passed(last_updated, now);
    let decay_factor = (-(days_passed as f64) / DECAY_DAYS).exp();

    let (Some(avg_rating), Some(avg_sentiment_raw)) = (
        mean(ratings.iter().map(|&r| f64::from(r))),
        mean(sentiments.iter().copied()),
    ) else {
        return PopularityBreakdown {
            review_count: ratings.len(),
            avg_rating: None,
            avg_sentiment_raw: None,
            avg_sentiment: None,
            days_passed,
            decay_factor,
            engagement: 0.0,
            conversion: 0.0,
            score: 0.0,
        };
    };

    let avg_sentiment = (avg_sentiment_raw + 1.0) / 2.0;
    let engagement = (views as f64 + 1.0).ln();
    let conversion =
        cart_adds as f64 * (avg_rating * RATING_WEIGHT + avg_sentiment * SENTIMENT_WEIGHT);

    PopularityBreakdown {
        review_count: ratings.len(),
        avg_rating: Some(avg_rating),
        avg_sentiment_raw: Some(avg_sentiment_raw),
        avg_sentiment: Some(avg_sentiment),
        days_passed,
        decay_factor,
        engagement,
        conversion,
        score: (engagement + conversion) * decay_factor,
    }
}

/// Whole days from `last_updated` to `now`, never negative.
pub fn days_passed(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(last_updated).num_days().max(0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// What to do with products that have no reviews yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReviewPolicy {
    /// Keep them in the listing with a score of 0.
    #[default]
    RankLowest,
    /// Leave them out of the ranked listing.
    Exclude,
}

impl ZeroReviewPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lowest" | "rank_lowest" | "ranklowest" => Some(ZeroReviewPolicy::RankLowest),
            "exclude" => Some(ZeroReviewPolicy::Exclude),
            _ => None,
        }
    }
}

/// A product together with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankedProduct {
    pub product_id: String,
    pub score: f64,
    pub review_count: usize,
}

/// Sort products by score, highest first.
///
/// The sort is stable: equal scores keep their input order, so ranking the
/// same data twice gives the same result. A score that comes out NaN or
/// infinite (corrupt stored sentiment, say) is ranked as 0.
pub fn rank_products<F>(stats: &[ProductStats], policy: ZeroReviewPolicy, mut score: F) -> Vec<RankedProduct>
where
    F: FnMut(&ProductStats) -> f64,
{
    let mut ranked: Vec<RankedProduct> = stats
        .iter()
        .filter(|s| policy == ZeroReviewPolicy::RankLowest || s.review_count() > 0)
        .map(|s| {
            let raw = score(s);
            let score = if raw.is_finite() {
                raw
            } else {
                tracing::warn!(product_id = %s.product_id, score = raw, "Non-finite popularity score, ranking as 0");
                0.0
            };
            RankedProduct {
                product_id: s.product_id.clone(),
                score,
                review_count: s.review_count(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn stats(id: &str, views: u64, cart_adds: u64, ratings: &[i16], sentiments: &[f64]) -> ProductStats {
        ProductStats {
            product_id: id.to_string(),
            views,
            cart_adds,
            ratings: ratings.to_vec(),
            sentiments: sentiments.to_vec(),
            last_updated: now(),
        }
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_no_reviews_scores_zero() {
        let now = now();
        for (views, cart_adds) in [(0, 0), (1_000, 0), (0, 50), (123_456, 789)] {
            assert_eq!(compute_popularity(views, cart_adds, &[], &[], now, now), 0.0);
            let old = now - Duration::days(30);
            assert_eq!(compute_popularity(views, cart_adds, &[], &[], old, now), 0.0);
        }
    }

    #[test]
    fn test_no_engagement_scores_zero() {
        let now = now();
        assert_eq!(compute_popularity(0, 0, &[5], &[1.0], now, now), 0.0);
    }

    #[test]
    fn test_fresh_product_breakdown() {
        let now = now();
        let b = popularity_breakdown(99, 10, &[4, 5], &[0.5, 0.3], now, now);
        assert_close(b.avg_rating.unwrap(), 4.5, 1e-12);
        assert_close(b.avg_sentiment_raw.unwrap(), 0.4, 1e-12);
        assert_close(b.avg_sentiment.unwrap(), 0.7, 1e-12);
        assert_eq!(b.days_passed, 0);
        assert_eq!(b.decay_factor, 1.0);
        assert_close(b.engagement, 100f64.ln(), 1e-12);
        assert_close(b.conversion, 17.7, 1e-9);
        assert_close(b.score, 22.305, 1e-3);
    }

    #[test]
    fn test_two_week_old_product_decays() {
        let now = now();
        let last_updated = now - Duration::days(14);
        let score = compute_popularity(99, 10, &[4, 5], &[0.5, 0.3], last_updated, now);
        let expected = (100f64.ln() + 17.7) * (-2f64).exp();
        assert_close(score, expected, 1e-9);
        assert_close(score, 3.018, 1e-3);
    }

    #[test]
    fn test_partial_days_are_floored() {
        let now = now();
        let last_updated = now - Duration::hours(47);
        assert_eq!(days_passed(last_updated, now), 1);
        // Clock skew must not boost a product above its fresh score.
        assert_eq!(days_passed(now + Duration::hours(5), now), 0);
    }

    #[test]
    fn test_decay_never_increases_score() {
        let now = now();
        let mut previous = f64::INFINITY;
        for days in 0..60 {
            let score = compute_popularity(
                500,
                20,
                &[3, 4, 5],
                &[-0.2, 0.1, 0.9],
                now - Duration::days(days),
                now,
            );
            assert!(score <= previous, "day {} increased score", days);
            previous = score;
        }
    }

    #[test]
    fn test_monotonic_in_views_and_cart_adds() {
        let now = now();
        let ratings = [2, 4];
        let sentiments = [-0.8, 0.4];
        let mut previous = 0.0;
        for views in [0, 1, 10, 100, 10_000] {
            let score = compute_popularity(views, 3, &ratings, &sentiments, now, now);
            assert!(score >= previous);
            previous = score;
        }
        let mut previous = 0.0;
        for cart_adds in [0, 1, 2, 50, 5_000] {
            let score = compute_popularity(10, cart_adds, &ratings, &sentiments, now, now);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_weights_are_not_normalized() {
        let now = now();
        // Perfect rating and sentiment with one cart add: 5 * 0.3 + 1 * 0.6.
        let b = popularity_breakdown(0, 1, &[5], &[1.0], now, now);
        assert_close(b.conversion, 2.1, 1e-12);
    }

    #[test]
    fn test_rank_orders_descending_and_is_stable() {
        let now = now();
        let products = vec![
            stats("a", 10, 0, &[3], &[0.0]),
            stats("b", 99, 10, &[4, 5], &[0.5, 0.3]),
            stats("c", 10, 0, &[5], &[1.0]),
            stats("d", 1_000, 0, &[], &[]),
        ];
        let ranked = rank_products(&products, ZeroReviewPolicy::RankLowest, |s| s.score(now));
        let ids: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        // a and c tie on ln(11); input order wins.
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
        assert_eq!(ranked[3].score, 0.0);

        let again = rank_products(&products, ZeroReviewPolicy::RankLowest, |s| s.score(now));
        assert_eq!(ranked, again);
    }

    #[test]
    fn test_corrupt_score_ranks_as_zero_without_disturbing_others() {
        let now = now();
        let products = vec![
            stats("low", 1, 0, &[3], &[0.0]),
            stats("corrupt", 500, 5, &[4], &[f64::NAN]),
            stats("high", 1_000, 0, &[3], &[0.0]),
            stats("mid", 50, 0, &[3], &[0.0]),
        ];
        let ranked = rank_products(&products, ZeroReviewPolicy::RankLowest, |s| s.score(now));
        let ids: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low", "corrupt"]);
        assert_eq!(ranked[3].score, 0.0);

        let ranked = rank_products(&products, ZeroReviewPolicy::RankLowest, |_| f64::INFINITY);
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_rank_can_exclude_unreviewed_products() {
        let now = now();
        let products = vec![stats("a", 10, 0, &[3], &[0.0]), stats("d", 1_000, 0, &[], &[])];
        let ranked = rank_products(&products, ZeroReviewPolicy::Exclude, |s| s.score(now));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product_id, "a");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(ZeroReviewPolicy::parse("exclude"), Some(ZeroReviewPolicy::Exclude));
        assert_eq!(ZeroReviewPolicy::parse(" Lowest "), Some(ZeroReviewPolicy::RankLowest));
        assert_eq!(ZeroReviewPolicy::parse("drop"), None);
    }

    #[test]
    fn test_breakdown_json_shape() {
        let now = now();
        let value = serde_json::to_value(popularity_breakdown(5, 0, &[], &[], now, now)).unwrap();
        assert_eq!(value["score"], 0.0);
        assert!(value["avg_rating"].is_null());
        assert_eq!(
            serde_json::to_value(ZeroReviewPolicy::RankLowest).unwrap(),
            serde_json::json!("rank_lowest")
        );
    }
}
