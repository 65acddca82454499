//! Product reviews.
//!
//! Every write goes through [`PendingReview`], which scores the review text
//! with the sentiment analyzer. Callers cannot supply a sentiment value, so
//! the stored `sentiment_score` always matches the stored `text`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::sentiment::SentimentAnalyzer;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;
pub const DEFAULT_RATING: i16 = 3;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema, FromRow)]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i16,
    pub text: String,
    pub sentiment_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    /// 1 to 5; defaults to 3.
    pub rating: Option<i16>,
    pub text: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub success: bool,
    pub review: Option<Review>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewError {
    RatingOutOfRange(i16),
}

impl fmt::Display for ReviewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewError::RatingOutOfRange(r) => write!(
                f,
                "rating {} is outside {}..={}",
                r, MIN_RATING, MAX_RATING
            ),
        }
    }
}

impl std::error::Error for ReviewError {}

/// Review content ready to be written, with sentiment derived from its text.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    rating: i16,
    text: String,
    sentiment_score: f64,
}

impl PendingReview {
    pub fn new(rating: i16, text: String, analyzer: &SentimentAnalyzer) -> Result<Self, ReviewError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(ReviewError::RatingOutOfRange(rating));
        }
        let sentiment_score = analyzer.compound(&text);
        Ok(Self {
            rating,
            text,
            sentiment_score,
        })
    }

    /// Merge a partial edit into an existing review. Sentiment is rescored
    /// from whichever text ends up stored.
    pub fn from_update(
        existing: &Review,
        update: UpdateReviewRequest,
        analyzer: &SentimentAnalyzer,
    ) -> Result<Self, ReviewError> {
        Self::new(
            update.rating.unwrap_or(existing.rating),
            update.text.unwrap_or_else(|| existing.text.clone()),
            analyzer,
        )
    }

    pub fn rating(&self) -> i16 {
        self.rating
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sentiment_score(&self) -> f64 {
        self.sentiment_score
    }
}

pub async fn init_reviews_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS reviews (
            id VARCHAR PRIMARY KEY,
            product_id VARCHAR NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            user_id VARCHAR NOT NULL,
            rating SMALLINT NOT NULL DEFAULT 3 CHECK (rating BETWEEN 1 AND 5),
            text TEXT NOT NULL,
            sentiment_score DOUBLE PRECISION NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS reviews_product_id_idx ON reviews (product_id);")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_review(
    pool: &PgPool,
    product_id: &str,
    user_id: &str,
    pending: &PendingReview,
) -> Result<Review, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query_as(
        r#"INSERT INTO reviews (id, product_id, user_id, rating, text, sentiment_score)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING id, product_id, user_id, rating, text, sentiment_score, created_at"#,
    )
    .bind(&id)
    .bind(product_id)
    .bind(user_id)
    .bind(pending.rating)
    .bind(&pending.text)
    .bind(pending.sentiment_score)
    .fetch_one(pool)
    .await
}

pub async fn fetch_review(pool: &PgPool, id: &str) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, product_id, user_id, rating, text, sentiment_score, created_at
           FROM reviews WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_reviews_for_product(pool: &PgPool, product_id: &str) -> Result<Vec<Review>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, product_id, user_id, rating, text, sentiment_score, created_at
           FROM reviews WHERE product_id = $1 ORDER BY created_at DESC, id"#,
    )
    .bind(product_id)
    .fetch_all(pool)
    .await
}

/// Outcome of an edit attempt by a given user.
pub enum ReviewEdit {
    Updated(Review),
    NotFound,
    NotAuthor,
    Invalid(ReviewError),
}

/// Apply an edit in one transaction: the row is locked, rescored from the
/// merged text and rewritten in a single statement.
pub async fn edit_review(
    pool: &PgPool,
    id: &str,
    user_id: &str,
    update: UpdateReviewRequest,
    analyzer: &SentimentAnalyzer,
) -> Result<ReviewEdit, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing: Option<Review> = sqlx::query_as(
        r#"SELECT id, product_id, user_id, rating, text, sentiment_score, created_at
           FROM reviews WHERE id = $1 FOR UPDATE"#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        return Ok(ReviewEdit::NotFound);
    };
    if existing.user_id != user_id {
        return Ok(ReviewEdit::NotAuthor);
    }
    let pending = match PendingReview::from_update(&existing, update, analyzer) {
        Ok(p) => p,
        Err(e) => return Ok(ReviewEdit::Invalid(e)),
    };

    let review: Review = sqlx::query_as(
        r#"UPDATE reviews SET rating = $2, text = $3, sentiment_score = $4
           WHERE id = $1
           RETURNING id, product_id, user_id, rating, text, sentiment_score, created_at"#,
    )
    .bind(id)
    .bind(pending.rating)
    .bind(&pending.text)
    .bind(pending.sentiment_score)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ReviewEdit::Updated(review))
}

/// Counts from one [`rescore_all`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RescoreSummary {
    pub scanned: usize,
    /// Rows actually rewritten. A review whose text changed after it was read
    /// is skipped and not counted.
    pub changed: u64,
}

/// Recompute the stored sentiment of every review from its current text, in
/// one transaction.
pub async fn rescore_all(pool: &PgPool, analyzer: &SentimentAnalyzer) -> Result<RescoreSummary, sqlx::Error> {
    let rows: Vec<(String, String, f64)> =
        sqlx::query_as("SELECT id, text, sentiment_score FROM reviews ORDER BY id")
            .fetch_all(pool)
            .await?;

    let mut tx = pool.begin().await?;
    let mut summary = RescoreSummary {
        scanned: rows.len(),
        changed: 0,
    };
    for (id, text, stored) in &rows {
        let fresh = analyzer.compound(text);
        if fresh == *stored {
            continue;
        }
        // Guard on the text so a concurrent edit is not overwritten with a
        // score for the old text.
        let affected = sqlx::query("UPDATE reviews SET sentiment_score = $2 WHERE id = $1 AND text = $3")
            .bind(id)
            .bind(fresh)
            .bind(text)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected > 0 {
            tracing::debug!(review_id = %id, old = stored, new = fresh, "Rescored");
        } else {
            tracing::debug!(review_id = %id, "Review edited since read, left alone");
        }
        summary.changed += affected;
    }
    tx.commit().await?;
    Ok(summary)
}

#[utoipa::path(
    post,
    path = "/products/{id}/reviews",
    params(("id" = String, Path, description = "Product id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 200, description = "Review stored with derived sentiment", body = ReviewResponse),
        (status = 400, description = "Rating out of range"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown product")
    ),
    tag = "reviews"
)]
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(product_id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<ReviewResponse>, StatusCode> {
    let pending = PendingReview::new(
        req.rating.unwrap_or(DEFAULT_RATING),
        req.text,
        &state.analyzer,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected review");
        StatusCode::BAD_REQUEST
    })?;

    let review = insert_review(&state.pool, &product_id, &user.id, &pending)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StatusCode::NOT_FOUND,
            e => {
                tracing::error!(error = %e, product_id = %product_id, "Failed to insert review");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    state.scores.invalidate(&product_id);
    tracing::debug!(
        review_id = %review.id,
        product_id = %product_id,
        sentiment = review.sentiment_score,
        "Review created"
    );

    Ok(Json(ReviewResponse {
        success: true,
        review: Some(review),
        message: Some("Review created".to_string()),
    }))
}

#[utoipa::path(
    patch,
    path = "/reviews/{id}",
    params(("id" = String, Path, description = "Review id")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated and rescored", body = ReviewResponse),
        (status = 400, description = "Rating out of range"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Unknown review")
    ),
    tag = "reviews"
)]
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, StatusCode> {
    let edit = edit_review(&state.pool, &id, &user.id, req, &state.analyzer)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, review_id = %id, "Failed to update review");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match edit {
        ReviewEdit::Updated(review) => {
            state.scores.invalidate(&review.product_id);
            tracing::debug!(review_id = %review.id, sentiment = review.sentiment_score, "Review updated");
            Ok(Json(ReviewResponse {
                success: true,
                review: Some(review),
                message: Some("Review updated".to_string()),
            }))
        }
        ReviewEdit::NotFound => Err(StatusCode::NOT_FOUND),
        ReviewEdit::NotAuthor => Err(StatusCode::FORBIDDEN),
        ReviewEdit::Invalid(e) => {
            tracing::debug!(error = %e, review_id = %id, "Rejected review edit");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

#[utoipa::path(
    get,
    path = "/products/{id}/reviews",
    params(("id" = String, Path, description = "Product id")),
    responses((status = 200, description = "Reviews, newest first", body = [Review])),
    tag = "reviews"
)]
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<Review>>, StatusCode> {
    let reviews = fetch_reviews_for_product(&state.pool, &product_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, product_id = %product_id, "Failed to list reviews");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(reviews))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(pending: &PendingReview) -> Review {
        Review {
            id: "r1".to_string(),
            product_id: "p1".to_string(),
            user_id: "u1".to_string(),
            rating: pending.rating(),
            text: pending.text().to_string(),
            sentiment_score: pending.sentiment_score(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_review_is_scored_from_text() {
        let analyzer = SentimentAnalyzer::new();
        let pending = PendingReview::new(5, "Great hoodie, love it".to_string(), &analyzer).unwrap();
        assert_eq!(pending.sentiment_score(), analyzer.compound("Great hoodie, love it"));
        assert!(pending.sentiment_score() > 0.0);
    }

    #[test]
    fn test_rating_bounds() {
        let analyzer = SentimentAnalyzer::new();
        assert_eq!(
            PendingReview::new(0, "ok".to_string(), &analyzer),
            Err(ReviewError::RatingOutOfRange(0))
        );
        assert_eq!(
            PendingReview::new(6, "ok".to_string(), &analyzer),
            Err(ReviewError::RatingOutOfRange(6))
        );
        assert!(PendingReview::new(MIN_RATING, "ok".to_string(), &analyzer).is_ok());
        assert!(PendingReview::new(MAX_RATING, "ok".to_string(), &analyzer).is_ok());
    }

    #[test]
    fn test_empty_text_is_neutral() {
        let analyzer = SentimentAnalyzer::new();
        let pending = PendingReview::new(DEFAULT_RATING, String::new(), &analyzer).unwrap();
        assert_eq!(pending.sentiment_score(), 0.0);
    }

    #[test]
    fn test_text_edit_rescores() {
        let analyzer = SentimentAnalyzer::new();
        let original = stored(&PendingReview::new(4, "Great fit".to_string(), &analyzer).unwrap());

        let edited = PendingReview::from_update(
            &original,
            UpdateReviewRequest {
                rating: None,
                text: Some("Terrible fit, returned it".to_string()),
            },
            &analyzer,
        )
        .unwrap();

        assert_eq!(edited.rating(), 4);
        assert!(edited.sentiment_score() < 0.0);
        assert_ne!(edited.sentiment_score(), original.sentiment_score);
    }

    #[test]
    fn test_rating_edit_keeps_sentiment() {
        let analyzer = SentimentAnalyzer::new();
        let original = stored(&PendingReview::new(4, "Great fit".to_string(), &analyzer).unwrap());

        let edited = PendingReview::from_update(
            &original,
            UpdateReviewRequest {
                rating: Some(2),
                text: None,
            },
            &analyzer,
        )
        .unwrap();

        assert_eq!(edited.rating(), 2);
        assert_eq!(edited.text(), "Great fit");
        assert_eq!(edited.sentiment_score(), original.sentiment_score);
    }

    async fn insert_scored_review(pool: &PgPool, text: &str, sentiment: f64) -> String {
        let product_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO products (id, name, slug) VALUES ($1, 'Linen Shirt', $1)")
            .bind(&product_id)
            .execute(pool)
            .await
            .unwrap();
        let review_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO reviews (id, product_id, user_id, rating, text, sentiment_score)
               VALUES ($1, $2, 'u1', 4, $3, $4)"#,
        )
        .bind(&review_id)
        .bind(&product_id)
        .bind(text)
        .bind(sentiment)
        .execute(pool)
        .await
        .unwrap();
        review_id
    }

    #[tokio::test]
    async fn test_rescore_fixes_stale_sentiment_and_counts_it() {
        let Some(pool) = crate::db::test_pool().await else {
            return;
        };
        let analyzer = SentimentAnalyzer::new();
        let text = "Absolutely love this shirt!";
        let stale = insert_scored_review(&pool, text, -0.5).await;
        let current = insert_scored_review(&pool, "Fine", analyzer.compound("Fine")).await;

        let summary = rescore_all(&pool, &analyzer).await.unwrap();
        assert!(summary.changed >= 1);
        assert!(summary.changed <= summary.scanned as u64);

        let fixed = fetch_review(&pool, &stale).await.unwrap().unwrap();
        assert_eq!(fixed.sentiment_score, analyzer.compound(text));
        let kept = fetch_review(&pool, &current).await.unwrap().unwrap();
        assert_eq!(kept.sentiment_score, analyzer.compound("Fine"));

        // Nothing left to rewrite for these rows on a second pass.
        let again = rescore_all(&pool, &analyzer).await.unwrap();
        assert!(again.changed <= summary.changed);
    }

    #[tokio::test]
    async fn test_reviews_reference_products_only() {
        let Some(pool) = crate::db::test_pool().await else {
            return;
        };
        let references: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT kcu.column_name::TEXT, ccu.table_name::TEXT, rc.delete_rule::TEXT
               FROM information_schema.referential_constraints rc
               JOIN information_schema.key_column_usage kcu
                 ON kcu.constraint_name = rc.constraint_name
               JOIN information_schema.constraint_column_usage ccu
                 ON ccu.constraint_name = rc.constraint_name
               WHERE kcu.table_name = 'reviews'"#,
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            references,
            vec![("product_id".to_string(), "products".to_string(), "CASCADE".to_string())]
        );
    }

    #[test]
    fn test_invalid_rating_edit_is_rejected() {
        let analyzer = SentimentAnalyzer::new();
        let original = stored(&PendingReview::new(4, "Great fit".to_string(), &analyzer).unwrap());
        let result = PendingReview::from_update(
            &original,
            UpdateReviewRequest {
                rating: Some(9),
                text: None,
            },
            &analyzer,
        );
        assert_eq!(result, Err(ReviewError::RatingOutOfRange(9)));
    }
}
