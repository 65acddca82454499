//! Products, their engagement counters and the ranked catalog.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::AppState;
use crate::db;
use crate::popularity::{rank_products, PopularityBreakdown};
use crate::reviews::{self, Review};

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub views: i64,
    pub cart_adds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub success: bool,
    pub product: Option<Product>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    /// Newest first.
    pub reviews: Vec<Review>,
    pub popularity: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogEntry {
    pub product: Product,
    pub score: f64,
    pub review_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub success: bool,
    pub cart_adds: i64,
}

/// Only a slug collision is the caller's fault; anything else failed on our side.
fn insert_error_status(e: &sqlx::Error) -> StatusCode {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

const PRODUCT_COLUMNS: &str = "id, name, slug, description, views, cart_adds, created_at, updated_at";

pub async fn init_products_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS products (
            id VARCHAR PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            slug VARCHAR(100) NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );"#,
    )
    .execute(pool)
    .await?;

    // Engagement counters were added after the base schema.
    sqlx::query("ALTER TABLE products ADD COLUMN IF NOT EXISTS views BIGINT NOT NULL DEFAULT 0;")
        .execute(pool)
        .await?;
    sqlx::query("ALTER TABLE products ADD COLUMN IF NOT EXISTS cart_adds BIGINT NOT NULL DEFAULT 0;")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let sql = format!("SELECT {} FROM products", PRODUCT_COLUMNS);
    sqlx::query_as(&sql).fetch_all(pool).await
}

/// Bump the view counter of the product whose id or slug is `key` and return
/// it. An id match wins over a slug match. `updated_at` is untouched: being
/// looked at is not an edit.
pub async fn record_view(pool: &PgPool, key: &str) -> Result<Option<Product>, sqlx::Error> {
    let sql = format!(
        r#"UPDATE products SET views = views + 1
           WHERE id = (
               SELECT id FROM products WHERE id = $1 OR slug = $1
               ORDER BY (id = $1) DESC LIMIT 1
           )
           RETURNING {}"#,
        PRODUCT_COLUMNS
    );
    sqlx::query_as(&sql).bind(key).fetch_optional(pool).await
}

pub async fn record_cart_add(pool: &PgPool, id: &str) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("UPDATE products SET cart_adds = cart_adds + 1 WHERE id = $1 RETURNING cart_adds")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[utoipa::path(
    get,
    path = "/products",
    responses((status = 200, description = "Products, most popular first", body = [CatalogEntry])),
    tag = "catalog"
)]
pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CatalogEntry>>, StatusCode> {
    let stats = db::fetch_all_stats(&state.pool).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load product stats");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let products = fetch_products(&state.pool).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load products");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let now = Utc::now();
    let ranked = rank_products(&stats, state.config.zero_review_policy, |s| {
        state.scores.get_or_compute(&s.product_id, || s.score(now))
    });

    let mut by_id: HashMap<String, Product> = products.into_iter().map(|p| (p.id.clone(), p)).collect();
    let entries: Vec<CatalogEntry> = ranked
        .into_iter()
        .filter_map(|r| {
            by_id.remove(&r.product_id).map(|product| CatalogEntry {
                product,
                score: r.score,
                review_count: r.review_count,
            })
        })
        .collect();

    tracing::info!(
        products = entries.len(),
        policy = ?state.config.zero_review_policy,
        "Ranked catalog"
    );
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/products",
    request_body = CreateProductRequest,
    responses(
        (status = 200, description = "Product created", body = ProductResponse),
        (status = 400, description = "Empty name or duplicate slug"),
        (status = 500, description = "Storage failure")
    ),
    tag = "catalog"
)]
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<ProductResponse>, StatusCode> {
    let slug = req
        .slug
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| slugify(&req.name));
    if req.name.trim().is_empty() || slug.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let product: Product = sqlx::query_as(&format!(
        "INSERT INTO products (id, name, slug, description) VALUES ($1, $2, $3, $4) RETURNING {}",
        PRODUCT_COLUMNS
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&req.name)
    .bind(&slug)
    .bind(req.description.unwrap_or_default())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        let status = insert_error_status(&e);
        if status == StatusCode::BAD_REQUEST {
            tracing::warn!(error = %e, slug = %slug, "Duplicate product slug");
        } else {
            tracing::error!(error = %e, slug = %slug, "Failed to create product");
        }
        status
    })?;

    Ok(Json(ProductResponse {
        success: true,
        product: Some(product),
        message: Some("Product created".to_string()),
    }))
}

#[utoipa::path(
    patch,
    path = "/products/{id}",
    params(("id" = String, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 404, description = "Unknown product")
    ),
    tag = "catalog"
)]
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, StatusCode> {
    let product: Option<Product> = sqlx::query_as(&format!(
        r#"UPDATE products SET
           name = COALESCE($2, name),
           description = COALESCE($3, description),
           updated_at = NOW()
           WHERE id = $1 RETURNING {}"#,
        PRODUCT_COLUMNS
    ))
    .bind(&id)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, product_id = %id, "Failed to update product");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let product = product.ok_or(StatusCode::NOT_FOUND)?;
    state.scores.invalidate(&id);

    Ok(Json(ProductResponse {
        success: true,
        product: Some(product),
        message: Some("Product updated".to_string()),
    }))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = String, Path, description = "Product id or slug")),
    responses(
        (status = 200, description = "Product detail; counts as a view", body = ProductDetail),
        (status = 404, description = "Unknown product")
    ),
    tag = "catalog"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ProductDetail>, StatusCode> {
    let product = record_view(&state.pool, &key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, product = %key, "Failed to record view");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    let id = product.id.clone();
    state.scores.invalidate(&id);

    let reviews = reviews::fetch_reviews_for_product(&state.pool, &id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, product_id = %id, "Failed to load reviews");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    // A broken score must not take the page down with it.
    let popularity = match db::fetch_product_stats(&state.pool, &id).await {
        Ok(Some(stats)) => stats.score(Utc::now()),
        Ok(None) => 0.0,
        Err(e) => {
            tracing::warn!(error = %e, product_id = %id, "Failed to score product");
            0.0
        }
    };

    Ok(Json(ProductDetail {
        product,
        reviews,
        popularity,
    }))
}

#[utoipa::path(
    post,
    path = "/products/{id}/cart",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Cart add recorded", body = CartResponse),
        (status = 404, description = "Unknown product")
    ),
    tag = "catalog"
)]
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, StatusCode> {
    let cart_adds = record_cart_add(&state.pool, &id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, product_id = %id, "Failed to record cart add");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    state.scores.invalidate(&id);

    Ok(Json(CartResponse {
        success: true,
        cart_adds,
    }))
}

#[utoipa::path(
    get,
    path = "/products/{id}/popularity",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Every term of the popularity score", body = PopularityBreakdown),
        (status = 404, description = "Unknown product")
    ),
    tag = "catalog"
)]
pub async fn get_popularity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PopularityBreakdown>, StatusCode> {
    let stats = db::fetch_product_stats(&state.pool, &id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, product_id = %id, "Failed to load product stats");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(stats.breakdown(Utc::now())))
}
