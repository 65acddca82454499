use catalog_popularity::{api, config::Config, db, popularity, products, reviews, sentiment};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        products::list_catalog,
        products::create_product,
        products::get_product,
        products::update_product,
        products::add_to_cart,
        products::get_popularity,
        reviews::list_reviews,
        reviews::create_review,
        reviews::update_review,
        api::analyze_text
    ),
    components(
        schemas(
            products::Product,
            products::CreateProductRequest,
            products::UpdateProductRequest,
            products::ProductResponse,
            products::ProductDetail,
            products::CatalogEntry,
            products::CartResponse,
            reviews::Review,
            reviews::CreateReviewRequest,
            reviews::UpdateReviewRequest,
            reviews::ReviewResponse,
            popularity::PopularityBreakdown,
            api::SentimentRequest,
            sentiment::SentimentScores,
            sentiment::SentimentLabel
        )
    ),
    tags(
        (name = "catalog", description = "Products ranked by popularity"),
        (name = "reviews", description = "Reviews with derived sentiment"),
        (name = "sentiment", description = "Text polarity")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    db::init_db(&pool).await?;

    let bind_addr = config.bind_addr.clone();
    if !config.score_cache_ttl.is_zero() {
        tracing::info!(ttl_secs = config.score_cache_ttl.as_secs(), "Popularity score cache enabled");
    }
    let state = Arc::new(api::AppState::new(pool, config));

    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            purge_state.scores.purge_expired();
        }
    });

    let app = api::router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
