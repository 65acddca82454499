pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod popularity;
pub mod products;
pub mod reviews;
pub mod sentiment;

pub use popularity::compute_popularity;
pub use sentiment::compute_sentiment;
