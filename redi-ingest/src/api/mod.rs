//! HTTP API handlers for redi-ingest

pub mod fallback;
pub mod health;
pub mod property;
pub mod sessions;
pub mod upload;

pub use fallback::fallback_routes;
pub use health::health_routes;
pub use property::property_routes;
pub use sessions::session_routes;
pub use upload::upload_routes;
