use crate::utils::urls::to_origin;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub fn is_allowed_origin(origin: Option<&str>, allowed_origins: &[String]) -> bool {
    match origin.and_then(to_origin) {
        None => false,
        Some(origin) => allowed_origins.contains(&origin),
    }
}

pub fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    tracing::info!("CORS allowed origins: {:?}", allowed_origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                is_allowed_origin(origin.to_str().ok(), &allowed_origins)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
