pub mod cors;
pub mod error;
pub mod handlers;
pub mod rate_limiter;
pub mod router;
pub mod types;
