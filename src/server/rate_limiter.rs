use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::SocketAddr;
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

// set by the SPA per browser session
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

#[derive(Clone)]
pub struct ClientKeyExtractor;

impl KeyExtractor for ClientKeyExtractor {
    type Key = String;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        if let Some(client_id) = headers.get(CLIENT_ID_HEADER) {
            let client_id = client_id
                .to_str()
                .map_err(|_| GovernorError::UnableToExtractKey)?
                .trim();
            if !client_id.is_empty() {
                return Ok(format!("client:{}", client_id));
            }
        }

        match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ip) => Ok(ip.0.ip().to_string()),
            None => Err(GovernorError::UnableToExtractKey),
        }
    }
}
