//! Client for the face mesh landmark sidecar.
//!
//! The sidecar wraps MediaPipe Face Mesh and answers `POST /detect` (multipart
//! field `image`) with the 468 landmarks of every face it finds, normalized to
//! `[0, 1]` against the image dimensions.

use crate::config::LandmarkServiceConfig;
use crate::utils::urls::join_path;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Number of points in a MediaPipe face mesh (without iris refinement).
pub const FACE_MESH_POINTS: usize = 468;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(4);

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("no face detected")]
    NoFace,

    #[error("landmark service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("landmark request failed: {0}")]
    RequestFailed(String),

    #[error("invalid landmarks: {0}")]
    InvalidLandmarks(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectorError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DetectorError::ServiceUnavailable(_) => true,
            DetectorError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub landmarks: Vec<Landmark>,
}

impl FaceLandmarks {
    /// Landmark `index` in pixel coordinates.
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Option<(f64, f64)> {
        self.landmarks
            .get(index)
            .map(|p| (p.x as f64 * width as f64, p.y as f64 * height as f64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default)]
    pub faces: Vec<FaceLandmarks>,
}

impl Detection {
    /// The face analysis runs on; the sidecar orders faces by confidence.
    pub fn primary_face(&self) -> Result<&FaceLandmarks, DetectorError> {
        let face = self.faces.first().ok_or(DetectorError::NoFace)?;
        if face.landmarks.len() < FACE_MESH_POINTS {
            return Err(DetectorError::InvalidLandmarks(format!(
                "expected {} landmarks, got {}",
                FACE_MESH_POINTS,
                face.landmarks.len()
            )));
        }
        Ok(face)
    }
}

#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    async fn detect(&self, image: &Path, content_type: &str) -> Result<Detection, DetectorError>;

    /// Liveness of the backing detector, reported by `/health`.
    async fn health(&self) -> bool {
        true
    }
}

pub struct MeshServiceDetector {
    http: Client,
    config: LandmarkServiceConfig,
}

impl MeshServiceDetector {
    pub fn new(config: LandmarkServiceConfig) -> Result<Self, DetectorError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    async fn detect_once(
        &self,
        image: &Path,
        content_type: &str,
    ) -> Result<Detection, DetectorError> {
        let file = tokio::fs::File::open(image).await?;
        let length = file.metadata().await?.len();
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str(content_type)?;
        let form = Form::new().part("image", part);

        let url = join_path(&self.config.base_url, "detect");
        let response = self.http.post(&url).multipart(form).send().await?;

        match response.status() {
            status if status.is_success() => {
                let detection: Detection = response.json().await.map_err(|e| {
                    DetectorError::InvalidLandmarks(format!("malformed detector response: {}", e))
                })?;
                debug!(
                    "landmark service found {} face(s) in {}x{} image",
                    detection.faces.len(),
                    detection.image_width,
                    detection.image_height
                );
                Ok(detection)
            }
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                let status = response.status();
                Err(DetectorError::ServiceUnavailable(format!(
                    "{} from {}",
                    status, url
                )))
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(DetectorError::RequestFailed(format!(
                    "{} - {}",
                    status, error_text
                )))
            }
        }
    }
}

#[async_trait]
impl LandmarkDetector for MeshServiceDetector {
    async fn detect(&self, image: &Path, content_type: &str) -> Result<Detection, DetectorError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            match self.detect_once(image, content_type).await {
                Ok(detection) => return Ok(detection),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "landmark service attempt {} failed ({}), retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health(&self) -> bool {
        let url = join_path(&self.config.base_url, "health");
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                info!("landmark service health check returned {}", response.status());
                false
            }
            Err(e) => {
                info!("landmark service health check error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn mesh_json(points: usize) -> serde_json::Value {
        let landmarks: Vec<_> = (0..points)
            .map(|i| json!({"x": 0.5, "y": (i % 100) as f32 / 100.0, "z": 0.0}))
            .collect();
        json!({
            "image_width": 640,
            "image_height": 480,
            "faces": [{"landmarks": landmarks}]
        })
    }

    fn detector_for(server: &MockServer, max_retries: u32) -> MeshServiceDetector {
        MeshServiceDetector::new(LandmarkServiceConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries,
        })
        .unwrap()
    }

    fn temp_image() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"\x89PNG\r\n\x1a\nnot really a png").unwrap();
        file
    }

    #[tokio::test]
    async fn test_detect_parses_faces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mesh_json(468)))
            .expect(1)
            .mount(&server)
            .await;

        let image = temp_image();
        let detection = detector_for(&server, 0)
            .detect(image.path(), "image/png")
            .await
            .unwrap();

        assert_eq!(detection.image_width, 640);
        assert_eq!(detection.faces.len(), 1);
        assert!(detection.primary_face().is_ok());
    }

    #[tokio::test]
    async fn test_detect_retries_cold_start() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mesh_json(468)))
            .mount(&server)
            .await;

        let image = temp_image();
        let detection = detector_for(&server, 2)
            .detect(image.path(), "image/png")
            .await
            .unwrap();
        assert_eq!(detection.faces.len(), 1);
    }

    #[tokio::test]
    async fn test_detect_retries_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mesh_json(468)))
            .expect(1)
            .mount(&server)
            .await;

        let image = temp_image();
        let detection = detector_for(&server, 1)
            .detect(image.path(), "image/png")
            .await
            .unwrap();
        assert_eq!(detection.faces.len(), 1);
    }

    #[tokio::test]
    async fn test_detect_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(504))
            .expect(3)
            .mount(&server)
            .await;

        let image = temp_image();
        let err = detector_for(&server, 2)
            .detect(image.path(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_detect_retries_refused_connection() {
        // a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let detector = MeshServiceDetector::new(LandmarkServiceConfig {
            base_url: format!("http://{}", addr),
            timeout: Duration::from_secs(2),
            max_retries: 1,
        })
        .unwrap();

        let image = temp_image();
        let err = detector.detect(image.path(), "image/png").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, DetectorError::Network(ref e) if e.is_connect()));
    }

    #[tokio::test]
    async fn test_detect_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad image"))
            .expect(1)
            .mount(&server)
            .await;

        let image = temp_image();
        let err = detector_for(&server, 3)
            .detect(image.path(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::RequestFailed(_)));
    }

    #[test]
    fn test_primary_face_errors() {
        let empty = Detection {
            image_width: 10,
            image_height: 10,
            faces: vec![],
        };
        assert!(matches!(empty.primary_face(), Err(DetectorError::NoFace)));

        let partial: Detection = serde_json::from_value(mesh_json(10)).unwrap();
        assert!(matches!(
            partial.primary_face(),
            Err(DetectorError::InvalidLandmarks(_))
        ));
    }
}
