use crate::governor_conf::get_governor_conf;
use crate::server::cors::cors_layer;
use crate::server::handlers::{
    analyze_and_recommend_handler, analyze_handler, cleanup_handler, health_handler,
    recommend_handler, server_status_handler, upload_handler,
};
use crate::server::error::ApiError;
use crate::server::types::AppState;
use anyhow::Error;
use axum::extract::DefaultBodyLimit;
use axum::http::{StatusCode, header};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get, routing::post};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Result<Router, Error> {
    let config = &state.config;

    let mut api = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/recommend", post(recommend_handler))
        .route(
            "/api/analyze-and-recommend",
            post(analyze_and_recommend_handler),
        )
        .route("/api/cleanup", post(cleanup_handler));

    if config.rate_limit_burst > 0 {
        let governor_conf = get_governor_conf(config.rate_limit_burst)?;
        api = api.layer(GovernorLayer {
            config: Arc::new(governor_conf),
        });
    } else {
        tracing::warn!("rate limiting disabled");
    }

    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout);
    // multipart uploads are bounded by our own limit, not axum's 2MB default
    let request_body_limit = RequestBodyLimitLayer::new(config.request_body_limit());

    let router = Router::new()
        .route("/", get(server_status_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .layer(DefaultBodyLimit::disable())
        .layer(request_body_limit)
        .layer(map_response(body_limit_as_json))
        .layer(timeout)
        .layer(cors_layer(config.allowed_origins()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

// tower-http rejects an oversized Content-Length with a plain text 413
async fn body_limit_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::PayloadTooLarge("request body exceeds the server limit".to_string())
            .into_response();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::analysis::FaceAnalysis;
    use crate::core::fallback::fallback_recommendations;
    use crate::core::features::tests::oval_mesh;
    use crate::core::landmarks::{Detection, DetectorError, LandmarkDetector};
    use crate::core::recommender::tests::sample_analysis;
    use crate::core::recommender::{Preferences, Recommendations, Recommender, RecommenderError};
    use crate::core::uploads::tests::png_bytes;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tower::ServiceExt;

    const BOUNDARY: &str = "----makeup-advisor-test";

    struct StubDetector {
        faces: usize,
        delay: Duration,
    }

    #[async_trait]
    impl LandmarkDetector for StubDetector {
        async fn detect(
            &self,
            image: &Path,
            _content_type: &str,
        ) -> Result<Detection, DetectorError> {
            // the staged file must exist while the detector reads it
            assert!(image.exists());
            tokio::time::sleep(self.delay).await;
            Ok(Detection {
                image_width: 64,
                image_height: 64,
                faces: (0..self.faces).map(|_| oval_mesh()).collect(),
            })
        }
    }

    struct StubRecommender {
        configured: bool,
        seen: Mutex<Vec<Preferences>>,
    }

    #[async_trait]
    impl Recommender for StubRecommender {
        async fn recommend(
            &self,
            analysis: &FaceAnalysis,
            preferences: &Preferences,
        ) -> Result<Recommendations, RecommenderError> {
            self.seen.lock().unwrap().push(preferences.clone());
            Ok(Recommendations {
                model: Some("stub".to_string()),
                fallback: false,
                ..fallback_recommendations(analysis)
            })
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    struct Harness {
        router: Router,
        dir: tempfile::TempDir,
        recommender: Arc<StubRecommender>,
    }

    impl Harness {
        fn new(faces: usize, configured: bool) -> Self {
            Self::with_limit(faces, configured, 1024 * 1024)
        }

        fn with_limit(faces: usize, configured: bool, max_upload_bytes: usize) -> Self {
            Self::build(faces, Duration::ZERO, configured, |config| {
                config.max_upload_bytes = max_upload_bytes;
            })
        }

        fn build(
            faces: usize,
            delay: Duration,
            configured: bool,
            tweak: impl FnOnce(&mut Config),
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let recommender = Arc::new(StubRecommender {
                configured,
                seen: Mutex::new(Vec::new()),
            });
            let mut config = Config {
                upload_dir: dir.path().join("uploads"),
                rate_limit_burst: 0,
                ..Config::default()
            };
            tweak(&mut config);
            let state = Arc::new(AppState {
                config,
                detector: Arc::new(StubDetector { faces, delay }),
                recommender: recommender.clone(),
            });
            Self {
                router: build_router(state).unwrap(),
                dir,
                recommender,
            }
        }

        fn staged_files(&self) -> usize {
            match std::fs::read_dir(self.dir.path().join("uploads")) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
            (status, json)
        }
    }

    enum FormPart<'a> {
        File {
            filename: &'a str,
            content_type: &'a str,
            bytes: Vec<u8>,
        },
        Text {
            name: &'a str,
            value: &'a str,
        },
    }

    fn multipart_request(uri: &str, parts: Vec<FormPart<'_>>) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                FormPart::File {
                    filename,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            filename, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                FormPart::Text { name, value } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                            name, value
                        )
                        .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn selfie() -> FormPart<'static> {
        FormPart::File {
            filename: "selfie.png",
            content_type: "image/png",
            bytes: png_bytes(64, 64),
        }
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let harness = Harness::new(1, true);

        let (status, json) = harness
            .send(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "running");

        let (status, json) = harness
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["recommender_configured"], true);
    }

    #[tokio::test]
    async fn test_upload_validates_and_removes_file() {
        let harness = Harness::new(1, true);
        let (status, json) = harness
            .send(multipart_request("/api/upload", vec![selfie()]))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["file"]["width"], 64);
        assert_eq!(json["file"]["content_type"], "image/png");
        assert!(json["file"]["checksum"].as_str().unwrap().starts_with("0x"));
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_analyze_returns_features_and_cleans_up() {
        let harness = Harness::new(1, true);
        let (status, json) = harness
            .send(multipart_request("/api/analyze", vec![selfie()]))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analysis"]["face_detected"], true);
        assert_eq!(json["analysis"]["face_shape"], "oval");
        assert_eq!(json["analysis"]["skin_tone"]["rgb"], json!([210, 160, 130]));
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_type() {
        let harness = Harness::new(1, true);
        let (status, json) = harness
            .send(multipart_request(
                "/api/analyze",
                vec![FormPart::File {
                    filename: "notes.txt",
                    content_type: "text/plain",
                    bytes: b"hello".to_vec(),
                }],
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_rejects_disguised_file() {
        let harness = Harness::new(1, true);
        let (status, _) = harness
            .send(multipart_request(
                "/api/upload",
                vec![FormPart::File {
                    filename: "selfie.jpg",
                    content_type: "image/jpeg",
                    bytes: b"definitely not a jpeg".to_vec(),
                }],
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_missing_file() {
        let harness = Harness::new(1, true);
        let (status, _) = harness
            .send(multipart_request(
                "/api/upload",
                vec![FormPart::File {
                    filename: "selfie.png",
                    content_type: "image/png",
                    bytes: Vec::new(),
                }],
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = harness
            .send(multipart_request(
                "/api/upload",
                vec![FormPart::Text {
                    name: "occasion",
                    value: "party",
                }],
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("no file"));
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_rejects_oversized_upload() {
        let harness = Harness::with_limit(1, true, 1024);
        let mut bytes = png_bytes(4, 4);
        bytes.extend(std::iter::repeat_n(7u8, 4096));

        let (status, json) = harness
            .send(multipart_request(
                "/api/analyze",
                vec![FormPart::File {
                    filename: "big.png",
                    content_type: "image/png",
                    bytes,
                }],
            ))
            .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["status"], "error");
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_no_face_detected() {
        let harness = Harness::new(0, true);
        let (status, json) = harness
            .send(multipart_request("/api/analyze", vec![selfie()]))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "error");
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_analyze_and_recommend_returns_both() {
        let harness = Harness::new(2, true);
        let (status, json) = harness
            .send(multipart_request(
                "/api/analyze-and-recommend",
                vec![
                    FormPart::Text {
                        name: "occasion",
                        value: "wedding",
                    },
                    selfie(),
                    FormPart::Text {
                        name: "concerns",
                        value: "redness, fine lines",
                    },
                ],
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["analysis"]["face_count"], 2);
        assert_eq!(json["recommendations"]["model"], "stub");
        assert_eq!(
            json["recommendations"]["recommended_looks"].as_array().unwrap().len(),
            3
        );
        assert!(json["recommendations"]["color_palette"]["lips"].is_array());
        assert_eq!(harness.staged_files(), 0);

        let seen = harness.recommender.seen.lock().unwrap();
        assert_eq!(seen[0].occasion.as_deref(), Some("wedding"));
        assert_eq!(seen[0].concerns.len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_and_recommend_unconfigured() {
        let harness = Harness::new(1, false);
        let (status, json) = harness
            .send(multipart_request("/api/analyze-and-recommend", vec![selfie()]))
            .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "error");
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_recommend_from_analysis_json() {
        let harness = Harness::new(1, true);
        let body = json!({
            "analysis": sample_analysis(),
            "preferences": {"style": "natural"}
        });
        let (status, json) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/recommend")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["recommendations"]["model"], "stub");
        assert_eq!(
            harness.recommender.seen.lock().unwrap()[0].style.as_deref(),
            Some("natural")
        );
    }

    #[tokio::test]
    async fn test_recommend_rejects_malformed_json() {
        let harness = Harness::new(1, true);
        let (status, json) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/recommend")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"analysis\": 3}"))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_cleanup_endpoint_sweeps_only_aged_files() {
        let harness = Harness::new(1, true);
        let uploads = harness.dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        // older than the configured max file age
        let orphan = uploads.join("orphan.jpg");
        std::fs::write(&orphan, b"x").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&orphan)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        // a request still in flight
        let fresh = uploads.join("in-flight.png");
        std::fs::write(&fresh, b"y").unwrap();

        let (status, json) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/cleanup?max_age_secs=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report"]["scanned"], 2);
        assert_eq!(json["report"]["removed"], 1);
        assert!(!orphan.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_request_over_body_limit_is_json() {
        let harness = Harness::with_limit(1, true, 1024);
        let mut bytes = png_bytes(4, 4);
        bytes.extend(std::iter::repeat_n(7u8, 200 * 1024));

        let mut request = multipart_request(
            "/api/analyze",
            vec![FormPart::File {
                filename: "huge.png",
                content_type: "image/png",
                bytes,
            }],
        );
        let length = axum::body::HttpBody::size_hint(request.body())
            .exact()
            .unwrap();
        request
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());

        let response = harness.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_multipart_body() {
        let harness = Harness::new(1, true);
        let (status, json) = harness
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/analyze")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_slow_analysis_times_out_and_cleans_up() {
        let harness = Harness::build(1, Duration::from_secs(5), true, |config| {
            config.request_timeout = Duration::from_millis(100);
        });
        let (status, _) = harness
            .send(multipart_request("/api/analyze", vec![selfie()]))
            .await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(harness.staged_files(), 0);
    }
}
