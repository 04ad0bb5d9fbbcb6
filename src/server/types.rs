use crate::config::Config;
use crate::core::analysis::FaceAnalysis;
use crate::core::landmarks::LandmarkDetector;
use crate::core::recommender::{Preferences, Recommendations, Recommender};
use crate::core::uploads::{UploadInfo, UploadLimits};
use crate::orchestrator::cron::CleanupReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub detector: Arc<dyn LandmarkDetector>,
    pub recommender: Arc<dyn Recommender>,
}

impl AppState {
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            dir: self.config.upload_dir.clone(),
            max_bytes: self.config.max_upload_bytes,
        }
    }
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub landmark_service: String,
    pub recommender_configured: bool,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub file: UploadInfo,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct AnalyzeResponse {
    pub status: String,
    pub analysis: FaceAnalysis,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RecommendRequest {
    pub analysis: FaceAnalysis,
    #[serde(default)]
    pub preferences: Preferences,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct RecommendResponse {
    pub status: String,
    pub recommendations: Recommendations,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct AnalyzeAndRecommendResponse {
    pub status: String,
    pub analysis: FaceAnalysis,
    pub recommendations: Recommendations,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct CleanupResponse {
    pub status: String,
    pub report: CleanupReport,
}

pub const SUCCESS: &str = "success";
