pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
// multipart framing on top of the file itself
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_FILE_AGE_SECS: u64 = 600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 30;

pub const DEFAULT_LANDMARK_SERVICE_URL: &str = "http://localhost:8001";
pub const DEFAULT_LANDMARK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LANDMARK_RETRIES: u32 = 3;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_CLAUDE_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_RECOMMENDER_TIMEOUT_SECS: u64 = 60;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

// dev servers of the SPA
pub const DEV_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];
