//! Makeup recommendations from the Claude Messages API.

use crate::config::ClaudeConfig;
use crate::core::analysis::FaceAnalysis;
use crate::core::fallback::fallback_recommendations;
use crate::utils::constants::ANTHROPIC_VERSION;
use crate::utils::urls::join_path;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a professional makeup artist with many years of \
experience. You give practical, specific and encouraging makeup advice based on facial \
measurements. Always answer with a single JSON object and nothing else.";

const RESPONSE_FORMAT: &str = r#"Provide exactly 3 makeup looks (Beginner, Intermediate and Advanced). Respond with JSON in exactly this format:
{
  "recommended_looks": [
    {
      "look_name": "Natural Everyday",
      "description": "One sentence",
      "foundation_tips": ["Tip", "Tip"],
      "contour_tips": ["Tip", "Tip"],
      "eyeshadow_colors": ["Colour", "Colour", "Colour"],
      "eyeliner_style": "Style",
      "lip_colors": ["Colour", "Colour"],
      "blush_placement": "Placement",
      "avoid": ["Thing to avoid"],
      "difficulty_level": "Beginner",
      "occasion": "Daily wear, work"
    }
  ],
  "face_shape_tips": ["Tip", "Tip"],
  "eye_shape_tips": ["Tip", "Tip"],
  "skin_tone_tips": ["Tip", "Tip"],
  "recommended_tools": ["Tool", "Tool", "Tool", "Tool"],
  "color_palette": {
    "neutrals": ["Colour", "Colour", "Colour"],
    "accents": ["Colour", "Colour"],
    "lips": ["Colour", "Colour", "Colour"],
    "blush": ["Colour", "Colour"]
  },
  "top_priority_tip": "The single most important tip for this face"
}
Name colours specifically (for example "warm peachy coral", "matte taupe brown") and favour realistic, achievable techniques."#;

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("no API key configured")]
    NotConfigured,

    #[error("rate limited by the API")]
    RateLimited,

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concerns: Vec<String>,
}

impl Preferences {
    pub fn is_empty(&self) -> bool {
        self.occasion.is_none() && self.style.is_none() && self.concerns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MakeupLook {
    pub look_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub foundation_tips: Vec<String>,
    #[serde(default)]
    pub contour_tips: Vec<String>,
    #[serde(default)]
    pub eyeshadow_colors: Vec<String>,
    #[serde(default)]
    pub eyeliner_style: String,
    #[serde(default)]
    pub lip_colors: Vec<String>,
    #[serde(default)]
    pub blush_placement: String,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub difficulty_level: String,
    #[serde(default)]
    pub occasion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendations {
    pub recommended_looks: Vec<MakeupLook>,
    #[serde(default)]
    pub face_shape_tips: Vec<String>,
    #[serde(default)]
    pub eye_shape_tips: Vec<String>,
    #[serde(default)]
    pub skin_tone_tips: Vec<String>,
    #[serde(default)]
    pub recommended_tools: Vec<String>,
    #[serde(default)]
    pub color_palette: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub top_priority_tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Built-in content served because the model call failed.
    #[serde(default)]
    pub fallback: bool,
    // the model's answer when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(
        &self,
        analysis: &FaceAnalysis,
        preferences: &Preferences,
    ) -> Result<Recommendations, RecommenderError>;

    fn is_configured(&self) -> bool {
        true
    }
}

pub struct ClaudeRecommender {
    http: Client,
    config: ClaudeConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeRecommender {
    pub fn new(config: ClaudeConfig) -> Result<Self, RecommenderError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// The answer text and the model that produced it.
    async fn request_answer(
        &self,
        api_key: &str,
        analysis: &FaceAnalysis,
        preferences: &Preferences,
    ) -> Result<(String, String), RecommenderError> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: build_prompt(analysis, preferences),
            }],
        };

        let url = join_path(&self.config.base_url, "v1/messages");
        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Claude API rate limited the request");
            return Err(RecommenderError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecommenderError::RequestFailed(format!(
                "{} - {}",
                status, error_text
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| RecommenderError::InvalidResponse(e.to_string()))?;

        let text: String = body
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(RecommenderError::InvalidResponse(
                "no text content in response".to_string(),
            ));
        }

        info!("Claude recommendations received in {:?}", started.elapsed());
        let model = body.model.unwrap_or_else(|| self.config.model.clone());
        Ok((text, model))
    }
}

#[async_trait]
impl Recommender for ClaudeRecommender {
    async fn recommend(
        &self,
        analysis: &FaceAnalysis,
        preferences: &Preferences,
    ) -> Result<Recommendations, RecommenderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RecommenderError::NotConfigured)?;

        match self.request_answer(api_key, analysis, preferences).await {
            Ok((text, model)) => match parse_recommendations(&text) {
                Ok(mut recommendations) => {
                    recommendations.model = Some(model);
                    Ok(recommendations)
                }
                Err(e) => {
                    warn!("{}, serving built-in recommendations", e);
                    let mut recommendations = fallback_recommendations(analysis);
                    recommendations.raw_text = Some(text.trim().to_string());
                    Ok(recommendations)
                }
            },
            // the caller should back off rather than get canned advice
            Err(e @ RecommenderError::RateLimited) => Err(e),
            Err(e) => {
                warn!("Claude request failed ({}), serving built-in recommendations", e);
                Ok(fallback_recommendations(analysis))
            }
        }
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}

pub fn build_prompt(analysis: &FaceAnalysis, preferences: &Preferences) -> String {
    let r = &analysis.ratios;
    let mut lines = vec![
        "Analyze this client's facial features and recommend makeup.".to_string(),
        String::new(),
        "CLIENT ANALYSIS:".to_string(),
        format!("- Face shape: {}", analysis.face_shape.as_str()),
        format!("- Eye shape: {}", analysis.eye_shape.as_str()),
        format!("- Eye spacing: {}", analysis.eye_spacing.as_str()),
        format!("- Lips: {}", analysis.lip_fullness.as_str()),
        format!("- Nose width: {}", analysis.nose_width.as_str()),
        format!("- Prominent cheekbones: {}", analysis.has_prominent_cheekbones),
        format!("- Face symmetry: {:.2}", r.face_symmetry),
    ];
    if let Some(tone) = &analysis.skin_tone {
        lines.push(format!(
            "- Skin tone: {} depth, {} undertone (approx. {})",
            tone.depth.as_str(),
            tone.undertone.as_str(),
            tone.hex
        ));
    }
    lines.push(format!(
        "- Ratios: length/width {:.2}, jaw/cheekbone {:.2}, forehead/cheekbone {:.2}, \
         eye aspect {:.2}, eye spacing/eye width {:.2}, lip height/width {:.2}, \
         upper/lower lip {:.2}, nose/face width {:.2}",
        r.face_length_to_width,
        r.jaw_to_cheekbone,
        r.forehead_to_cheekbone,
        r.eye_aspect,
        r.eye_spacing_to_eye_width,
        r.lip_height_to_width,
        r.upper_to_lower_lip,
        r.nose_width_to_face_width
    ));

    if !preferences.is_empty() {
        lines.push(String::new());
        lines.push("PREFERENCES:".to_string());
        if let Some(occasion) = &preferences.occasion {
            lines.push(format!("- Occasion: {}", occasion));
        }
        if let Some(style) = &preferences.style {
            lines.push(format!("- Style: {}", style));
        }
        if !preferences.concerns.is_empty() {
            lines.push(format!("- Concerns: {}", preferences.concerns.join(", ")));
        }
    }

    lines.push(String::new());
    lines.push(RESPONSE_FORMAT.to_string());
    lines.join("\n")
}

/// Parses the model's answer. Accepts bare JSON, a fenced block, or JSON
/// surrounded by prose; the answer must carry at least one look.
pub fn parse_recommendations(text: &str) -> Result<Recommendations, RecommenderError> {
    let mut last_error = None;
    for candidate in [Some(strip_code_fences(text)), outermost_object(text)]
        .into_iter()
        .flatten()
    {
        match serde_json::from_str::<Recommendations>(candidate) {
            Ok(recommendations) if !recommendations.recommended_looks.is_empty() => {
                return Ok(Recommendations {
                    fallback: false,
                    raw_text: None,
                    ..recommendations
                });
            }
            Ok(_) => last_error = Some("answer has no recommended looks".to_string()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    let reason = last_error.unwrap_or_else(|| "no JSON object in answer".to_string());
    debug!("recommendation answer rejected: {}", reason);
    Err(RecommenderError::InvalidResponse(reason))
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

// from the first `{` to the last `}`, for answers with prose around the JSON
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::features::{self, tests::oval_mesh};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn sample_analysis() -> FaceAnalysis {
        let f = features::extract(&oval_mesh(), 1000, 1000).unwrap();
        FaceAnalysis {
            face_detected: true,
            face_count: 1,
            image_width: 1000,
            image_height: 1000,
            face_shape: f.face_shape,
            eye_shape: f.eye_shape,
            eye_spacing: f.eye_spacing,
            lip_fullness: f.lip_fullness,
            nose_width: f.nose_width,
            has_prominent_cheekbones: f.has_prominent_cheekbones,
            ratios: f.ratios,
            skin_tone: None,
            analyzed_at: Utc::now(),
        }
    }

    fn answer_json() -> serde_json::Value {
        json!({
            "recommended_looks": [{
                "look_name": "Soft Glam",
                "description": "Warm and glowy",
                "foundation_tips": ["Thin layers"],
                "contour_tips": ["Under the cheekbones"],
                "eyeshadow_colors": ["Matte taupe brown", "Champagne"],
                "eyeliner_style": "Tight wing",
                "lip_colors": ["Warm peachy coral"],
                "blush_placement": "High on the cheekbones",
                "avoid": ["Frosted lips"],
                "difficulty_level": "Intermediate",
                "occasion": "Evening"
            }],
            "face_shape_tips": ["Oval faces suit most placements"],
            "recommended_tools": ["Sponge"],
            "color_palette": {"lips": ["Rose lip liner"]},
            "top_priority_tip": "Prep the skin"
        })
    }

    fn recommender_for(server: &MockServer, api_key: Option<&str>) -> ClaudeRecommender {
        ClaudeRecommender::new(ClaudeConfig {
            api_key: api_key.map(String::from),
            base_url: server.uri(),
            model: "claude-test".to_string(),
            max_tokens: 512,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn mount_answer(server: &MockServer, text: String) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-test",
                "content": [{"type": "text", "text": text}],
                "stop_reason": "end_turn"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = format!("```json\n{}\n```", answer_json());
        let parsed = parse_recommendations(&text).unwrap();
        assert_eq!(parsed.top_priority_tip, "Prep the skin");
        assert_eq!(parsed.recommended_looks.len(), 1);
        assert_eq!(parsed.recommended_looks[0].eyeliner_style, "Tight wing");
        assert_eq!(parsed.color_palette["lips"], vec!["Rose lip liner".to_string()]);
        // fields the model left out default to empty
        assert!(parsed.eye_shape_tips.is_empty());
        assert!(!parsed.fallback);
    }

    #[test]
    fn test_parse_json_after_preamble() {
        let text = format!(
            "Here are your personalized recommendations:\n\n```json\n{}\n```\nEnjoy!",
            answer_json()
        );
        let parsed = parse_recommendations(&text).unwrap();
        assert_eq!(parsed.recommended_looks[0].look_name, "Soft Glam");
        assert!(parsed.raw_text.is_none());
    }

    #[test]
    fn test_parse_rejects_prose_and_empty_looks() {
        assert!(matches!(
            parse_recommendations("Try a warm bronzer.\n\nKeep lips nude."),
            Err(RecommenderError::InvalidResponse(_))
        ));
        assert!(parse_recommendations("{\"recommended_looks\": []}").is_err());
    }

    #[test]
    fn test_prompt_mentions_features_and_preferences() {
        let prefs = Preferences {
            occasion: Some("wedding".to_string()),
            style: None,
            concerns: vec!["dark circles".to_string()],
        };
        let prompt = build_prompt(&sample_analysis(), &prefs);
        assert!(prompt.contains("Face shape: oval"));
        assert!(prompt.contains("Prominent cheekbones: true"));
        assert!(prompt.contains("Face symmetry: 1.00"));
        assert!(prompt.contains("Occasion: wedding"));
        assert!(prompt.contains("Concerns: dark circles"));
        assert!(prompt.contains("\"recommended_looks\""));
        assert!(!prompt.contains("Style:"));
    }

    #[tokio::test]
    async fn test_recommend_calls_messages_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-test",
                "content": [{"type": "text", "text": answer_json().to_string()}],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let recs = recommender_for(&server, Some("test-key"))
            .recommend(&sample_analysis(), &Preferences::default())
            .await
            .unwrap();
        assert_eq!(recs.recommended_looks[0].lip_colors, vec!["Warm peachy coral".to_string()]);
        assert_eq!(recs.model.as_deref(), Some("claude-test"));
        assert!(!recs.fallback);
    }

    #[tokio::test]
    async fn test_recommend_without_key() {
        let server = MockServer::start().await;
        let recommender = recommender_for(&server, None);
        assert!(!recommender.is_configured());
        let err = recommender
            .recommend(&sample_analysis(), &Preferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecommenderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_recommend_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = recommender_for(&server, Some("k"))
            .recommend(&sample_analysis(), &Preferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecommenderError::RateLimited));
    }

    #[tokio::test]
    async fn test_upstream_error_serves_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = sample_analysis();
        let recs = recommender_for(&server, Some("k"))
            .recommend(&analysis, &Preferences::default())
            .await
            .unwrap();
        assert!(recs.fallback);
        assert!(recs.model.is_none());
        assert_eq!(recs.recommended_looks.len(), 3);
        assert_eq!(recs, fallback_recommendations(&analysis));
    }

    #[tokio::test]
    async fn test_unparseable_answer_serves_fallback_with_text() {
        let server = MockServer::start().await;
        mount_answer(&server, "Use a warm bronzer and a nude lip.".to_string()).await;

        let recs = recommender_for(&server, Some("k"))
            .recommend(&sample_analysis(), &Preferences::default())
            .await
            .unwrap();
        assert!(recs.fallback);
        assert_eq!(recs.recommended_looks.len(), 3);
        assert_eq!(
            recs.raw_text.as_deref(),
            Some("Use a warm bronzer and a nude lip.")
        );
    }
}
