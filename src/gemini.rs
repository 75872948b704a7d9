use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 60; // 60 second timeout for API requests

// Model constants
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

/// Sampling configuration for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub temperature: f32,
    /// Thinking token budget. 0 disables deliberation entirely.
    pub thinking_budget: u32,
    pub max_output_tokens: Option<u32>,
}

impl SamplingOptions {
    /// Low-variance settings for calls whose output gets machine-parsed.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.2,
            thinking_budget: 0,
            max_output_tokens: Some(512),
        }
    }

    /// Settings for free-form narrative output (reflections).
    pub fn narrative() -> Self {
        Self {
            temperature: 0.6,
            thinking_budget: 0,
            max_output_tokens: Some(400),
        }
    }

    /// Looser settings where more creative framing is acceptable.
    pub fn creative() -> Self {
        Self {
            temperature: 0.7,
            thinking_budget: 0,
            max_output_tokens: Some(300),
        }
    }
}

/// Boundary to the text generation service. Object-safe so the pipeline
/// can be driven by scripted doubles in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: SamplingOptions,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "thinkingConfig")]
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    status: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            model: GEMINI_FLASH.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    async fn generate_content(
        &self,
        prompt: &str,
        options: SamplingOptions,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
                thinking_config: ThinkingConfig {
                    thinking_budget: options.thinking_budget,
                },
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            // Try to parse structured error
            if let Ok(parsed_error) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(format!(
                    "Gemini API error ({}): {} - {}",
                    status, parsed_error.error.status, parsed_error.error.message
                )
                .into());
            }

            return Err(format!("Gemini API error ({}): {}", status, error_text).into());
        }

        let completion: GenerateContentResponse = response.json().await?;

        let text: String = completion
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err("No text response from Gemini".into());
        }

        Ok(text)
    }

    /// Validate the Gemini API key with a minimal request
    pub async fn validate_api_key(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let options = SamplingOptions {
            temperature: 0.0,
            thinking_budget: 0,
            max_output_tokens: Some(10),
        };

        match self.generate_content("Say 'ok'", options).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("401") || msg.contains("403") || msg.contains("API_KEY_INVALID") {
                    return Err("Invalid Gemini API key".into());
                }
                if msg.contains("429") {
                    return Err("Rate limited - too many requests".into());
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        options: SamplingOptions,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.generate_content(prompt, options).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: Some(512),
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"thinkingBudget\":0"));
        assert!(json.contains("\"maxOutputTokens\":512"));
        assert!(json.contains("\"text\":\"hello\""));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first "}, {"text": "second"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, "first second");
    }

    #[test]
    fn test_response_parsing_missing_parts() {
        let body = r#"{"candidates": [{"content": {}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.candidates[0].content.parts.is_empty());
    }

    #[test]
    fn test_sampling_presets_disable_thinking() {
        assert_eq!(SamplingOptions::deterministic().thinking_budget, 0);
        assert_eq!(SamplingOptions::narrative().thinking_budget, 0);
        assert_eq!(SamplingOptions::creative().thinking_budget, 0);
        assert!(SamplingOptions::creative().temperature > SamplingOptions::deterministic().temperature);
    }
}
