//! Emotion/topic extraction - the first generation stage.
//!
//! Turns raw entry text into a normalized emotion distribution, a
//! positive/negative polarity split, and a short topic list. Every
//! failure mode (transport error, malformed JSON, missing fields,
//! degenerate weights) collapses into a usable fallback profile; this
//! stage never surfaces an error to its caller.

use crate::gemini::{SamplingOptions, TextGenerator};
use crate::logging;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MAX_TOPICS: usize = 3;

/// Quantified emotional profile of a single entry. Immutable once built.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmotionProfile {
    pub entry_text: String,
    /// Emotion label -> weight. Normalized to sum to 1.0.
    pub emotions: BTreeMap<String, f64>,
    /// Exactly the keys "positive" and "negative", summing to 1.0.
    pub polarity: BTreeMap<String, f64>,
    pub topics: Vec<String>,
    pub timestamp: String,
    /// True when any part of the profile came from defaults rather than
    /// the generation service.
    pub degraded: bool,
}

impl EmotionProfile {
    pub fn negative_weight(&self) -> f64 {
        self.polarity.get("negative").copied().unwrap_or(0.0)
    }

    /// Full fallback profile when extraction cannot produce anything usable.
    pub fn fallback(entry_text: &str) -> Self {
        Self {
            entry_text: entry_text.to_string(),
            emotions: default_emotions(),
            polarity: default_polarity(),
            topics: vec!["general".to_string()],
            timestamp: Utc::now().to_rfc3339(),
            degraded: true,
        }
    }
}

fn default_emotions() -> BTreeMap<String, f64> {
    BTreeMap::from([("neutral".to_string(), 1.0)])
}

fn default_polarity() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("positive".to_string(), 0.5),
        ("negative".to_string(), 0.5),
    ])
}

/// Shape we ask the model for. Everything is optional because the model
/// response is untrusted input.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    emotions: Option<BTreeMap<String, f64>>,
    polarity: Option<BTreeMap<String, f64>>,
    topics: Option<Vec<String>>,
}

pub struct EmotionExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl EmotionExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Extract an emotion profile from entry text.
    pub async fn extract(&self, entry_text: &str) -> EmotionProfile {
        let prompt = build_extraction_prompt(entry_text);

        let response = match self
            .generator
            .generate(&prompt, SamplingOptions::deterministic())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                logging::log_error(None, &format!("Extraction call failed: {}", e));
                return EmotionProfile::fallback(entry_text);
            }
        };

        let profile = match parse_extraction(&response) {
            Some(raw) => profile_from_raw(entry_text, raw),
            None => {
                let preview: String = response.chars().take(200).collect();
                logging::log_error(
                    None,
                    &format!("Failed to parse extraction response: {}", preview),
                );
                EmotionProfile::fallback(entry_text)
            }
        };

        logging::log_extract(
            None,
            &format!(
                "Extraction completed - emotions: {:?}, topics: {:?}, degraded: {}",
                profile.emotions.keys().collect::<Vec<_>>(),
                profile.topics,
                profile.degraded
            ),
        );

        profile
    }
}

fn build_extraction_prompt(entry_text: &str) -> String {
    format!(
        r#"You are an expert emotion and topic analyzer. Analyze the following journal entry.

Text to analyze: "{entry_text}"

Respond in exactly this JSON format:
{{"emotions": {{"emotion1": 0.6, "emotion2": 0.4}}, "polarity": {{"positive": 0.7, "negative": 0.3}}, "topics": ["topic1", "topic2"]}}

Guidelines:
- emotions: common emotion words like happy, sad, anxious, calm, excited, proud, frustrated, overwhelmed, grateful, content, with weights between 0 and 1 that sum to 1
- polarity: how positive vs negative the entry reads overall, two weights that sum to 1
- topics: 1-3 broad categories like family, work, exercise, relationships, health, travel, social, personal_growth
- Return 1-4 emotions that best represent the text
- Only return valid JSON, no additional text"#
    )
}

/// Strip markdown code fences the model sometimes wraps JSON in.
fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Locate the first balanced `{...}` region, skipping braces inside
/// JSON strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_extraction(response: &str) -> Option<RawExtraction> {
    let cleaned = strip_code_fences(response);
    if let Ok(raw) = serde_json::from_str::<RawExtraction>(cleaned) {
        return Some(raw);
    }
    // The model sometimes surrounds the JSON with prose
    let region = first_json_object(response)?;
    serde_json::from_str(region).ok()
}

/// Divide every weight by the map's own sum. Returns false for degenerate
/// sums (empty, all-zero, negative); callers substitute defaults then.
fn normalize(weights: &mut BTreeMap<String, f64>) -> bool {
    for w in weights.values_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let sum: f64 = weights.values().sum();
    if sum <= 0.0 {
        return false;
    }
    for w in weights.values_mut() {
        *w /= sum;
    }
    true
}

fn profile_from_raw(entry_text: &str, raw: RawExtraction) -> EmotionProfile {
    let mut degraded = false;

    let mut emotions = match raw.emotions {
        Some(m) if !m.is_empty() => m,
        _ => {
            degraded = true;
            default_emotions()
        }
    };
    if !normalize(&mut emotions) {
        emotions = default_emotions();
        degraded = true;
    }

    let mut polarity = match raw.polarity {
        Some(m) if !m.is_empty() => m,
        _ => {
            degraded = true;
            default_polarity()
        }
    };
    polarity.retain(|k, _| k == "positive" || k == "negative");
    polarity.entry("positive".to_string()).or_insert(0.0);
    polarity.entry("negative".to_string()).or_insert(0.0);
    if !normalize(&mut polarity) {
        polarity = default_polarity();
        degraded = true;
    }

    let topics = match raw.topics {
        Some(list) => {
            let cleaned: Vec<String> = list
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .take(MAX_TOPICS)
                .collect();
            if cleaned.is_empty() {
                vec!["general".to_string()]
            } else {
                cleaned
            }
        }
        None => vec!["general".to_string()],
    };

    EmotionProfile {
        entry_text: entry_text.to_string(),
        emotions,
        polarity,
        topics,
        timestamp: Utc::now().to_rfc3339(),
        degraded,
    }
}
