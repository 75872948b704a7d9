//! Reflection and deeper-meaning generation - the second and third
//! generation stages.
//!
//! The reflection prompt branches on whether historical context exists:
//! the guest variant comments only on the current entry, the user variant
//! grounds itself in digest statistics. Both stages degrade to fixed
//! fallback text on upstream failure.

use crate::extractor::EmotionProfile;
use crate::gemini::{SamplingOptions, TextGenerator};
use crate::history::HistoricalDigest;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which prompt variant an orchestration run used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Guest,
    User,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Guest => "guest",
            Mode::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Mode> {
        match s.to_lowercase().as_str() {
            "guest" => Some(Mode::Guest),
            "user" => Some(Mode::User),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReflectionResult {
    pub text: String,
    pub mode: Mode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeeperMeaning {
    pub text: String,
}

/// Fallback reflections. The two texts intentionally differ so a guest
/// response never implies anything was remembered or stored.
pub const GUEST_FALLBACK: &str = "Thank you for sharing your thoughts. Taking a moment to put \
     feelings into words is already a meaningful step.";
pub const USER_FALLBACK: &str = "Thank you for sharing your thoughts. Every entry you write adds \
     to the picture of what matters to you over time.";

pub const DEEPER_MEANING_UNAVAILABLE: &str =
    "A deeper reading of this entry is unavailable right now.";

pub struct ReflectionGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl ReflectionGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate a short pattern-oriented reflection. The user variant is
    /// selected only when a digest is present AND carries actual history;
    /// the digest is threaded explicitly, never looked up here.
    pub async fn reflect(
        &self,
        entry_text: &str,
        profile: &EmotionProfile,
        digest: Option<&HistoricalDigest>,
    ) -> ReflectionResult {
        let digest = digest.filter(|d| d.has_history());
        let (prompt, mode) = match digest {
            Some(d) => (build_user_prompt(entry_text, profile, d), Mode::User),
            None => (build_guest_prompt(entry_text, profile), Mode::Guest),
        };

        match self
            .generator
            .generate(&prompt, SamplingOptions::narrative())
            .await
        {
            Ok(text) => {
                logging::log_reflect(None, &format!("Reflection generated ({})", mode.as_str()));
                ReflectionResult {
                    text: text.trim().to_string(),
                    mode,
                }
            }
            Err(e) => {
                logging::log_error(None, &format!("Reflection generation failed: {}", e));
                let text = match mode {
                    Mode::Guest => GUEST_FALLBACK,
                    Mode::User => USER_FALLBACK,
                };
                ReflectionResult {
                    text: text.to_string(),
                    mode,
                }
            }
        }
    }
}

pub struct DeeperMeaningGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl DeeperMeaningGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Contrast the surface statement with the underlying emotional truth.
    /// The negativity trigger lives in the orchestrator; given a call this
    /// stage is unconditional.
    pub async fn reveal(&self, entry_text: &str, profile: &EmotionProfile) -> DeeperMeaning {
        let prompt = build_deeper_prompt(entry_text, profile);

        match self
            .generator
            .generate(&prompt, SamplingOptions::creative())
            .await
        {
            Ok(text) => {
                logging::log_reflect(None, "Deeper meaning generated");
                DeeperMeaning {
                    text: text.trim().to_string(),
                }
            }
            Err(e) => {
                logging::log_error(None, &format!("Deeper meaning generation failed: {}", e));
                DeeperMeaning {
                    text: DEEPER_MEANING_UNAVAILABLE.to_string(),
                }
            }
        }
    }
}

fn format_emotions(profile: &EmotionProfile) -> String {
    profile
        .emotions
        .iter()
        .map(|(label, weight)| format!("{} ({:.2})", label, weight))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_guest_prompt(entry_text: &str, profile: &EmotionProfile) -> String {
    format!(
        r#"You are a compassionate journaling companion responding to a one-off entry.

Entry: "{entry_text}"
Detected emotions: {emotions}
Detected topics: {topics}

Write a reflection that:
- comments ONLY on this single entry - do not reference past entries, history, recurring patterns, or anything the writer may have said before
- acknowledges the emotions the person is experiencing
- is supportive, warm, and non-judgmental
- is 2-3 sentences long

Write the reflection directly without any formatting or labels:"#,
        emotions = format_emotions(profile),
        topics = profile.topics.join(", "),
    )
}

fn build_user_prompt(
    entry_text: &str,
    profile: &EmotionProfile,
    digest: &HistoricalDigest,
) -> String {
    let past_emotions = digest
        .top_emotions
        .iter()
        .map(|(label, total)| format!("{} (total weight {:.2})", label, total))
        .collect::<Vec<_>>()
        .join(", ");
    let past_topics = digest
        .top_topics
        .iter()
        .map(|(topic, count)| format!("{} ({} entries)", topic, count))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a pattern-oriented journaling companion. The writer has {entry_count} past entries from the last {window_days} days.

Current entry: "{entry_text}"
Current emotions: {emotions}
Current topics: {topics}

Statistics from the past entries:
- Most frequent emotions: {past_emotions}
- Most frequent topics: {past_topics}

Write a reflection that:
- states correlations you observe between the current entry and the history
- cites at least one concrete number from the statistics above
- gives NO advice - observe, never prescribe
- is 2-3 sentences long

Write the reflection directly without any formatting or labels:"#,
        entry_count = digest.entry_count,
        window_days = digest.window_days,
        emotions = format_emotions(profile),
        topics = profile.topics.join(", "),
    )
}

fn build_deeper_prompt(entry_text: &str, profile: &EmotionProfile) -> String {
    format!(
        r#"You read between the lines of journal entries, contrasting what was written with the underlying emotional truth.

Entry: "{entry_text}"
Detected emotions: {emotions}

Respond in one to two sentences using exactly this shape:
You said: ... → You meant: ...

No other text, no labels:"#,
        emotions = format_emotions(profile),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::ScriptedGenerator;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn test_profile() -> EmotionProfile {
        EmotionProfile {
            entry_text: "entry".to_string(),
            emotions: BTreeMap::from([("anxious".to_string(), 1.0)]),
            polarity: BTreeMap::from([
                ("positive".to_string(), 0.3),
                ("negative".to_string(), 0.7),
            ]),
            topics: vec!["work".to_string()],
            timestamp: Utc::now().to_rfc3339(),
            degraded: false,
        }
    }

    fn test_digest() -> HistoricalDigest {
        HistoricalDigest {
            entry_count: 5,
            top_emotions: vec![("anxious".to_string(), 2.4)],
            top_topics: vec![("work".to_string(), 4)],
            window_days: 21,
        }
    }

    #[tokio::test]
    async fn test_guest_variant_without_digest() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("A kind reflection.")]));
        let reflector = ReflectionGenerator::new(generator.clone());

        let result = reflector.reflect("entry", &test_profile(), None).await;
        assert_eq!(result.mode, Mode::Guest);
        assert_eq!(result.text, "A kind reflection.");

        let prompts = generator.prompts();
        assert!(!prompts[0].contains("past entries"));
        assert!(prompts[0].contains("do not reference past entries"));
    }

    #[tokio::test]
    async fn test_empty_digest_selects_guest_variant() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("A kind reflection.")]));
        let reflector = ReflectionGenerator::new(generator.clone());

        let digest = HistoricalDigest::empty(21);
        let result = reflector
            .reflect("entry", &test_profile(), Some(&digest))
            .await;
        assert_eq!(result.mode, Mode::Guest);
    }

    #[tokio::test]
    async fn test_user_variant_embeds_digest_numbers() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("Pattern noted.")]));
        let reflector = ReflectionGenerator::new(generator.clone());

        let digest = test_digest();
        let result = reflector
            .reflect("entry", &test_profile(), Some(&digest))
            .await;
        assert_eq!(result.mode, Mode::User);

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("5 past entries"));
        assert!(prompt.contains("anxious (total weight 2.40)"));
        assert!(prompt.contains("work (4 entries)"));
        assert!(prompt.contains("NO advice"));
    }

    #[tokio::test]
    async fn test_fallbacks_differ_between_modes() {
        let reflector = ReflectionGenerator::new(Arc::new(ScriptedGenerator::unavailable()));

        let guest = reflector.reflect("entry", &test_profile(), None).await;
        assert_eq!(guest.mode, Mode::Guest);
        assert_eq!(guest.text, GUEST_FALLBACK);

        let digest = test_digest();
        let user = reflector
            .reflect("entry", &test_profile(), Some(&digest))
            .await;
        assert_eq!(user.mode, Mode::User);
        assert_eq!(user.text, USER_FALLBACK);

        assert_ne!(guest.text, user.text);
    }

    #[tokio::test]
    async fn test_reveal_uses_fixed_shape_prompt() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            "You said: I'm fine. → You meant: I'm exhausted.",
        )]));
        let revealer = DeeperMeaningGenerator::new(generator.clone());

        let meaning = revealer.reveal("I'm fine", &test_profile()).await;
        assert!(meaning.text.starts_with("You said:"));
        assert!(generator.prompts()[0].contains("You said: ... → You meant: ..."));
    }

    #[tokio::test]
    async fn test_reveal_placeholder_on_failure() {
        let revealer = DeeperMeaningGenerator::new(Arc::new(ScriptedGenerator::unavailable()));
        let meaning = revealer.reveal("I'm fine", &test_profile()).await;
        assert_eq!(meaning.text, DEEPER_MEANING_UNAVAILABLE);
    }

    #[test]
    fn test_mode_round_trip() {
        assert_eq!(Mode::from_str("guest"), Some(Mode::Guest));
        assert_eq!(Mode::from_str("USER"), Some(Mode::User));
        assert_eq!(Mode::from_str("other"), None);
        assert_eq!(Mode::Guest.as_str(), "guest");
        assert_eq!(serde_json::to_string(&Mode::User).unwrap(), "\"user\"");
    }
}
