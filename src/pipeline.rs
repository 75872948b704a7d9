//! The analysis orchestration pipeline.
//!
//! One execution per incoming entry: validate, extract, optionally
//! summarize history, reflect, optionally reveal deeper meaning, and
//! optionally persist. Validation is the only hard failure path - every
//! later stage degrades into a fallback value or a warning, so a run that
//! passes validation always produces a response.

use crate::error::InputError;
use crate::extractor::{EmotionExtractor, EmotionProfile};
use crate::gemini::TextGenerator;
use crate::history::{self, HistoricalDigest};
use crate::logging;
use crate::reflection::{DeeperMeaningGenerator, Mode, ReflectionGenerator, ReflectionResult};
use crate::store::{AnalysisRecord, Store, UserIdentity};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Negative polarity weight at or above which the deeper-meaning stage runs.
pub const NEGATIVITY_THRESHOLD: f64 = 0.6;
/// Default history lookback window.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 21;
/// Upper bound on caller-configured lookback, to cap query cost.
pub const MAX_LOOKBACK_DAYS: i64 = 90;
pub const MAX_ENTRY_CHARS: usize = 5000;
pub const MAX_BATCH_ENTRIES: usize = 10;

const SAMPLE_ENTRY: &str = "Today I felt overwhelmed at work but managed to complete my \
     important project. I'm proud of what I accomplished despite the stress.";

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub lookback_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl PipelineConfig {
    fn effective_lookback(&self) -> i64 {
        self.lookback_days.clamp(1, MAX_LOOKBACK_DAYS)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: EmotionProfile,
    pub reflection: String,
    pub mode: Mode,
    pub ysym_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deeper_meaning: Option<String>,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<AnalyzeResponse>,
    pub total_processed: usize,
    pub processing_time_seconds: f64,
}

pub struct Pipeline {
    extractor: EmotionExtractor,
    reflector: ReflectionGenerator,
    revealer: DeeperMeaningGenerator,
    store: Arc<Store>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<Store>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: EmotionExtractor::new(generator.clone()),
            reflector: ReflectionGenerator::new(generator.clone()),
            revealer: DeeperMeaningGenerator::new(generator),
            store,
            config,
        }
    }

    /// Run one orchestration over a single entry. `identity` selects user
    /// mode (history-aware reflection + persistence); `None` runs as guest.
    pub async fn analyze(
        &self,
        entry_text: &str,
        identity: Option<&UserIdentity>,
    ) -> Result<AnalyzeResponse, InputError> {
        let started = Instant::now();

        let entry_text = validate_entry(entry_text)?;
        let mode = match identity {
            Some(_) => Mode::User,
            None => Mode::Guest,
        };
        logging::log_pipeline(
            None,
            &format!(
                "Processing entry ({} chars, mode={})",
                entry_text.len(),
                mode.as_str()
            ),
        );

        let profile = self.extractor.extract(&entry_text).await;

        // History is threaded explicitly; a guest run never touches the store.
        let digest = identity.map(|user| self.fetch_digest(&user.user_id));

        let reflection = self
            .reflector
            .reflect(&entry_text, &profile, digest.as_ref())
            .await;

        let ysym_triggered = profile.negative_weight() >= NEGATIVITY_THRESHOLD;
        let deeper_meaning = if ysym_triggered {
            Some(self.revealer.reveal(&entry_text, &profile).await.text)
        } else {
            None
        };

        let (stored, warning) = match identity {
            Some(user) => self.persist(
                user,
                &profile,
                &reflection,
                deeper_meaning.as_deref(),
                ysym_triggered,
            ),
            None => (false, None),
        };

        let processing_time_seconds = round2(started.elapsed().as_secs_f64());
        logging::log_pipeline(
            None,
            &format!(
                "Run complete in {:.2}s (mode={}, ysym={}, stored={})",
                processing_time_seconds,
                mode.as_str(),
                ysym_triggered,
                stored
            ),
        );

        Ok(AnalyzeResponse {
            analysis: profile,
            reflection: reflection.text,
            mode,
            ysym_triggered,
            deeper_meaning,
            stored,
            warning,
            processing_time_seconds,
        })
    }

    /// Analyze up to `MAX_BATCH_ENTRIES` entries, skipping invalid ones.
    pub async fn analyze_batch(
        &self,
        entries: &[String],
        identity: Option<&UserIdentity>,
    ) -> Result<BatchResponse, InputError> {
        let started = Instant::now();

        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(InputError::BatchTooLarge(MAX_BATCH_ENTRIES));
        }

        let mut results = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            match self.analyze(entry, identity).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    logging::log_pipeline(None, &format!("Skipping batch entry {}: {}", i, e));
                }
            }
        }

        Ok(BatchResponse {
            total_processed: results.len(),
            results,
            processing_time_seconds: round2(started.elapsed().as_secs_f64()),
        })
    }

    /// Smoke check: run the pipeline on a canned entry in guest mode.
    pub async fn sample_analysis(&self) -> Result<AnalyzeResponse, InputError> {
        self.analyze(SAMPLE_ENTRY, None).await
    }

    fn fetch_digest(&self, user_id: &str) -> HistoricalDigest {
        let lookback = self.config.effective_lookback();
        let since = (Utc::now() - Duration::days(lookback)).to_rfc3339();

        match self.store.recent_analyses(user_id, &since) {
            Ok(records) => {
                logging::log_pipeline(
                    None,
                    &format!("Summarizing {} entries from last {} days", records.len(), lookback),
                );
                history::summarize(&records, lookback)
            }
            Err(e) => {
                // Degrades to a history-less reflection for this call only
                logging::log_error(None, &format!("History fetch failed for {}: {}", user_id, e));
                HistoricalDigest::empty(lookback)
            }
        }
    }

    fn persist(
        &self,
        user: &UserIdentity,
        profile: &EmotionProfile,
        reflection: &ReflectionResult,
        deeper_meaning: Option<&str>,
        ysym_triggered: bool,
    ) -> (bool, Option<String>) {
        let record = AnalysisRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            entry_text: profile.entry_text.clone(),
            emotions: profile.emotions.clone(),
            polarity: profile.polarity.clone(),
            topics: profile.topics.clone(),
            reflection: reflection.text.clone(),
            reflection_mode: reflection.mode.as_str().to_string(),
            deeper_meaning: deeper_meaning.map(String::from),
            ysym_triggered,
            created_at: profile.timestamp.clone(),
        };

        match self.store.insert_analysis(&record) {
            Ok(()) => {
                logging::log_store(Some(&record.id), "Analysis persisted");
                (true, None)
            }
            Err(e) => {
                logging::log_error(Some(&record.id), &format!("Persistence failed: {}", e));
                (false, Some("analysis could not be stored".to_string()))
            }
        }
    }
}

fn validate_entry(entry_text: &str) -> Result<String, InputError> {
    let trimmed = entry_text.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyEntry);
    }
    if trimmed.chars().count() > MAX_ENTRY_CHARS {
        return Err(InputError::EntryTooLong(MAX_ENTRY_CHARS));
    }
    Ok(trimmed.to_string())
}

fn round2(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
