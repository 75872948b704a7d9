//! Historical context summarizer.
//!
//! Pure aggregation over stored analyses - no service calls, defined for
//! empty input. The digest lives for one orchestration call and is the
//! only historical context the reflection stage ever sees.

use crate::store::AnalysisRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TOP_N: usize = 3;

/// Compact statistical digest of a user's recent entries, small enough
/// to embed inside a prompt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoricalDigest {
    pub entry_count: usize,
    /// Top emotion labels with their aggregate weight across entries.
    pub top_emotions: Vec<(String, f64)>,
    /// Top topics with their occurrence count.
    pub top_topics: Vec<(String, i64)>,
    /// Lookback window the digest covers, in days.
    pub window_days: i64,
}

impl HistoricalDigest {
    /// The explicit "no history" digest.
    pub fn empty(window_days: i64) -> Self {
        Self {
            entry_count: 0,
            top_emotions: Vec::new(),
            top_topics: Vec::new(),
            window_days,
        }
    }

    pub fn has_history(&self) -> bool {
        self.entry_count > 0
    }
}

/// Reduce past analyses into a digest. Per-label emotion weights are
/// summed across records, topic occurrences counted, and the top 3 of
/// each kept by descending value with ties broken by first-seen order.
pub fn summarize(records: &[AnalysisRecord], window_days: i64) -> HistoricalDigest {
    if records.is_empty() {
        return HistoricalDigest::empty(window_days);
    }

    let mut emotion_order: Vec<String> = Vec::new();
    let mut emotion_totals: HashMap<String, f64> = HashMap::new();
    let mut topic_order: Vec<String> = Vec::new();
    let mut topic_counts: HashMap<String, i64> = HashMap::new();

    for record in records {
        for (label, weight) in &record.emotions {
            if !emotion_totals.contains_key(label) {
                emotion_order.push(label.clone());
            }
            *emotion_totals.entry(label.clone()).or_insert(0.0) += weight;
        }
        for topic in &record.topics {
            if !topic_counts.contains_key(topic) {
                topic_order.push(topic.clone());
            }
            *topic_counts.entry(topic.clone()).or_insert(0) += 1;
        }
    }

    let mut top_emotions: Vec<(String, f64)> = emotion_order
        .into_iter()
        .map(|label| {
            let total = emotion_totals[&label];
            (label, total)
        })
        .collect();
    // Stable sort keeps first-seen order on ties
    top_emotions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    top_emotions.truncate(TOP_N);

    let mut top_topics: Vec<(String, i64)> = topic_order
        .into_iter()
        .map(|topic| {
            let count = topic_counts[&topic];
            (topic, count)
        })
        .collect();
    top_topics.sort_by(|a, b| b.1.cmp(&a.1));
    top_topics.truncate(TOP_N);

    HistoricalDigest {
        entry_count: records.len(),
        top_emotions,
        top_topics,
        window_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(emotions: &[(&str, f64)], topics: &[&str]) -> AnalysisRecord {
        AnalysisRecord {
            id: "test".to_string(),
            user_id: "user".to_string(),
            entry_text: "entry".to_string(),
            emotions: emotions
                .iter()
                .map(|(l, w)| (l.to_string(), *w))
                .collect::<BTreeMap<_, _>>(),
            polarity: BTreeMap::from([
                ("positive".to_string(), 0.5),
                ("negative".to_string(), 0.5),
            ]),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            reflection: String::new(),
            reflection_mode: "user".to_string(),
            deeper_meaning: None,
            ysym_triggered: false,
            created_at: "2026-08-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_empty_input_gives_no_history_digest() {
        let digest = summarize(&[], 21);
        assert_eq!(digest, HistoricalDigest::empty(21));
        assert!(!digest.has_history());
    }

    #[test]
    fn test_aggregates_weights_and_counts() {
        let records = vec![
            record(&[("happy", 0.6), ("calm", 0.4)], &["work", "family"]),
            record(&[("happy", 0.3), ("anxious", 0.7)], &["work"]),
        ];
        let digest = summarize(&records, 21);

        assert_eq!(digest.entry_count, 2);
        assert_eq!(digest.top_emotions[0], ("happy".to_string(), 0.6 + 0.3));
        assert_eq!(digest.top_topics[0], ("work".to_string(), 2));
        assert_eq!(digest.top_topics[1], ("family".to_string(), 1));
    }

    #[test]
    fn test_top_lists_truncated_to_three() {
        let records = vec![record(
            &[("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4)],
            &["t1", "t2", "t3", "t4"],
        )];
        let digest = summarize(&records, 21);
        assert_eq!(digest.top_emotions.len(), 3);
        assert_eq!(digest.top_topics.len(), 3);
        // Highest aggregate weight first
        assert_eq!(digest.top_emotions[0].0, "d");
    }

    #[test]
    fn test_ties_broken_by_first_seen_order() {
        let records = vec![
            record(&[("calm", 0.5)], &["travel"]),
            record(&[("proud", 0.5)], &["health"]),
            record(&[("grateful", 0.5)], &["food"]),
        ];
        let digest = summarize(&records, 21);
        // All tied - first-seen across records wins
        assert_eq!(digest.top_emotions[0].0, "calm");
        assert_eq!(digest.top_emotions[1].0, "proud");
        assert_eq!(digest.top_emotions[2].0, "grateful");
        assert_eq!(digest.top_topics[0].0, "travel");
    }
}
