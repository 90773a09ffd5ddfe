//! Review summaries and labels from the text generation function
//!
//! Two generation calls run per review set: a short summary of the raw
//! reviews, then up to five labels derived from that summary alone. Each
//! prompt asks the model to open with a marker phrase which is stripped
//! before the output is used.

use crate::backend::TextGenerator;
use crate::cache::{CacheKey, CacheManager};
use crate::types::{Notice, ReviewSummary};
use std::sync::Arc;

pub const SUMMARY_MARKER: &str = "Here is the summary";
pub const LABELS_MARKER: &str = "Here are the labels";
pub const MAX_LABELS: usize = 5;

/// Summary and whatever went wrong while producing it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub summary: ReviewSummary,
    pub notices: Vec<Notice>,
}

impl SummaryOutcome {
    fn degraded(summary: ReviewSummary, notice: Notice) -> Self {
        Self {
            summary,
            notices: vec![notice],
        }
    }
}

pub fn summary_prompt(reviews: &str) -> String {
    format!(
        "Generate a concise summary (maximum 3 sentences) of the following user reviews. \
         The summary should include positive and negative aspects of the reviews. \
         Output *only* the summary text, without explanations or formatting. \
         Always begin your response exactly with \"{SUMMARY_MARKER}:\".\n\nReviews:\n{reviews}"
    )
}

pub fn labels_prompt(summary: &str) -> String {
    format!(
        "Extract a maximum of {MAX_LABELS} concise labels (keywords or short phrases) from the \
         following user review summary. The labels should represent both positive and negative \
         aspects mentioned. Output *only* the labels as a single line of comma-separated values, \
         with no introductory phrases, explanations, or formatting. \
         Start outputting with \"{LABELS_MARKER}:\".\n\nSummary:\n{summary}"
    )
}

/// Remove a leading marker phrase, matched case-insensitively, with an
/// optional colon after it
pub fn strip_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    let text = text.trim();
    match text.get(..marker.len()) {
        Some(head) if head.eq_ignore_ascii_case(marker) => {
            let rest = &text[marker.len()..];
            rest.strip_prefix(':').unwrap_or(rest).trim_start()
        }
        _ => text,
    }
}

/// Remove markdown code fences wrapped around generated text
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // drop an info string such as ```json
        text = match rest.split_once('\n') {
            Some((info, body)) if info.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
            _ => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Clean a raw summary: marker, fences, whitespace
pub fn clean_summary(raw: &str) -> String {
    let stripped = strip_marker(strip_code_fences(raw), SUMMARY_MARKER);
    strip_code_fences(stripped).to_string()
}

/// Parse a raw label line into at most [`MAX_LABELS`] labels
pub fn parse_labels(raw: &str) -> Vec<String> {
    strip_marker(strip_code_fences(raw), LABELS_MARKER)
        .split(',')
        .map(|label| label.trim().trim_end_matches('.').trim())
        .filter(|label| !label.is_empty())
        .take(MAX_LABELS)
        .map(str::to_string)
        .collect()
}

/// Generates and caches review summaries
#[derive(Clone)]
pub struct ReviewSummarizer {
    generator: Arc<dyn TextGenerator>,
    cache: Arc<CacheManager>,
}

impl std::fmt::Debug for ReviewSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewSummarizer").finish_non_exhaustive()
    }
}

impl ReviewSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, cache: Arc<CacheManager>) -> Self {
        Self { generator, cache }
    }

    /// Summarize reviews and label the summary. Never fails: problems come
    /// back as notices next to an absent summary or an empty label list.
    pub async fn summarize(&self, reviews: &[String]) -> SummaryOutcome {
        let joined = reviews
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if joined.is_empty() {
            return SummaryOutcome::degraded(
                ReviewSummary::empty(),
                Notice::info("No reviews available to generate summary and labels."),
            );
        }

        let key = CacheKey::summary(&joined);
        if let Some(summary) = self.cache.get::<ReviewSummary>(&key).await {
            tracing::debug!("Review summary served from cache");
            return SummaryOutcome {
                summary,
                notices: Vec::new(),
            };
        }

        let outcome = self.generate(&joined).await;
        if outcome.notices.is_empty() {
            if let Err(e) = self.cache.put(key, &outcome.summary).await {
                tracing::warn!("Failed to cache review summary: {}", e);
            }
        }
        outcome
    }

    async fn generate(&self, reviews: &str) -> SummaryOutcome {
        let summary_text = match self.generator.generate(&summary_prompt(reviews)).await {
            Ok(Some(raw)) => clean_summary(&raw),
            Ok(None) => {
                return SummaryOutcome::degraded(
                    ReviewSummary::empty(),
                    Notice::warning("Failed to generate summary from the reviews."),
                )
            }
            Err(e) => {
                tracing::warn!("Summary generation failed: {}", e);
                return SummaryOutcome::degraded(
                    ReviewSummary::empty(),
                    Notice::warning(format!("An error occurred during AI processing: {e}")),
                );
            }
        };

        if summary_text.is_empty() {
            return SummaryOutcome::degraded(
                ReviewSummary::empty(),
                Notice::warning("Summary generated was empty after cleaning."),
            );
        }

        let with_summary = |labels| ReviewSummary {
            summary_text: Some(summary_text.clone()),
            labels,
        };

        match self.generator.generate(&labels_prompt(&summary_text)).await {
            Ok(Some(raw)) => SummaryOutcome {
                summary: with_summary(parse_labels(&raw)),
                notices: Vec::new(),
            },
            Ok(None) => SummaryOutcome::degraded(
                with_summary(Vec::new()),
                Notice::warning("Failed to generate labels from the summary."),
            ),
            Err(e) => {
                tracing::warn!("Label generation failed: {}", e);
                SummaryOutcome::degraded(
                    with_summary(Vec::new()),
                    Notice::warning(format!("An error occurred during AI processing: {e}")),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorefrontError;
    use crate::testing::ScriptedGenerator;
    use crate::types::NoticeLevel;

    fn summarizer(generator: Arc<ScriptedGenerator>) -> ReviewSummarizer {
        ReviewSummarizer::new(generator, Arc::new(CacheManager::default()))
    }

    fn reviews(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_reviews_skip_generation() {
        let generator = Arc::new(ScriptedGenerator::default());
        let outcome = summarizer(Arc::clone(&generator)).summarize(&[]).await;

        assert_eq!(outcome.summary, ReviewSummary::empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn strips_markers_from_summary_and_labels() {
        let generator = Arc::new(ScriptedGenerator::replying(&[
            "Here is the summary: Good fit overall but sizing runs small.",
            "Here are the labels: comfortable, true to size., runs small",
        ]));
        let outcome = summarizer(Arc::clone(&generator))
            .summarize(&reviews(&["Great fit, loved it", "Too small"]))
            .await;

        assert_eq!(
            outcome.summary.summary_text.as_deref(),
            Some("Good fit overall but sizing runs small.")
        );
        assert_eq!(
            outcome.summary.labels,
            vec!["comfortable", "true to size", "runs small"]
        );
        assert!(outcome.notices.is_empty());

        let prompts = generator.prompts();
        assert!(prompts[0].ends_with("Reviews:\nGreat fit, loved it\nToo small"));
        assert!(prompts[1].contains("Good fit overall but sizing runs small."));
        assert!(!prompts[1].contains("Great fit, loved it"));
    }

    #[tokio::test]
    async fn summary_failure_degrades_to_nothing() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(
            StorefrontError::Generation("model offline".into()),
        )]));
        let outcome = summarizer(Arc::clone(&generator))
            .summarize(&reviews(&["Nice shoes"]))
            .await;

        assert_eq!(outcome.summary, ReviewSummary::empty());
        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0].level, NoticeLevel::Warning);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn label_failure_keeps_summary() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(Some("Here is the summary: Sturdy and light.".into())),
            Err(StorefrontError::Generation("timeout".into())),
        ]));
        let outcome = summarizer(generator).summarize(&reviews(&["Sturdy"])).await;

        assert_eq!(outcome.summary.summary_text.as_deref(), Some("Sturdy and light."));
        assert!(outcome.summary.labels.is_empty());
        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0].level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn empty_summary_skips_labels() {
        let generator = Arc::new(ScriptedGenerator::replying(&["Here is the summary:   "]));
        let outcome = summarizer(Arc::clone(&generator))
            .summarize(&reviews(&["ok"]))
            .await;

        assert_eq!(outcome.summary, ReviewSummary::empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn successful_summaries_are_cached() {
        let generator = Arc::new(ScriptedGenerator::replying(&[
            "Here is the summary: Warm.",
            "Here are the labels: warm",
        ]));
        let summarizer = summarizer(Arc::clone(&generator));
        let input = reviews(&["Very warm jacket"]);

        let first = summarizer.summarize(&input).await;
        let second = summarizer.summarize(&input).await;
        assert_eq!(first.summary, second.summary);
        assert_eq!(generator.calls(), 2);
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        assert_eq!(strip_marker("HERE IS THE SUMMARY: Fine.", SUMMARY_MARKER), "Fine.");
        assert_eq!(strip_marker("here is the summary Fine.", SUMMARY_MARKER), "Fine.");
        assert_eq!(strip_marker("Fine.", SUMMARY_MARKER), "Fine.");
        assert_eq!(strip_marker("Hé", SUMMARY_MARKER), "Hé");
    }

    #[test]
    fn fences_are_removed() {
        assert_eq!(
            clean_summary("```json\nHere is the summary: Soft fabric.\n```"),
            "Soft fabric."
        );
        assert_eq!(clean_summary("Here is the summary: ```Soft.```"), "Soft.");
    }

    #[test]
    fn labels_are_capped_at_five() {
        let labels = parse_labels("Here are the labels: a, b, , c., d, e, f");
        assert_eq!(labels, vec!["a", "b", "c", "d", "e"]);
    }
}
