//! Deterministic lexical-overlap metrics between a candidate and a reference answer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numerator used for unigram precision when nothing overlaps.
const SMOOTHING_EPSILON: f64 = 0.1;

/// Both lexical scores for one candidate/reference pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    /// BLEU-1 style clipped unigram precision with brevity penalty.
    pub similarity_score: f64,
    /// Token-level F1 over normalized tokens.
    pub overlap_f1: f64,
}

/// Compute both scores.
///
/// Text that is empty or only whitespace counts as empty, and empty input on
/// either side scores 0.0, even when both sides are blank.
pub fn score(candidate: &str, reference: &str) -> MetricScores {
    MetricScores {
        similarity_score: similarity_score(candidate, reference),
        overlap_f1: overlap_f1(candidate, reference),
    }
}

/// BLEU-1: clipped unigram precision times the brevity penalty.
///
/// Zero overlap is smoothed to `0.1 / candidate_len` rather than 0.
pub fn similarity_score(candidate: &str, reference: &str) -> f64 {
    let cand = bleu_tokens(candidate);
    let refs = bleu_tokens(reference);
    if cand.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let ref_counts = counts(&refs);
    let matches: usize = counts(&cand)
        .iter()
        .map(|(tok, n)| (*n).min(ref_counts.get(tok).copied().unwrap_or(0)))
        .sum();

    let c = cand.len() as f64;
    let r = refs.len() as f64;
    let precision = if matches == 0 {
        SMOOTHING_EPSILON / c
    } else {
        matches as f64 / c
    };
    let brevity_penalty = if c > r { 1.0 } else { (1.0 - r / c).exp() };

    brevity_penalty * precision
}

/// Harmonic mean of token precision and recall over normalized token multisets.
pub fn overlap_f1(candidate: &str, reference: &str) -> f64 {
    let cand = normalized_tokens(candidate);
    let refs = normalized_tokens(reference);

    if cand.is_empty() || refs.is_empty() {
        // Answers made only of articles/punctuation: equal iff both had content.
        let both_present = !candidate.trim().is_empty() && !reference.trim().is_empty();
        return if cand.is_empty() && refs.is_empty() && both_present {
            1.0
        } else {
            0.0
        };
    }

    let ref_counts = counts(&refs);
    let common: usize = counts(&cand)
        .iter()
        .map(|(tok, n)| (*n).min(ref_counts.get(tok).copied().unwrap_or(0)))
        .sum();
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / cand.len() as f64;
    let recall = common as f64 / refs.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

fn counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut map = HashMap::new();
    for tok in tokens {
        *map.entry(tok.as_str()).or_insert(0) += 1;
    }
    map
}

/// Lowercased word tokens; every other non-space character stands alone.
fn bleu_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !ch.is_whitespace() {
            tokens.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// Lowercase, strip punctuation, drop articles.
fn normalized_tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "a" | "an" | "the"))
        .map(str::to_string)
        .collect()
}
