use crate::error::{AppError, Result};
use crate::models::{ENTERTAINMENT_MAX, ORIGINALITY_MAX, QUALITY_MAX};

use super::oracle::RawScore;

/// Oracle response after repair: scores within bounds, summary within the
/// length cap, total recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedScore {
    pub quality_score: i64,
    pub originality_score: i64,
    pub entertainment_score: i64,
    pub total_score: i64,
    pub ai_summary: String,
}

/// Validate and repair a raw oracle response. Missing fields are fatal;
/// out-of-range scores are clamped and overlong summaries truncated (the
/// oracle is mostly right, rejecting everything imperfect would waste the
/// daily quota). The oracle's own total, if any, is ignored.
pub fn validate(raw: &RawScore, summary_max_chars: usize) -> Result<ValidatedScore> {
    let quality = raw
        .quality_score
        .ok_or_else(|| AppError::Validation("missing quality_score".to_string()))?;
    let originality = raw
        .originality_score
        .ok_or_else(|| AppError::Validation("missing originality_score".to_string()))?;
    let entertainment = raw
        .entertainment_score
        .ok_or_else(|| AppError::Validation("missing entertainment_score".to_string()))?;
    let summary = raw
        .ai_summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("missing ai_summary".to_string()))?;

    let quality_score = clamp_score("quality_score", quality, QUALITY_MAX);
    let originality_score = clamp_score("originality_score", originality, ORIGINALITY_MAX);
    let entertainment_score = clamp_score("entertainment_score", entertainment, ENTERTAINMENT_MAX);

    Ok(ValidatedScore {
        quality_score,
        originality_score,
        entertainment_score,
        total_score: quality_score + originality_score + entertainment_score,
        ai_summary: truncate_summary(summary, summary_max_chars),
    })
}

fn clamp_score(field: &str, value: i64, max: i64) -> i64 {
    if !(0..=max).contains(&value) {
        tracing::warn!("{field} out of range ({value}), clamping to 0..={max}");
    }
    value.clamp(0, max)
}

/// Cut an overlong summary at a sentence boundary, falling back to a word
/// boundary, falling back to a hard cut. Operates on characters, not
/// bytes; summaries are usually Japanese.
pub fn truncate_summary(summary: &str, max_chars: usize) -> String {
    let chars: Vec<char> = summary.chars().collect();
    if chars.len() <= max_chars {
        return summary.to_string();
    }

    let window = &chars[..max_chars];

    // Prefer the last complete sentence, as long as it keeps a useful chunk
    let sentence_end = window
        .iter()
        .rposition(|c| matches!(c, '。' | '！' | '？' | '.' | '!' | '?'))
        .filter(|&i| i + 1 > max_chars / 2);
    if let Some(end) = sentence_end {
        return window[..=end].iter().collect();
    }

    let word_end = window
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&i| i > max_chars / 2);
    if let Some(end) = word_end {
        return window[..end].iter().collect();
    }

    window.iter().collect()
}
