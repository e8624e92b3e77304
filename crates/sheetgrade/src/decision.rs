//! Bubble decision engine.
//!
//! For each item the engine measures every choice region's fill fraction
//! and applies one explicit rule: the best-filled choice wins only when it
//! clears the fill threshold AND leads the runner-up by the separation
//! threshold. Everything else is `Blank` (nothing filled enough) or
//! `Ambiguous` (two marks too close to call). Ambiguity is a valid reading
//! for instructor review, not an error.

use crate::layout::SheetLayout;
use crate::registrar::RegisteredSheet;
use crate::sampling::region_fill_score;

/// Configuration for bubble classification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum fill fraction for a mark to count at all.
    /// Default: [`DecisionConfig::DEFAULT_FILL_THRESHOLD`].
    pub fill_threshold: f32,
    /// Minimum lead of the best fill over the runner-up.
    /// Default: [`DecisionConfig::DEFAULT_SEPARATION_THRESHOLD`].
    pub separation_threshold: f32,
    /// Sample grid side per choice region.
    /// Default: [`DecisionConfig::DEFAULT_SAMPLES_PER_AXIS`].
    pub samples_per_axis: usize,
}

impl DecisionConfig {
    pub const DEFAULT_FILL_THRESHOLD: f32 = 0.25;
    pub const DEFAULT_SEPARATION_THRESHOLD: f32 = 0.10;
    pub const DEFAULT_SAMPLES_PER_AXIS: usize = 8;
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            fill_threshold: Self::DEFAULT_FILL_THRESHOLD,
            separation_threshold: Self::DEFAULT_SEPARATION_THRESHOLD,
            samples_per_axis: Self::DEFAULT_SAMPLES_PER_AXIS,
        }
    }
}

/// Reading of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemDecision {
    /// Exactly one choice was convincingly marked.
    Choice(char),
    /// No choice reached the fill threshold.
    Blank,
    /// Two or more choices reached the threshold with near-equal fill.
    Ambiguous,
}

impl std::fmt::Display for ItemDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Choice(c) => write!(f, "{}", c),
            Self::Blank => write!(f, "blank"),
            Self::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Per-item measurement detail, kept for the item-analysis report.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ItemReading {
    /// Fill fraction per choice, in alphabet order.
    pub fill_scores: Vec<f32>,
    pub decision: ItemDecision,
}

/// Apply the decision rule to one item's fill scores.
pub fn classify(fill_scores: &[f32], layout: &SheetLayout, config: &DecisionConfig) -> ItemDecision {
    let mut best_idx = 0usize;
    let mut best = f32::MIN;
    let mut second = f32::MIN;
    for (i, &s) in fill_scores.iter().enumerate() {
        if s > best {
            second = best;
            best = s;
            best_idx = i;
        } else if s > second {
            second = s;
        }
    }

    if fill_scores.is_empty() || best < config.fill_threshold {
        return ItemDecision::Blank;
    }
    if second > f32::MIN && best - second < config.separation_threshold {
        return ItemDecision::Ambiguous;
    }
    ItemDecision::Choice(layout.choice_letter(best_idx))
}

/// Measure and classify every item on a registered sheet.
///
/// Pure function of its inputs: identical sheets and thresholds always
/// produce identical readings.
pub fn decide_items(
    sheet: &RegisteredSheet<'_>,
    layout: &SheetLayout,
    config: &DecisionConfig,
) -> Vec<ItemReading> {
    let mut readings = Vec::with_capacity(layout.n_items());
    for item in 0..layout.n_items() {
        let fill_scores: Vec<f32> = (0..layout.n_choices())
            .map(|choice| {
                let region = layout.choice_region(item, choice);
                region_fill_score(sheet.binary, &sheet.transform, &region, config.samples_per_axis)
            })
            .collect();
        let decision = classify(&fill_scores, layout, config);
        readings.push(ItemReading {
            fill_scores,
            decision,
        });
    }

    let marked = readings
        .iter()
        .filter(|r| matches!(r.decision, ItemDecision::Choice(_)))
        .count();
    tracing::debug!(
        items = readings.len(),
        marked,
        "bubble decisions computed"
    );
    readings
}
